//! Persistent log file for the file tracing layer.
//!
//! The terminal layer writes straight to stderr so stdout carries only
//! the resulting document. [`LogFile`] backs the second layer, which has
//! its own `EnvFilter` and is built with `.with_ansi(false)`.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Name of the log file inside the configured log directory.
pub const LOG_FILE_NAME: &str = "ajaxflow.log";

/// Append-only log file shared by every event writer.
#[derive(Clone)]
pub struct LogFile {
    path: PathBuf,
    inner: Arc<Shared>,
}

struct Shared {
    file: Mutex<File>,
    // Set once the first write error has been reported.
    broken: AtomicBool,
}

impl LogFile {
    /// Opens `<dir>/ajaxflow.log` in append mode, creating `dir` first.
    pub fn open(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            inner: Arc::new(Shared {
                file: Mutex::new(file),
                broken: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &[u8]) {
        let result = {
            let mut file = self.inner.file.lock();
            file.write_all(event).and_then(|()| file.flush())
        };
        // Logging cannot log its own failure; say it once on stderr.
        if let Err(e) = result {
            if !self.inner.broken.swap(true, Ordering::Relaxed) {
                eprintln!("Warning: cannot write log file {}: {e}", self.path.display());
            }
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFile {
    type Writer = EventWriter;

    fn make_writer(&'a self) -> Self::Writer {
        EventWriter {
            log: self.clone(),
            buf: Vec::with_capacity(256),
        }
    }
}

/// Collects one formatted event; appends it whole on [`Drop`].
pub struct EventWriter {
    log: LogFile,
    buf: Vec<u8>,
}

impl Write for EventWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            self.log.append(&self.buf);
        }
    }
}
