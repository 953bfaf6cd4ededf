//! Shared E2E test helpers for `ajaxflow` binary tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// Default timeout for CLI tests.
pub const TIMEOUT_BASIC: Duration = Duration::from_secs(10);

/// Variables that would leak the developer's setup into a test run.
const ISOLATED_VARS: &[&str] = &[
    "RUST_LOG",
    "AJAXFLOW_BASE_URL",
    "AJAXFLOW_DEFAULT_CHANNEL",
    "AJAXFLOW_REQUEST_TIMEOUT_MS",
    "AJAXFLOW_STRIP_SESSION_ID",
    "AJAXFLOW_LOG_FILE",
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
];

pub const PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>t</title></head>
<body><div id="panel">old</div><span id="count">0</span></body></html>"#;

/// A scratch project directory holding input files.
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `content` to `name` inside the workspace.
    pub fn file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    /// Command for the `ajaxflow` binary rooted in this workspace, with
    /// HOME pointed inside it so no global config is read.
    pub fn cmd(&self) -> assert_cmd::Command {
        let mut cmd: assert_cmd::Command = cargo_bin_cmd!("ajaxflow");
        cmd.timeout(TIMEOUT_BASIC);
        for var in ISOLATED_VARS {
            cmd.env_remove(var);
        }
        cmd.env("HOME", self.dir.path().join("home"));
        cmd.current_dir(self.dir.path());
        cmd
    }
}

pub fn envelope(body: &str) -> String {
    format!("<ajax-response>{body}</ajax-response>")
}

pub fn component(id: &str, markup: &str) -> String {
    format!(r#"<component id="{id}"><![CDATA[{markup}]]></component>"#)
}

/// Serves exactly one HTTP response on a local port.
///
/// Returns the base URL and a receiver yielding the request head.
pub fn serve_once(status: u16, body: String) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local port");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        let _ = tx.send(String::from_utf8_lossy(&head).into_owned());

        let reply = format!(
            "HTTP/1.1 {status} X\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(reply.as_bytes());
    });

    (format!("http://{addr}/"), rx)
}
