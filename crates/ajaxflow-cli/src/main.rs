//! ajaxflow CLI - apply `<ajax-response>` envelopes to HTML documents.
//!
//! # Commands
//!
//! - `ajaxflow apply --document page.html --response reply.xml`
//! - `ajaxflow fetch <url> --document page.html`
//! - `ajaxflow config`
//!
//! The updated document goes to stdout (or `--output`); logs go to
//! stderr.
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`AJAXFLOW_*`)
//! 3. Project config (`.ajaxflow/config.toml` under `-C`, default cwd)
//! 4. Global config (`~/.ajaxflow/config.toml`)
//! 5. Default values (lowest priority)

mod tracing_writer;

use ajaxflow_dom::Document;
use ajaxflow_runtime::{
    AjaxConfig, AjaxRuntime, CallOutcome, ConfigError, ConfigLoader, ConfigResolver, HttpMethod,
    ProcessReport,
};
use ajaxflow_types::ErrorCode;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Exit code when `--strict` finds a missing component or script error.
const EXIT_UNCLEAN: i32 = 2;

/// ajaxflow - Ajax call orchestration from the command line
#[derive(Parser, Debug)]
#[command(name = "ajaxflow")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root directory (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    /// Base URL for relative call URLs (also: AJAXFLOW_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Skip the global config file
    #[arg(long, global = true)]
    no_global_config: bool,

    /// Override log file directory path (also: AJAXFLOW_LOG_FILE)
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Override file log level (default: debug)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply an envelope file to a document and print the result
    Apply {
        /// HTML document to update
        #[arg(long)]
        document: PathBuf,

        /// File holding the <ajax-response> envelope
        #[arg(long)]
        response: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Issue one call over HTTP and apply its response to a document
    Fetch {
        /// Call URL, absolute or relative to --base-url
        url: String,

        /// HTML document to update
        #[arg(long)]
        document: PathBuf,

        /// HTTP method
        #[arg(long, value_enum, default_value_t = MethodArg::Get)]
        method: MethodArg,

        /// Request parameter as NAME=VALUE (repeatable)
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Channel as name|mode
        #[arg(long)]
        channel: Option<String>,

        /// Request timeout in milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Treat the body as plain text instead of an envelope
        #[arg(long)]
        raw: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Write the updated document here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Exit with status 2 when a component is missing or a script fails
    #[arg(long)]
    strict: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum MethodArg {
    Get,
    Post,
}

impl From<MethodArg> for HttpMethod {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::Get => Self::Get,
            MethodArg::Post => Self::Post,
        }
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

/// CLI-based configuration resolver.
///
/// Merges file/env config via [`ConfigLoader`] and applies CLI argument
/// overrides as the highest-priority layer.
struct CliConfigResolver {
    project_root: PathBuf,
    base_url: Option<String>,
    skip_global: bool,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
}

impl CliConfigResolver {
    fn from_args(args: &Args) -> Self {
        let project_root = args.project.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|e| {
                warn!(error = %e, "Failed to get current directory, using '.'");
                PathBuf::from(".")
            })
        });

        Self {
            project_root,
            base_url: args.base_url.clone(),
            skip_global: args.no_global_config,
            log_file: args.log_file.clone(),
            log_level: args.log_level.clone(),
        }
    }

    fn loader(&self) -> ConfigLoader {
        let loader = ConfigLoader::new().with_project_root(&self.project_root);
        if self.skip_global {
            loader.skip_global_config()
        } else {
            loader
        }
    }
}

impl ConfigResolver for CliConfigResolver {
    fn resolve(&self) -> Result<AjaxConfig, ConfigError> {
        let mut config = self.loader().load()?;

        if let Some(ref url) = self.base_url {
            config.base_url = Some(url.clone());
        }
        if let Some(ref p) = self.log_file {
            config.logging.file = true;
            config.logging.file_path = Some(p.clone());
        }
        if let Some(ref level) = self.log_level {
            config.logging.file_level.clone_from(level);
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let resolver = CliConfigResolver::from_args(&args);

    // Resolve early: the file layer needs the logging section.
    let config = resolver
        .resolve()
        .map_err(|e| anyhow!("Config error: {e} [{}]", e.code()))?;

    init_tracing(&args, &config);
    debug!(path = %resolver.project_root.display(), "Project root");

    match args.command {
        Command::Apply {
            document,
            response,
            output,
        } => apply(config, &document, &response, &output),
        Command::Fetch {
            url,
            document,
            method,
            params,
            channel,
            timeout_ms,
            raw,
            output,
        } => {
            let request = FetchRequest {
                url,
                method: method.into(),
                params,
                channel,
                timeout: timeout_ms.map(Duration::from_millis),
                envelope: !raw,
            };
            fetch(config, &document, request, &output).await
        }
        Command::Config => {
            for path in resolver.loader().file_layers() {
                if path.is_file() {
                    println!("# layer: {}", path.display());
                }
            }
            let toml = config
                .to_toml()
                .map_err(|e| anyhow!("Failed to serialize config: {e}"))?;
            print!("{toml}");
            Ok(())
        }
    }
}

/// Terminal layer on stderr plus the optional file layer, each with
/// its own filter.
///
/// Terminal filter: --debug > --verbose > RUST_LOG > "warn".
fn init_tracing(args: &Args, config: &AjaxConfig) {
    let terminal_filter = if args.debug {
        EnvFilter::new("debug,hyper=warn,hyper_util=warn,h2=warn,reqwest=warn,rustls=warn,tokio=warn")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let terminal_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let log_file = if config.logging.file {
        let dir = config.logging.resolved_file_path();
        match tracing_writer::LogFile::open(&dir) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: cannot open log file in {}: {e}", dir.display());
                None
            }
        }
    } else {
        None
    };

    if let Some(file) = log_file {
        let path = file.path().to_path_buf();
        let file_filter = EnvFilter::new(config.logging.file_filter_directive());
        let file_layer = fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(file);

        tracing_subscriber::registry()
            .with(terminal_layer.with_filter(terminal_filter))
            .with(file_layer.with_filter(file_filter))
            .init();
        info!(
            path = %path.display(),
            level = %config.logging.file_level,
            "File logging enabled"
        );
    } else {
        tracing_subscriber::registry()
            .with(terminal_layer.with_filter(terminal_filter))
            .init();
    }
}

fn apply(config: AjaxConfig, document: &Path, response: &Path, output: &OutputArgs) -> Result<()> {
    let runtime = runtime_for(config, document)?;
    let raw = std::fs::read_to_string(response)
        .with_context(|| format!("cannot read response {}", response.display()))?;

    let report = runtime
        .process(&raw)
        .map_err(|e| anyhow!("{e} [{}]", e.code()))?;
    log_report(&report);
    emit(&runtime, output, report.is_clean())
}

/// One `fetch` invocation.
#[derive(Debug)]
struct FetchRequest {
    url: String,
    method: HttpMethod,
    params: Vec<(String, String)>,
    channel: Option<String>,
    timeout: Option<Duration>,
    envelope: bool,
}

async fn fetch(
    config: AjaxConfig,
    document: &Path,
    request: FetchRequest,
    output: &OutputArgs,
) -> Result<()> {
    let runtime = runtime_for(config, document)?;

    let mut attrs = runtime
        .attributes(request.url)
        .with_method(request.method)
        .expect_envelope(request.envelope);
    for (name, value) in request.params {
        attrs = attrs.with_parameter(name, value);
    }
    if let Some(channel) = request.channel {
        attrs = attrs.with_channel(channel);
    }
    if let Some(timeout) = request.timeout {
        attrs = attrs.with_timeout(timeout);
    }

    let outcome = runtime.ajax(attrs).outcome().await;
    runtime.shutdown();

    let clean = match outcome {
        CallOutcome::Completed { status, report } => {
            info!(status, "Call completed");
            match report {
                Some(report) => {
                    log_report(&report);
                    report.is_clean()
                }
                None => true,
            }
        }
        CallOutcome::Failed(e) => bail!("call failed: {e} [{}]", e.code()),
        other => bail!("call did not run: {other:?}"),
    };
    emit(&runtime, output, clean)
}

fn runtime_for(config: AjaxConfig, document: &Path) -> Result<AjaxRuntime> {
    let source = std::fs::read_to_string(document)
        .with_context(|| format!("cannot read document {}", document.display()))?;
    let parsed = Document::parse(&source)
        .map_err(|e| anyhow!("cannot parse document {}: {e}", document.display()))?;
    Ok(AjaxRuntime::builder()
        .with_config(config)
        .with_document(parsed.into_shared())
        .build())
}

fn log_report(report: &ProcessReport) {
    info!(
        replaced = report.replaced.len(),
        evaluated = report.evaluated,
        head_added = report.head.added,
        head_replaced = report.head.replaced,
        "Envelope applied"
    );
    if let Some(ref url) = report.redirect {
        info!(url = %url, "Envelope requested redirect");
    }
    if !report.is_clean() {
        warn!(
            missing = ?report.missing,
            errors = ?report.errors,
            "Envelope applied with problems"
        );
    }
}

fn emit(runtime: &AjaxRuntime, output: &OutputArgs, clean: bool) -> Result<()> {
    let html = runtime.document().lock().to_html();
    match output.output {
        Some(ref path) => std::fs::write(path, &html)
            .with_context(|| format!("cannot write {}", path.display()))?,
        None => println!("{html}"),
    }
    if output.strict && !clean {
        std::process::exit(EXIT_UNCLEAN);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_in(root: &Path) -> CliConfigResolver {
        CliConfigResolver {
            project_root: root.to_path_buf(),
            base_url: None,
            skip_global: true,
            log_file: None,
            log_level: None,
        }
    }

    #[test]
    fn resolve_defaults_no_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let config = resolver_in(dir.path()).resolve().unwrap();
        assert_eq!(config.default_channel, "0|s");
        assert!(!config.logging.file);
    }

    #[test]
    fn resolve_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = resolver_in(dir.path());
        resolver.base_url = Some("http://example.test/app/".into());
        resolver.log_file = Some(dir.path().join("logs"));
        resolver.log_level = Some("trace".into());

        let config = resolver.resolve().unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://example.test/app/"));
        assert!(config.logging.file);
        assert_eq!(config.logging.file_path, Some(dir.path().join("logs")));
        assert_eq!(config.logging.file_level, "trace");
    }

    #[test]
    fn cli_overrides_project_config() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join(".ajaxflow");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(
            project.join("config.toml"),
            "base_url = \"http://project.test/\"\ndefault_channel = \"main|d\"\n",
        )
        .unwrap();

        let config = resolver_in(dir.path()).resolve().unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://project.test/"));
        assert_eq!(config.default_channel, "main|d");

        let mut resolver = resolver_in(dir.path());
        resolver.base_url = Some("http://cli.test/".into());
        let config = resolver.resolve().unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://cli.test/"));
        assert_eq!(config.default_channel, "main|d");
    }

    #[test]
    fn invalid_project_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join(".ajaxflow");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("config.toml"), "default_channel = [").unwrap();

        let err = resolver_in(dir.path()).resolve().unwrap_err();
        assert_eq!(err.code(), "CONFIG_PARSE_TOML");
    }

    #[test]
    fn param_parsing() {
        assert_eq!(parse_param("q=rust"), Ok(("q".into(), "rust".into())));
        assert_eq!(parse_param("empty="), Ok(("empty".into(), String::new())));
        assert_eq!(parse_param("a=b=c"), Ok(("a".into(), "b=c".into())));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn from_args_flags() {
        let args = Args::parse_from([
            "ajaxflow",
            "-C",
            "/tmp/project",
            "--base-url",
            "http://localhost/",
            "--no-global-config",
            "fetch",
            "/x",
            "--document",
            "page.html",
            "-p",
            "a=1",
            "--method",
            "post",
        ]);
        let resolver = CliConfigResolver::from_args(&args);
        assert_eq!(resolver.project_root, PathBuf::from("/tmp/project"));
        assert_eq!(resolver.base_url.as_deref(), Some("http://localhost/"));
        assert!(resolver.skip_global);

        let Command::Fetch { method, params, .. } = args.command else {
            panic!("expected fetch");
        };
        assert_eq!(method, MethodArg::Post);
        assert_eq!(params, [("a".to_string(), "1".to_string())]);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::parse_from([
            "ajaxflow", "apply", "--document", "d", "--response", "r", "-v",
        ]);
        assert!(args.verbose);
        assert!(matches!(args.command, Command::Apply { .. }));
    }
}
