//! Shared bootstrap for the AutoNexus pipeline executables.
//!
//! Each executable parses [`CommonArgs`], loads the pipeline configuration and
//! installs logging through [`bootstrap`], then runs exactly one pipeline step.

use autonexus_ml::{MlError, PipelineConfig, load_config};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Flags shared by all pipeline executables.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Configuration file (defaults to ./autonexus.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only report errors on stderr
    #[arg(short, long)]
    pub quiet: bool,
}

impl CommonArgs {
    /// Stderr filter directive for the requested verbosity.
    pub fn stderr_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Load `.env`, the configuration, and install logging.
///
/// The returned guard flushes the log file on drop and must be held until
/// the process exits.
pub fn bootstrap(args: &CommonArgs) -> anyhow::Result<(PipelineConfig, WorkerGuard)> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let config = load_config(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;
    let guard = init_tracing(&config.paths.log_file, args.stderr_filter())?;
    Ok((config, guard))
}

/// Human-readable stderr output plus a plain-text debug log file.
pub fn init_tracing(log_file: &Path, stderr_filter: &str) -> anyhow::Result<WorkerGuard> {
    let stderr_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| stderr_filter.to_string());
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(stderr_filter));

    let (dir, file_name) = split_log_path(log_file);
    std::fs::create_dir_all(&dir)?;
    let file_appender = tracing_appender::rolling::never(&dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    Ok(guard)
}

fn split_log_path(log_file: &Path) -> (PathBuf, String) {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = log_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "errors.log".to_string());
    (dir, file_name)
}

/// Log a failed step at error level and turn it into the process error.
pub fn report(step: &str, err: MlError) -> anyhow::Error {
    tracing::error!(step, kind = err.kind(), "Found unexpected error in {step}: {err}");
    anyhow::Error::new(err).context(format!("{step} failed"))
}
