//! File logging for askdoc.
//!
//! Logs go to a daily rolling file under `$ASKDOC_HOME/logs/` so they never
//! interleave with the streamed answer on stdout.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::paths;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "ASKDOC_LOG";

const DEFAULT_DIRECTIVE: &str = "askdoc=info";
const LOG_FILE_PREFIX: &str = "askdoc.log";

/// Installs the global subscriber writing to `$ASKDOC_HOME/logs/`.
///
/// The returned guard flushes buffered records when dropped; keep it alive
/// for the lifetime of the process.
///
/// # Errors
/// Returns an error if the log directory cannot be created or a subscriber
/// is already installed.
pub fn init(debug: bool) -> Result<WorkerGuard> {
    init_in(&paths::logs_dir(), debug)
}

/// Installs the global subscriber writing into `dir`.
///
/// # Errors
/// Returns an error if the directory cannot be created or a subscriber is
/// already installed.
pub fn init_in(dir: &Path, debug: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log dir {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(debug);

    tracing_subscriber::registry()
        .with(filter(debug))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// `--debug-log` wins; otherwise `ASKDOC_LOG`, falling back to `askdoc=info`.
fn filter(debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("trace");
    }
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
