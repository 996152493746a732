//! Logging setup.
//!
//! Two layers share one filter: terminal output and a plain-text file under
//! the log directory. The file writer is non-blocking; keep the returned
//! guard alive for the life of the process or buffered lines are lost.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "bot.log";

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

/// Initialize tracing. Priority: `RUST_LOG` > `debug` flag > `info`.
pub fn init_telemetry(log_dir: &Path, debug: bool) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .ok();

    Ok(guard)
}
