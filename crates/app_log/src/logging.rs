//! Structured logging setup with tracing

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging options supplied by the binary
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory for the rolling JSON log
    pub dir: PathBuf,
    /// File name prefix of the daily log
    pub file_prefix: String,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Also print human readable output to stderr
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir: super::log_dir(),
            file_prefix: "reader.log".to_string(),
            default_filter: "info".to_string(),
            console: cfg!(debug_assertions),
        }
    }
}

/// Initialize the global subscriber
pub fn init_logging(options: &LogOptions) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&options.dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &options.dir, &options.file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    // The console layer is optional; `Option<Layer>` is itself a layer.
    let console = options
        .console
        .then(|| fmt::layer().pretty().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(fmt::layer().json().with_writer(non_blocking))
        .try_init()?;

    tracing::info!(dir = ?options.dir, "Logging initialized");
    Ok(guard)
}

/// Remove `.log` files older than `days` from the default log directory
pub fn cleanup_old_logs(days: u32) -> anyhow::Result<usize> {
    cleanup_logs_in(&super::log_dir(), days)
}

fn cleanup_logs_in(dir: &Path, days: u32) -> anyhow::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let threshold = SystemTime::now() - Duration::from_secs(days as u64 * 24 * 60 * 60);
    let mut deleted = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        // Rolling appenders suffix the date, so match on the name instead of the extension
        let is_log = path
            .file_name()
            .map(|n| n.to_string_lossy().contains(".log"))
            .unwrap_or(false);
        if !is_log {
            continue;
        }

        let modified = entry.metadata().and_then(|m| m.modified());
        if matches!(modified, Ok(time) if time < threshold) && std::fs::remove_file(&path).is_ok() {
            deleted += 1;
            tracing::debug!("Deleted old log: {:?}", path);
        }
    }

    tracing::info!("Cleaned up {} old log files", deleted);
    Ok(deleted)
}
