//! Tracing subscriber setup for the server binary.

use anyhow::Context;
use std::fs::OpenOptions;
use std::path::Path;
use time::{format_description::well_known::Rfc3339, UtcOffset};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::OffsetTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Build the filter: `RUST_LOG` first, then the configured level, then `info`.
pub fn env_filter(log_level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Logs go to stdout in compact form and, when `log_file` is set, are
/// appended to that file as well. The returned guard flushes the file writer
/// and must be kept alive for the lifetime of the process.
///
/// Call before starting the async runtime so the local UTC offset can be
/// determined.
pub fn init(log_level: Option<&str>, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(offset, Rfc3339);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(timer.clone())
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(
            fmt::layer()
                .with_timer(timer)
                .with_target(false)
                .compact(),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(path) = log_file {
        tracing::info!("Logging to file {}", path.display());
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_filter_falls_back_to_configured_level() {
        std::env::remove_var("RUST_LOG");
        assert_eq!(env_filter(Some("debug")).to_string(), "debug");
        assert_eq!(env_filter(None).to_string(), "info");
    }
}
