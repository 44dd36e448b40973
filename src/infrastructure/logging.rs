//! Logging system configuration and initialization
//!
//! Console logging through `tracing` with an optional non-blocking file
//! layer. Level control comes from `RUST_LOG` when set, otherwise from the
//! configured level.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

// Keeps the non-blocking writer alive for the process lifetime.
static LOG_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

pub use crate::infrastructure::config::LoggingConfig;

/// Initialize the logging system. Call once per process, before any
/// component starts emitting.
pub fn init_logging(config: &LoggingConfig, file_stem: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = config
        .console_output
        .then(|| fmt::layer().with_target(true));

    let file_layer = if config.file_output {
        std::fs::create_dir_all(&config.directory)?;
        let appender =
            tracing_appender::rolling::daily(&config.directory, format!("{file_stem}.log"));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // A second init in the same process keeps the first guard.
        let _ = LOG_GUARD.set(guard);
        Some(fmt::layer().with_ansi(false).with_writer(writer))
    } else {
        None
    };

    Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}
