//! Logging initialization using the `tracing` ecosystem.
//!
//! Provides:
//! - Console output (colored, human-readable)
//! - File output (daily rotation via `tracing-appender`), optionally as JSON lines
//! - Configurable log level via env var `RUST_LOG` or explicit parameter

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. After this, all `tracing::info!()`
/// etc. macros will produce output.
///
/// # Parameters
///
/// - `log_level`: default level if `RUST_LOG` env var is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `module_name`: used as the log file prefix (e.g. `"fbot"`)
/// - `json`: write the file layer as JSON lines instead of plain text
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str, json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let registry = tracing_subscriber::registry().with(env_filter).with(console_layer);

    match log_dir {
        Some(dir) if json => {
            let file_appender = tracing_appender::rolling::daily(dir, module_name);
            let file_layer = fmt::layer().json().with_writer(file_appender).with_target(true);
            registry.with(file_layer).init();
        }
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, module_name);
            let file_layer = fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true);
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

/// Initialize logging from the `log` section of the config file.
///
/// An explicit `level_override` (e.g. from the command line) wins over the file.
pub fn init_from_config(cfg: &LogConfig, level_override: Option<&str>, dir_override: Option<&str>) {
    let level = level_override.unwrap_or(&cfg.level);
    let dir = dir_override.or(cfg.dir.as_deref());
    init_logging(level, dir, &cfg.module_name, cfg.json);
}
