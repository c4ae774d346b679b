//! Structured logging for the Tellus map browser.
//!
//! Structured, span-based, filterable logging via the `tracing`
//! ecosystem: console output with timestamps and module paths, plus
//! JSON file logging in debug builds for post-mortem analysis.
//! Integrates with the configuration system for runtime log level
//! control.

use std::path::Path;

use tellus_config::Config;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// Sets up console output with timestamps, module paths, and severity
/// levels; environment-based filtering (respects RUST_LOG); and, in
/// debug builds with a log directory, a JSON file layer.
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = match config {
        Some(config) if !config.debug.log_level.is_empty() => config.debug.log_level.clone(),
        _ => "info".to_string(),
    };

    // RUST_LOG wins over the configured level.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build {
        if let Some(log_dir) = log_dir {
            if std::fs::create_dir_all(log_dir).is_ok() {
                if let Ok(log_file) = std::fs::File::create(log_dir.join("tellus.log")) {
                    let file_layer = fmt::layer()
                        .with_writer(log_file)
                        .with_ansi(false)
                        .with_target(true)
                        .with_timer(fmt::time::uptime())
                        .json();
                    subscriber.with(file_layer).init();
                    tracing::info!(
                        file = %log_dir.join("tellus.log").display(),
                        "logging initialized with JSON file output"
                    );
                    return;
                }
            }
        }
    }

    subscriber.init();
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new("info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level() {
        let filter = default_env_filter();
        assert!(format!("{}", filter).contains("info"));
    }

    #[test]
    fn test_subsystem_filter() {
        let filter = EnvFilter::new("info,tellus_traversal=debug");
        let filter_str = format!("{}", filter);
        assert!(filter_str.contains("tellus_traversal=debug"));
        assert!(filter_str.contains("info"));
    }

    #[test]
    fn test_env_filter_parsing() {
        let valid_filters = [
            "info",
            "debug,tellus_resources=trace",
            "warn,tellus_traversal=debug",
            "error",
        ];
        for filter_str in &valid_filters {
            let result = EnvFilter::try_from(*filter_str);
            assert!(result.is_ok(), "Failed to parse filter: {}", filter_str);
        }
    }

    #[test]
    fn test_file_logger_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path();
        std::fs::create_dir_all(log_path).unwrap();
        let log_file_path = log_path.join("tellus.log");
        assert_eq!(log_file_path.file_name().unwrap(), "tellus.log");
    }
}
