//! The binary entry point for the Tellus map browser.

mod platform;

use clap::Parser;
use tellus_app::browser::Browser;
use tellus_config::{CliArgs, Config};

/// Frames the demo session runs before exiting.
const DEMO_FRAMES: u64 = 600;

fn main() {
    let args = CliArgs::parse();

    let dirs = match platform::PlatformDirs::resolve_and_create() {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("failed to initialize platform directories: {e}");
            std::process::exit(1);
        }
    };

    let config_dir = args
        .config
        .clone()
        .unwrap_or_else(|| dirs.config_dir.clone());
    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}; using defaults");
            Config::default()
        }
    };
    config.apply_cli_overrides(&args);

    tellus_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    tracing::info!(
        config = %config_dir.display(),
        logs = %dirs.log_dir.display(),
        "tellus starting"
    );

    let mut browser = Browser::new(config);
    browser.run(DEMO_FRAMES);
}
