//! Configuration system for the Tellus map browser.
//!
//! Runtime-configurable settings that persist to disk as RON files,
//! with CLI overrides via clap, hot-reload detection, and
//! forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CacheConfig, CameraConfig, Config, DebugConfig};
pub use error::ConfigError;
