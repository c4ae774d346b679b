//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;
use tellus_traversal::TraverseMode;

use crate::Config;

/// Tellus map browser command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "tellus", about = "Tellus map browser")]
pub struct CliArgs {
    /// Viewport width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Traversal policy for surface layers
    /// (none, flat, hierarchical, stable, balanced, fixed, distance).
    #[arg(long)]
    pub surface_mode: Option<String>,

    /// Traversal policy for geodata layers.
    #[arg(long)]
    pub geodata_mode: Option<String>,

    /// LOD ceiling of the fixed-family policies.
    #[arg(long)]
    pub fixed_lod: Option<u32>,

    /// Distance gate of the fixed-family policies.
    #[arg(long)]
    pub fixed_distance: Option<f64>,

    /// Mesh cache budget in MiB.
    #[arg(long)]
    pub mesh_budget_mb: Option<usize>,

    /// Texture cache budget in MiB.
    #[arg(long)]
    pub texture_budget_mb: Option<usize>,

    /// Fetch worker threads (0 = auto).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn parse_mode(name: &str) -> Option<TraverseMode> {
    match name {
        "none" => Some(TraverseMode::None),
        "flat" => Some(TraverseMode::Flat),
        "hierarchical" => Some(TraverseMode::Hierarchical),
        "stable" => Some(TraverseMode::Stable),
        "balanced" => Some(TraverseMode::Balanced),
        "fixed" => Some(TraverseMode::Fixed),
        "distance" => Some(TraverseMode::DistanceBaseFixed),
        other => {
            log::warn!("unknown traversal mode '{other}', keeping configured value");
            None
        }
    }
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.camera.viewport_width = w;
        }
        if let Some(h) = args.height {
            self.camera.viewport_height = h;
        }
        if let Some(mode) = args.surface_mode.as_deref().and_then(parse_mode) {
            self.traversal.surface_mode = mode;
        }
        if let Some(mode) = args.geodata_mode.as_deref().and_then(parse_mode) {
            self.traversal.geodata_mode = mode;
        }
        if let Some(lod) = args.fixed_lod {
            self.traversal.fixed_lod = lod;
        }
        if let Some(distance) = args.fixed_distance {
            self.traversal.fixed_distance = distance;
        }
        if let Some(mb) = args.mesh_budget_mb {
            self.cache.mesh_budget_mb = mb;
        }
        if let Some(mb) = args.texture_budget_mb {
            self.cache.texture_budget_mb = mb;
        }
        if let Some(workers) = args.workers {
            self.cache.worker_threads = workers;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> CliArgs {
        CliArgs {
            width: None,
            height: None,
            surface_mode: None,
            geodata_mode: None,
            fixed_lod: None,
            fixed_distance: None,
            mesh_budget_mb: None,
            texture_budget_mb: None,
            workers: None,
            log_level: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let mut args = empty_args();
        args.width = Some(1920);
        args.surface_mode = Some("hierarchical".to_string());
        config.apply_cli_overrides(&args);
        assert_eq!(config.camera.viewport_width, 1920);
        assert_eq!(config.traversal.surface_mode, TraverseMode::Hierarchical);
        // Non-overridden fields retain defaults
        assert_eq!(config.camera.viewport_height, 720);
        assert_eq!(config.cache.mesh_budget_mb, 512);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&empty_args());
        assert_eq!(config, original);
    }

    #[test]
    fn test_unknown_mode_keeps_configured_value() {
        let mut config = Config::default();
        let mut args = empty_args();
        args.surface_mode = Some("quantum".to_string());
        config.apply_cli_overrides(&args);
        assert_eq!(config.traversal.surface_mode, TraverseMode::Balanced);
    }
}
