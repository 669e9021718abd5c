//! Command-line argument parsing for terraweave.

use std::path::PathBuf;

use clap::Parser;
use terraweave_terrain::BiomePreset;

use crate::Config;

/// terraweave command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "terraweave", about = "Procedural tile-grid terrain generator")]
pub struct CliArgs {
    /// Tiles along y.
    #[arg(long)]
    pub rows: Option<usize>,

    /// Tiles along x.
    #[arg(long)]
    pub columns: Option<usize>,

    /// Samples per tile side (2^k + 1).
    #[arg(long)]
    pub resolution: Option<usize>,

    /// Seed for erosion; layer `i` gets `seed + i`.
    #[arg(long)]
    pub seed: Option<u32>,

    /// Enable or disable erosion.
    #[arg(long)]
    pub erosion: Option<bool>,

    /// Built-in preset (rolling_hills, mountains).
    #[arg(long)]
    pub preset: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Keep running and regenerate tiles when `config.ron` changes.
    #[arg(long)]
    pub watch: bool,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    ///
    /// The preset is swapped first so seed and erosion overrides apply to it.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref name) = args.preset {
            match BiomePreset::builtin(name) {
                Some(preset) => self.preset = preset,
                None => log::warn!("Unknown preset '{name}', keeping configured preset"),
            }
        }
        if let Some(rows) = args.rows {
            self.grid.rows = rows;
        }
        if let Some(columns) = args.columns {
            self.grid.columns = columns;
        }
        if let Some(resolution) = args.resolution {
            self.generation.resolution = resolution;
        }
        if let Some(seed) = args.seed {
            self.preset.erosion.seed = seed as u64;
            for (i, layer) in self.preset.layers.iter_mut().enumerate() {
                layer.seed = seed.wrapping_add(i as u32);
            }
        }
        if let Some(enabled) = args.erosion {
            self.preset.erosion.enabled = enabled;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
