//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use terraweave_terrain::{
    BiomePreset, BlendSettings, EdgeSmoothSettings, GridSettings, TerrainSettings,
    check_resolution,
};

use crate::error::ConfigError;

/// File name inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Platform config directory for terraweave, if the platform has one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("terraweave"))
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Per-tile generation settings.
    pub generation: GenerationConfig,
    /// Grid layout and edge blending.
    pub grid: GridConfig,
    /// Layer stack, base height and erosion.
    pub preset: BiomePreset,
    /// Blur toward each tile's own border.
    pub smoothing: EdgeSmoothSettings,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Per-tile generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Samples per tile side (`2^k + 1`).
    pub resolution: usize,
    /// World-space edge length of a tile.
    pub tile_size: f32,
    /// Emit flat tiles at the preset's base height.
    pub empty_biome: bool,
    /// Delay before a requested regeneration runs.
    pub debounce_ms: u64,
}

/// Grid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    /// Tiles along `y` (2..=12).
    pub rows: usize,
    /// Tiles along `x` (2..=12).
    pub columns: usize,
    /// World-space width of the blended band at each stitched edge.
    pub transition_width: f32,
    /// Weight of the neighbour inside the band (0.0 - 1.0).
    pub transition_strength: f32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write a JSON log file next to the config in debug builds.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            resolution: 129,
            tile_size: 1000.0,
            empty_biome: false,
            debounce_ms: 100,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: 3,
            columns: 3,
            transition_width: 100.0,
            transition_strength: 1.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: true,
        }
    }
}

// --- Conversion into terrain settings ---

impl Config {
    /// Settings each tile starts from.
    pub fn terrain_settings(&self) -> TerrainSettings {
        let mut settings = TerrainSettings {
            resolution: self.generation.resolution,
            tile_size: self.generation.tile_size,
            empty_biome: self.generation.empty_biome,
            smoothing: self.smoothing,
            ..Default::default()
        };
        self.preset.apply_to(&mut settings);
        settings
    }

    pub fn grid_settings(&self) -> GridSettings {
        GridSettings {
            rows: self.grid.rows,
            columns: self.grid.columns,
        }
    }

    pub fn blend_settings(&self) -> BlendSettings {
        BlendSettings {
            transition_width: self.grid.transition_width,
            transition_strength: self.grid.transition_strength,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.generation.debounce_ms)
    }

    /// Check every value the pipeline would otherwise reject later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_resolution(self.generation.resolution)?;
        if !(self.generation.tile_size.is_finite() && self.generation.tile_size > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "tile_size must be positive, got {}",
                self.generation.tile_size
            )));
        }
        self.grid_settings().validate()?;
        if !(self.grid.transition_width.is_finite() && self.grid.transition_width >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "transition_width must be non-negative, got {}",
                self.grid.transition_width
            )));
        }
        if !(0.0..=1.0).contains(&self.grid.transition_strength) {
            return Err(ConfigError::ValidationError(format!(
                "transition_strength must lie in [0, 1], got {}",
                self.grid.transition_strength
            )));
        }
        for layer in &self.preset.layers {
            layer.validate()?;
        }
        if self.preset.erosion.enabled {
            self.preset.erosion.validate()?;
        }
        self.smoothing.falloff.validate()?;
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
