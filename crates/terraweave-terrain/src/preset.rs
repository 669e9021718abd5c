//! Biome presets: named bundles of layers, base height and erosion.

use serde::{Deserialize, Serialize};

use crate::curve::{Keyframe, ResponseCurve};
use crate::erosion::ErosionSettings;
use crate::generator::TerrainSettings;
use crate::noise_layer::{FractalKind, LayerSettings, NoiseKind};

/// Terrain shape handed to a generator as a unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomePreset {
    pub name: String,
    pub base_height: f32,
    pub layers: Vec<LayerSettings>,
    pub erosion: ErosionSettings,
}

impl Default for BiomePreset {
    fn default() -> Self {
        Self::rolling_hills()
    }
}

impl BiomePreset {
    /// Broad low hills with light erosion.
    pub fn rolling_hills() -> Self {
        Self {
            name: "rolling_hills".into(),
            base_height: 0.05,
            layers: vec![
                LayerSettings {
                    scale: 120.0,
                    octaves: 5,
                    depth: 600.0,
                    seed: 1,
                    ..Default::default()
                },
                LayerSettings {
                    scale: 30.0,
                    octaves: 3,
                    depth: 150.0,
                    seed: 2,
                    noise: NoiseKind::Perlin,
                    ..Default::default()
                },
            ],
            erosion: ErosionSettings {
                strength: 0.6,
                ..Default::default()
            },
        }
    }

    /// Ridged peaks over a flattened lowland.
    pub fn mountains() -> Self {
        let plateau = ResponseCurve::new(vec![
            Keyframe::new(0.0, 0.0, 0.0),
            Keyframe::new(0.4, 0.1, 0.2),
            Keyframe::new(1.0, 1.0, 2.0),
        ]);
        Self {
            name: "mountains".into(),
            base_height: 0.0,
            layers: vec![
                LayerSettings {
                    fractal: FractalKind::Ridged,
                    scale: 90.0,
                    octaves: 6,
                    depth: 900.0,
                    seed: 11,
                    curve: plateau,
                    ..Default::default()
                },
                LayerSettings {
                    noise: NoiseKind::OpenSimplex,
                    fractal: FractalKind::Billow,
                    scale: 25.0,
                    octaves: 3,
                    depth: 120.0,
                    seed: 12,
                    ..Default::default()
                },
            ],
            erosion: ErosionSettings {
                iterations: 8000,
                erosion_steps: 3,
                strength: 0.9,
                ..Default::default()
            },
        }
    }

    /// Look up a built-in preset by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "rolling_hills" => Some(Self::rolling_hills()),
            "mountains" => Some(Self::mountains()),
            _ => None,
        }
    }

    /// Overwrite the layer stack, base height and erosion of `settings`.
    pub fn apply_to(&self, settings: &mut TerrainSettings) {
        settings.base_height = self.base_height;
        settings.layers = self.layers.clone();
        settings.erosion = self.erosion.clone();
    }
}
