//! Per-tile generation pipeline.
//!
//! Layers (cache-checked) → composition → erosion → edge smoothing. Each call
//! builds a fresh [`GenerationInvalidation`] and hands it from stage to stage.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::blur::{BlurStrategy, select_blur_strategy};
use crate::compositor::HeightfieldCompositor;
use crate::erosion::{ErosionKernel, ErosionSettings, HydraulicErosionSimulator};
use crate::error::TerrainError;
use crate::heightfield::{Heightfield, check_resolution};
use crate::invalidation::GenerationInvalidation;
use crate::layer_cache::LayerCache;
use crate::noise_layer::LayerSettings;
use crate::smoothing::{EdgeSmoothSettings, EdgeSmoother};
use crate::storage::TileStorage;

/// Everything one tile needs to produce its heightfield.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Samples per side (`2^k + 1`).
    pub resolution: usize,
    /// World-space edge length.
    pub tile_size: f32,
    /// Height every sample starts from before layers are added.
    pub base_height: f32,
    /// Skip layers and erosion and emit a flat `base_height` field.
    pub empty_biome: bool,
    pub layers: Vec<LayerSettings>,
    pub erosion: ErosionSettings,
    pub smoothing: EdgeSmoothSettings,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            resolution: 129,
            tile_size: 1000.0,
            base_height: 0.0,
            empty_biome: false,
            layers: vec![LayerSettings::default()],
            erosion: ErosionSettings::default(),
            smoothing: EdgeSmoothSettings::default(),
        }
    }
}

/// Outcome of one tile generation.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationReport {
    pub resolution: usize,
    pub invalidation: GenerationInvalidation,
    /// Layers recomputed during this generation.
    pub layers_computed: u64,
    /// Layers skipped because their settings were malformed.
    pub layers_skipped: usize,
    pub eroded: bool,
    pub smoothed: bool,
    pub height_range: (f32, f32),
    pub elapsed: Duration,
}

/// Inputs of the composition stage other than the layer buffers.
#[derive(Clone, Copy, Debug, PartialEq)]
struct CompositionKey {
    base_height: f32,
    layer_count: usize,
    empty_biome: bool,
}

/// Runs the pipeline for a single tile and keeps its caches between runs.
pub struct TerrainGenerator {
    layers: LayerCache,
    erosion: HydraulicErosionSimulator,
    blur: Arc<dyn BlurStrategy>,
    last_resolution: Option<usize>,
    last_composition: Option<CompositionKey>,
    /// Indices of the layers that made it into the last composition.
    last_usable: Option<Vec<usize>>,
    generation_count: u64,
}

impl Default for TerrainGenerator {
    fn default() -> Self {
        Self::with_blur(select_blur_strategy())
    }
}

impl TerrainGenerator {
    pub fn with_blur(blur: Arc<dyn BlurStrategy>) -> Self {
        Self {
            layers: LayerCache::new(),
            erosion: HydraulicErosionSimulator::default(),
            blur,
            last_resolution: None,
            last_composition: None,
            last_usable: None,
            generation_count: 0,
        }
    }

    /// Generator with an explicit erosion kernel.
    pub fn with_kernel(blur: Arc<dyn BlurStrategy>, kernel: Arc<dyn ErosionKernel>) -> Self {
        Self {
            erosion: HydraulicErosionSimulator::new(kernel),
            ..Self::with_blur(blur)
        }
    }

    pub fn layer_cache(&self) -> &LayerCache {
        &self.layers
    }

    pub fn erosion(&self) -> &HydraulicErosionSimulator {
        &self.erosion
    }

    pub fn generation_count(&self) -> u64 {
        self.generation_count
    }

    /// Run the full pipeline and return the tile heightfield.
    ///
    /// # Errors
    ///
    /// Only an invalid tile resolution is fatal. Malformed layers are logged
    /// and skipped; erosion and smoothing failures fall back to their input.
    pub fn generate(
        &mut self,
        settings: &TerrainSettings,
    ) -> Result<(Heightfield, GenerationReport), TerrainError> {
        let start = Instant::now();
        let res = check_resolution(settings.resolution)?;
        let mut invalidation = GenerationInvalidation::default();

        if self.last_resolution != Some(res) {
            invalidation.resolution_changed = true;
            self.layers.invalidate_all();
        }
        let composition = CompositionKey {
            base_height: settings.base_height,
            layer_count: settings.layers.len(),
            empty_biome: settings.empty_biome,
        };
        if self.last_composition != Some(composition) {
            invalidation.composition_modified = true;
        }
        self.layers.truncate(settings.layers.len());
        self.last_resolution = Some(res);
        self.last_composition = Some(composition);

        let computed_before = self.layers.compute_count();
        let mut layers_skipped = 0;
        let mut eroded = false;
        let mut smoothed = false;

        let field = if settings.empty_biome {
            debug!(resolution = res, "empty biome, emitting flat tile");
            Heightfield::flat(res, settings.base_height)?
        } else {
            let mut usable = Vec::with_capacity(settings.layers.len());
            for (index, layer) in settings.layers.iter().enumerate() {
                match self.layers.get_or_compute(
                    index,
                    layer,
                    res,
                    false,
                    &mut invalidation,
                    self.blur.as_ref(),
                ) {
                    Ok(_) => usable.push(index),
                    Err(e) => {
                        error!(layer = index, error = %e, "skipping layer");
                        layers_skipped += 1;
                    }
                }
            }
            if self.last_usable.as_deref() != Some(usable.as_slice()) {
                invalidation.composition_modified = true;
                self.last_usable = Some(usable.clone());
            }

            let inputs: Vec<(&LayerSettings, &Heightfield)> = usable
                .iter()
                .filter_map(|&i| Some((&settings.layers[i], self.layers.get(i)?)))
                .collect();
            let mut field = HeightfieldCompositor::compose(settings.base_height, res, &inputs)?;

            if settings.erosion.enabled {
                field = self.erosion.run(&field, &settings.erosion, &mut invalidation);
                eroded = true;
            }

            if settings.smoothing.enabled {
                match EdgeSmoother::smooth(
                    &field,
                    settings.smoothing.blur_radius,
                    &settings.smoothing.falloff,
                    self.blur.as_ref(),
                ) {
                    Ok(soft) => {
                        field = soft;
                        smoothed = true;
                    }
                    Err(e) => error!(error = %e, "edge smoothing skipped"),
                }
            }
            field
        };

        self.generation_count += 1;
        let report = GenerationReport {
            resolution: res,
            invalidation,
            layers_computed: self.layers.compute_count() - computed_before,
            layers_skipped,
            eroded,
            smoothed,
            height_range: field.min_max(),
            elapsed: start.elapsed(),
        };
        debug!(
            resolution = res,
            layers_computed = report.layers_computed,
            eroded,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "tile generated"
        );
        Ok((field, report))
    }

    /// Generate and commit the result to `storage`.
    pub fn generate_into(
        &mut self,
        settings: &TerrainSettings,
        storage: &mut dyn TileStorage,
    ) -> Result<GenerationReport, TerrainError> {
        let (field, report) = self.generate(settings)?;
        if storage.resolution() != field.resolution() {
            info!(
                from = storage.resolution(),
                to = field.resolution(),
                "resizing tile storage"
            );
            storage.set_resolution(field.resolution())?;
        }
        storage.set_size(settings.tile_size);
        storage.set_heights(0, 0, &field)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blur::SequentialBlur;
    use crate::storage::MemoryTileStorage;

    fn settings() -> TerrainSettings {
        TerrainSettings {
            resolution: 33,
            tile_size: 100.0,
            base_height: 0.1,
            layers: vec![
                LayerSettings {
                    scale: 20.0,
                    depth: 500.0,
                    seed: 3,
                    ..Default::default()
                },
                LayerSettings {
                    scale: 8.0,
                    depth: 100.0,
                    seed: 4,
                    ..Default::default()
                },
            ],
            erosion: ErosionSettings {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn generator() -> TerrainGenerator {
        TerrainGenerator::with_blur(Arc::new(SequentialBlur))
    }

    #[test]
    fn test_first_generation_invalidates_everything_upstream() {
        let mut generator = generator();
        let (_, report) = generator.generate(&settings()).unwrap();
        assert!(report.invalidation.resolution_changed);
        assert!(report.invalidation.composition_modified);
        assert!(report.invalidation.layers_modified);
        assert_eq!(report.layers_computed, 2);
    }

    #[test]
    fn test_regeneration_hits_cache() {
        let mut generator = generator();
        let (a, _) = generator.generate(&settings()).unwrap();
        let (b, report) = generator.generate(&settings()).unwrap();
        assert_eq!(a, b);
        assert_eq!(report.layers_computed, 0, "unchanged layers must come from the cache");
        assert!(!report.invalidation.base_changed());
        assert_eq!(generator.generation_count(), 2);
    }

    #[test]
    fn test_one_layer_change_recomputes_one_layer() {
        let mut generator = generator();
        generator.generate(&settings()).unwrap();
        let mut changed = settings();
        changed.layers[1].seed = 99;
        let (_, report) = generator.generate(&changed).unwrap();
        assert_eq!(report.layers_computed, 1);
    }

    #[test]
    fn test_empty_biome_is_flat() {
        let mut generator = generator();
        let s = TerrainSettings {
            empty_biome: true,
            ..settings()
        };
        let (field, report) = generator.generate(&s).unwrap();
        assert_eq!(field.min_max(), (0.1, 0.1));
        assert_eq!(report.layers_computed, 0);
        assert!(!report.eroded);
    }

    #[test]
    fn test_malformed_layer_skipped() {
        let mut generator = generator();
        let mut s = settings();
        s.layers[0].octaves = 0;
        let (field, report) = generator.generate(&s).unwrap();
        assert_eq!(report.layers_skipped, 1);
        assert!(field.min_max().1 > 0.1, "the remaining layer still contributes");
    }

    #[test]
    fn test_erosion_stage_runs_when_enabled() {
        let mut generator = generator();
        let mut s = settings();
        s.erosion = ErosionSettings {
            enabled: true,
            iterations: 200,
            erosion_resolution: 17,
            erosion_steps: 1,
            erosion_radius: 2,
            ..Default::default()
        };
        let (plain, _) = generator.generate(&settings()).unwrap();
        let (eroded, report) = generator.generate(&s).unwrap();
        assert!(report.eroded);
        assert_eq!(generator.erosion().simulation_count(), 1);
        assert_ne!(plain, eroded);
    }

    fn eroding(mut s: TerrainSettings) -> TerrainSettings {
        s.erosion = ErosionSettings {
            enabled: true,
            iterations: 200,
            erosion_resolution: 17,
            erosion_steps: 1,
            erosion_radius: 2,
            ..Default::default()
        };
        s
    }

    #[test]
    fn test_layer_edit_while_erosion_off_is_not_masked() {
        let mut generator = generator();
        generator.generate(&eroding(settings())).unwrap();

        // The layer is recomputed while erosion is off, so the next eroded
        // run sees a clean layer record but a different base.
        let mut edited = settings();
        edited.layers[0].seed = 77;
        generator.generate(&edited).unwrap();
        let (field, _) = generator.generate(&eroding(edited.clone())).unwrap();
        assert_eq!(generator.erosion().simulation_count(), 2);

        let mut reference = TerrainGenerator::with_blur(Arc::new(SequentialBlur));
        let (fresh, _) = reference.generate(&eroding(edited)).unwrap();
        assert_eq!(field, fresh, "erosion must start from the edited layers");
    }

    #[test]
    fn test_layer_turning_malformed_changes_composition() {
        let mut generator = generator();
        generator.generate(&eroding(settings())).unwrap();

        let mut broken = eroding(settings());
        broken.layers[1].octaves = 0;
        let (_, report) = generator.generate(&broken).unwrap();
        assert_eq!(report.layers_skipped, 1);
        assert!(report.invalidation.composition_modified);
        assert_eq!(
            generator.erosion().simulation_count(),
            2,
            "losing a layer must resimulate erosion"
        );
    }

    #[test]
    fn test_generate_into_commits_to_storage() {
        let mut generator = generator();
        let mut storage = MemoryTileStorage::new(9, 1.0).unwrap();
        generator.generate_into(&settings(), &mut storage).unwrap();
        assert_eq!(storage.resolution(), 33);
        assert_eq!(storage.size(), 100.0);
        let (field, _) = generator.generate(&settings()).unwrap();
        assert_eq!(storage.get_heights(0, 0, 33, 33).unwrap(), field);
    }

    #[test]
    fn test_invalid_resolution_is_fatal() {
        let mut generator = generator();
        let s = TerrainSettings {
            resolution: 32,
            ..settings()
        };
        assert_eq!(
            generator.generate(&s).unwrap_err(),
            TerrainError::InvalidResolution(32)
        );
    }
}
