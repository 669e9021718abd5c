//! Hydraulic droplet erosion.
//!
//! Erosion runs in several passes of increasing resolution. Each pass
//! resamples the current result down to its working resolution, lets a kernel
//! simulate droplets there, and upsamples the outcome back to the tile
//! resolution. The eroded buffer is cached together with the base it was
//! computed from, so strength and falloff changes can be re-applied without
//! another simulation while any change to the base forces a new one.

mod brush;
pub mod kernel;

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

pub use brush::ErosionBrush;
pub use kernel::{CpuErosionKernel, DropletParams, ErosionKernel, KernelInput};

use crate::error::TerrainError;
use crate::falloff::{FalloffMask, FalloffPolarity, FalloffSettings};
use crate::heightfield::{Heightfield, MAX_RESOLUTION, is_valid_resolution};
use crate::invalidation::GenerationInvalidation;
use crate::math::lerp;

/// Erosion configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosionSettings {
    /// Run erosion at all.
    pub enabled: bool,
    /// Seed for droplet start positions. Pass `p` uses `seed + p`.
    pub seed: u64,
    /// Droplets in the first pass; doubled every pass.
    pub iterations: u32,
    /// Working resolution of the first pass (`2^k + 1`).
    pub erosion_resolution: usize,
    /// Number of passes.
    pub erosion_steps: u32,
    /// Brush radius in working-resolution samples.
    pub erosion_radius: u32,
    /// 0 follows the slope exactly, 1 never turns.
    pub inertia: f32,
    /// Sediment carried per unit of drop, speed and water.
    pub sediment_capacity_factor: f32,
    /// Capacity floor for droplets on flat ground.
    pub min_sediment_capacity: f32,
    /// Fraction of free capacity eroded per step (0..=1).
    pub erode_speed: f32,
    /// Fraction of surplus sediment deposited per step (0..=1).
    pub deposit_speed: f32,
    /// Fraction of water evaporated per step (0..=1).
    pub evaporate_speed: f32,
    /// Acceleration gained per unit of height lost.
    pub gravity: f32,
    /// Maximum steps a droplet lives.
    pub max_droplet_lifetime: u32,
    /// Water each droplet starts with.
    pub initial_water_volume: f32,
    /// Speed each droplet starts with.
    pub initial_speed: f32,
    /// Blend weight between the base and the eroded field.
    pub strength: f32,
    /// Fade erosion out toward the tile border.
    pub use_falloff: bool,
    /// Inward mask used when `use_falloff` is set.
    pub falloff: FalloffSettings,
}

impl Default for ErosionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: 0,
            iterations: 4000,
            erosion_resolution: 129,
            erosion_steps: 2,
            erosion_radius: 3,
            inertia: 0.05,
            sediment_capacity_factor: 4.0,
            min_sediment_capacity: 0.01,
            erode_speed: 0.3,
            deposit_speed: 0.3,
            evaporate_speed: 0.01,
            gravity: 4.0,
            max_droplet_lifetime: 30,
            initial_water_volume: 1.0,
            initial_speed: 1.0,
            strength: 1.0,
            use_falloff: false,
            falloff: FalloffSettings::default(),
        }
    }
}

impl ErosionSettings {
    /// Reject settings no kernel can simulate.
    pub fn validate(&self) -> Result<(), TerrainError> {
        if !is_valid_resolution(self.erosion_resolution) {
            return Err(TerrainError::InvalidResolution(self.erosion_resolution));
        }
        if self.erosion_steps == 0 {
            return Err(TerrainError::ConfigurationMismatch(
                "erosion needs at least one pass".into(),
            ));
        }
        if self.erosion_radius == 0 {
            return Err(TerrainError::ConfigurationMismatch(
                "erosion radius must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.inertia) || !(0.0..=1.0).contains(&self.evaporate_speed) {
            return Err(TerrainError::ConfigurationMismatch(format!(
                "inertia {} and evaporate speed {} must lie in [0, 1]",
                self.inertia, self.evaporate_speed
            )));
        }
        if !self.strength.is_finite() {
            return Err(TerrainError::ConfigurationMismatch(
                "erosion strength must be finite".into(),
            ));
        }
        self.falloff.validate()
    }

    /// Working resolution of pass `pass`.
    pub fn pass_resolution(&self, pass: u32) -> usize {
        let factor = 1usize.checked_shl(pass).unwrap_or(usize::MAX);
        (self.erosion_resolution - 1)
            .saturating_mul(factor)
            .saturating_add(1)
            .min(MAX_RESOLUTION)
    }

    /// Droplet count of pass `pass`.
    pub fn pass_iterations(&self, pass: u32) -> u32 {
        self.iterations
            .saturating_mul(1u32.checked_shl(pass).unwrap_or(u32::MAX))
    }

    pub fn droplet_params(&self) -> DropletParams {
        DropletParams {
            inertia: self.inertia,
            sediment_capacity_factor: self.sediment_capacity_factor,
            min_sediment_capacity: self.min_sediment_capacity,
            erode_speed: self.erode_speed,
            deposit_speed: self.deposit_speed,
            evaporate_speed: self.evaporate_speed,
            gravity: self.gravity,
            max_lifetime: self.max_droplet_lifetime,
            initial_water_volume: self.initial_water_volume,
            initial_speed: self.initial_speed,
        }
    }
}

/// The subset of [`ErosionSettings`] whose change forces a new simulation.
///
/// Everything else (strength, falloff, and the speeds and seed) is only picked
/// up by the next simulation triggered for another reason, such as a change
/// of the base field.
#[derive(Clone, Copy, Debug, PartialEq)]
struct SimulationKey {
    iterations: u32,
    erosion_resolution: usize,
    erosion_steps: u32,
    erosion_radius: u32,
    inertia: f32,
    min_sediment_capacity: f32,
    max_droplet_lifetime: u32,
    initial_water_volume: f32,
}

impl From<&ErosionSettings> for SimulationKey {
    fn from(s: &ErosionSettings) -> Self {
        Self {
            iterations: s.iterations,
            erosion_resolution: s.erosion_resolution,
            erosion_steps: s.erosion_steps,
            erosion_radius: s.erosion_radius,
            inertia: s.inertia,
            min_sediment_capacity: s.min_sediment_capacity,
            max_droplet_lifetime: s.max_droplet_lifetime,
            initial_water_volume: s.initial_water_volume,
        }
    }
}

struct CachedErosion {
    key: SimulationKey,
    /// The field the simulation started from.
    base: Heightfield,
    eroded: Heightfield,
}

/// Multi-pass droplet erosion with a cached result.
pub struct HydraulicErosionSimulator {
    kernel: Arc<dyn ErosionKernel>,
    cached: Option<CachedErosion>,
    simulation_count: u64,
}

impl Default for HydraulicErosionSimulator {
    fn default() -> Self {
        Self::new(Arc::new(CpuErosionKernel::default()))
    }
}

impl HydraulicErosionSimulator {
    pub fn new(kernel: Arc<dyn ErosionKernel>) -> Self {
        Self {
            kernel,
            cached: None,
            simulation_count: 0,
        }
    }

    /// Number of full simulations run so far.
    pub fn simulation_count(&self) -> u64 {
        self.simulation_count
    }

    /// The eroded buffer from the last simulation, before strength/falloff.
    pub fn cached_eroded(&self) -> Option<&Heightfield> {
        self.cached.as_ref().map(|c| &c.eroded)
    }

    pub fn clear_cache(&mut self) {
        self.cached = None;
    }

    /// Run every pass over `base` and return the fully eroded field.
    ///
    /// # Errors
    ///
    /// Invalid settings, or any kernel failure, as
    /// [`TerrainError::SimulationFailure`] / [`TerrainError::ConfigurationMismatch`].
    pub fn erode(
        &self,
        base: &Heightfield,
        settings: &ErosionSettings,
    ) -> Result<Heightfield, TerrainError> {
        settings.validate()?;
        let full = base.resolution();
        let brush = ErosionBrush::new(settings.erosion_radius);
        let params = settings.droplet_params();
        let radius = settings.erosion_radius as usize;

        let mut current = base.clone();
        for pass in 0..settings.erosion_steps {
            let res = settings.pass_resolution(pass);
            if res < 2 * radius + 2 {
                return Err(TerrainError::SimulationFailure(format!(
                    "pass {pass} resolution {res} is too small for radius {radius}"
                )));
            }
            let working = current.resample_nearest(res)?;

            let mut rng = ChaCha8Rng::seed_from_u64(settings.seed.wrapping_add(pass as u64));
            let count = settings.pass_iterations(pass) as usize;
            let starts: Vec<u32> = (0..count)
                .map(|_| {
                    let x = rng.random_range(radius..=res - 1 - radius);
                    let y = rng.random_range(radius..=res - 1 - radius);
                    (y * res + x) as u32
                })
                .collect();

            let input = KernelInput {
                resolution: res,
                heights: working.as_slice(),
                start_indices: &starts,
                brush: &brush,
                params,
            };
            let out = self.kernel.dispatch(&input)?;
            let eroded = Heightfield::from_vec(res, out).map_err(|e| {
                TerrainError::SimulationFailure(format!("kernel returned a bad buffer: {e}"))
            })?;
            debug!(
                pass,
                resolution = res,
                droplets = count,
                kernel = self.kernel.name(),
                "erosion pass complete"
            );
            current = eroded.resample_bilinear(full)?;
        }
        Ok(current)
    }

    /// Blend `eroded` over `base` by strength and optional inward falloff.
    ///
    /// Pure: applying the same inputs twice yields the same field.
    pub fn apply(
        base: &Heightfield,
        eroded: &Heightfield,
        settings: &ErosionSettings,
    ) -> Result<Heightfield, TerrainError> {
        let res = base.resolution();
        if eroded.resolution() != res {
            return Err(TerrainError::ConfigurationMismatch(format!(
                "eroded field is {} samples wide, base is {res}",
                eroded.resolution()
            )));
        }
        let mask = if settings.use_falloff {
            Some(FalloffMask::generate(
                res,
                &settings.falloff,
                FalloffPolarity::RisingInward,
            )?)
        } else {
            None
        };

        let mut out = base.clone();
        for (i, sample) in out.as_mut_slice().iter_mut().enumerate() {
            let weight = match &mask {
                Some(mask) => settings.strength * mask.as_slice()[i],
                None => settings.strength,
            };
            *sample = lerp(base.as_slice()[i], eroded.as_slice()[i], weight);
        }
        Ok(out)
    }

    /// Erode `base`, reusing the cached simulation when nothing relevant moved.
    ///
    /// Failures are logged and the pre-erosion field is returned unchanged.
    pub fn run(
        &mut self,
        base: &Heightfield,
        settings: &ErosionSettings,
        invalidation: &mut GenerationInvalidation,
    ) -> Heightfield {
        let key = SimulationKey::from(settings);
        let reusable = match &self.cached {
            Some(cached) => {
                if cached.key != key {
                    invalidation.erosion_modified = true;
                }
                cached.key == key && cached.base == *base
            }
            None => false,
        };

        if !reusable || invalidation.base_changed() {
            match self.erode(base, settings) {
                Ok(eroded) => {
                    self.simulation_count += 1;
                    info!(
                        passes = settings.erosion_steps,
                        droplets = settings.iterations,
                        "erosion simulated"
                    );
                    self.cached = Some(CachedErosion {
                        key,
                        base: base.clone(),
                        eroded,
                    });
                }
                Err(e) => {
                    error!(error = %e, "erosion failed, keeping the uneroded field");
                    self.cached = None;
                    return base.clone();
                }
            }
        } else {
            debug!("reapplying cached erosion");
        }

        let Some(cached) = &self.cached else {
            return base.clone();
        };
        match Self::apply(base, &cached.eroded, settings) {
            Ok(field) => field,
            Err(e) => {
                error!(error = %e, "could not apply erosion");
                base.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hill(res: usize) -> Heightfield {
        let mut field = Heightfield::flat(res, 0.0).unwrap();
        let c = (res - 1) as f32 / 2.0;
        for y in 0..res {
            for x in 0..res {
                let dx = x as f32 - c;
                let dy = y as f32 - c;
                let d = (dx * dx + dy * dy).sqrt() / c;
                field.set(x, y, (1.0 - d).max(0.0) * 0.8 + 0.1 + (x as f32 * 0.9).sin() * 0.01);
            }
        }
        field
    }

    fn settings() -> ErosionSettings {
        ErosionSettings {
            iterations: 300,
            erosion_resolution: 33,
            erosion_steps: 2,
            erosion_radius: 2,
            seed: 11,
            ..Default::default()
        }
    }

    struct FailingKernel;

    impl ErosionKernel for FailingKernel {
        fn dispatch(&self, _input: &KernelInput<'_>) -> Result<Vec<f32>, TerrainError> {
            Err(TerrainError::SimulationFailure("device lost".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_pass_schedule_doubles() {
        let s = settings();
        assert_eq!(s.pass_resolution(0), 33);
        assert_eq!(s.pass_resolution(1), 65);
        assert_eq!(s.pass_resolution(2), 129);
        assert_eq!(s.pass_iterations(2), 1200);
        let big = ErosionSettings {
            erosion_resolution: 2049,
            ..settings()
        };
        assert_eq!(big.pass_resolution(3), MAX_RESOLUTION, "working resolution is capped");
    }

    #[test]
    fn test_erode_is_deterministic() {
        let sim = HydraulicErosionSimulator::default();
        let base = hill(65);
        let a = sim.erode(&base, &settings()).unwrap();
        let b = sim.erode(&base, &settings()).unwrap();
        assert_eq!(a, b, "fixed seed must reproduce the same erosion");
        assert_ne!(a, base, "a hill should be eroded");
        assert_eq!(a.resolution(), 65);
    }

    #[test]
    fn test_seed_changes_result() {
        let sim = HydraulicErosionSimulator::default();
        let base = hill(65);
        let a = sim.erode(&base, &settings()).unwrap();
        let b = sim
            .erode(&base, &ErosionSettings { seed: 12, ..settings() })
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let base = hill(33);
        let eroded = Heightfield::flat(33, 0.2).unwrap();
        let s = ErosionSettings {
            strength: 0.5,
            use_falloff: true,
            ..settings()
        };
        let once = HydraulicErosionSimulator::apply(&base, &eroded, &s).unwrap();
        let twice = HydraulicErosionSimulator::apply(&base, &eroded, &s).unwrap();
        assert_eq!(once, twice, "apply must not accumulate across calls");
    }

    #[test]
    fn test_apply_strength_bounds() {
        let base = hill(17);
        let eroded = Heightfield::flat(17, 0.0).unwrap();
        let zero = ErosionSettings {
            strength: 0.0,
            ..settings()
        };
        let full = ErosionSettings {
            strength: 1.0,
            ..settings()
        };
        assert_eq!(
            HydraulicErosionSimulator::apply(&base, &eroded, &zero).unwrap(),
            base
        );
        assert_eq!(
            HydraulicErosionSimulator::apply(&base, &eroded, &full).unwrap(),
            eroded
        );
    }

    #[test]
    fn test_apply_falloff_keeps_border() {
        let base = hill(33);
        let eroded = Heightfield::flat(33, 0.0).unwrap();
        let s = ErosionSettings {
            use_falloff: true,
            falloff: FalloffSettings {
                range: 0.2,
                transition_width: 0.5,
            },
            ..settings()
        };
        let out = HydraulicErosionSimulator::apply(&base, &eroded, &s).unwrap();
        assert_eq!(out.get(0, 0), base.get(0, 0), "border is outside the inward mask");
        assert_eq!(out.get(16, 16), 0.0, "centre takes the full eroded value");
    }

    #[test]
    fn test_run_reuses_cache_for_strength_change() {
        let mut sim = HydraulicErosionSimulator::default();
        let base = hill(33);
        let mut inv = GenerationInvalidation::everything();
        let first = sim.run(&base, &settings(), &mut inv);
        assert_eq!(sim.simulation_count(), 1);

        let mut inv = GenerationInvalidation::default();
        let weaker = ErosionSettings {
            strength: 0.5,
            ..settings()
        };
        let second = sim.run(&base, &weaker, &mut inv);
        assert_eq!(sim.simulation_count(), 1, "strength alone must not resimulate");
        assert!(!inv.erosion_modified);
        assert_ne!(first, second);
    }

    #[test]
    fn test_run_resimulates_on_key_or_base_change() {
        let mut sim = HydraulicErosionSimulator::default();
        let base = hill(33);
        sim.run(&base, &settings(), &mut GenerationInvalidation::everything());

        let mut inv = GenerationInvalidation::default();
        let more = ErosionSettings {
            iterations: 400,
            ..settings()
        };
        sim.run(&base, &more, &mut inv);
        assert_eq!(sim.simulation_count(), 2);
        assert!(inv.erosion_modified);

        let mut inv = GenerationInvalidation {
            layers_modified: true,
            ..Default::default()
        };
        sim.run(&base, &more, &mut inv);
        assert_eq!(sim.simulation_count(), 3, "a changed base always resimulates");
    }

    #[test]
    fn test_dense_noise_stays_bounded() {
        let layer = crate::noise_layer::LayerSettings {
            seed: 5,
            scale: 8.0,
            ..Default::default()
        };
        let base = crate::noise_layer::NoiseLayerEvaluator::evaluate(&layer, 33).unwrap();
        let (lo, hi) = base.min_max();
        let s = ErosionSettings {
            iterations: 4000,
            erosion_resolution: 17,
            erosion_steps: 2,
            erosion_radius: 3,
            seed: 3,
            ..Default::default()
        };

        let batched = HydraulicErosionSimulator::default().erode(&base, &s).unwrap();
        let serial =
            HydraulicErosionSimulator::new(Arc::new(CpuErosionKernel::with_batch_size(1)))
                .erode(&base, &s)
                .unwrap();
        assert_eq!(batched, serial, "batching must not change the result");

        let (min, max) = batched.min_max();
        assert!(lo >= 0.0 && min >= 0.0, "erosion dug below zero: {min}");
        assert!(
            max <= hi + 0.25 * (hi - lo),
            "eroded range ({min}, {max}) ran away from the base range ({lo}, {hi})"
        );
    }

    #[test]
    fn test_run_resimulates_when_base_differs() {
        let mut sim = HydraulicErosionSimulator::default();
        let first = hill(33);
        sim.run(&first, &settings(), &mut GenerationInvalidation::everything());

        // Same settings and a clean record, but a different field.
        let mut second = first.clone();
        second.set(16, 16, 0.05);
        let mut inv = GenerationInvalidation::default();
        let out = sim.run(&second, &settings(), &mut inv);
        assert_eq!(sim.simulation_count(), 2, "a different base must not reuse the cache");
        assert_eq!(sim.cached_eroded().map(|f| f.resolution()), Some(33));

        let fresh = HydraulicErosionSimulator::default().run(
            &second,
            &settings(),
            &mut GenerationInvalidation::everything(),
        );
        assert_eq!(out, fresh);
    }

    #[test]
    fn test_failing_kernel_returns_base() {
        let mut sim = HydraulicErosionSimulator::new(Arc::new(FailingKernel));
        let base = hill(33);
        let out = sim.run(&base, &settings(), &mut GenerationInvalidation::everything());
        assert_eq!(out, base, "a failed simulation leaves the field untouched");
        assert!(sim.cached_eroded().is_none());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let sim = HydraulicErosionSimulator::default();
        let base = hill(17);
        let bad = ErosionSettings {
            erosion_resolution: 30,
            ..settings()
        };
        assert_eq!(
            sim.erode(&base, &bad),
            Err(TerrainError::InvalidResolution(30))
        );
        let tiny = ErosionSettings {
            erosion_resolution: 5,
            erosion_radius: 3,
            erosion_steps: 1,
            ..settings()
        };
        assert!(matches!(
            sim.erode(&base, &tiny),
            Err(TerrainError::SimulationFailure(_))
        ));
    }
}
