//! Single noise layer evaluation.
//!
//! A layer is fractal noise sampled over the tile grid, normalized against its
//! own observed range, optionally carved by a falloff mask, and shaped by a
//! response curve.

use noise::{NoiseFn, OpenSimplex, Perlin, Simplex, SuperSimplex, Value, Worley};
use serde::{Deserialize, Serialize};

use crate::curve::ResponseCurve;
use crate::error::TerrainError;
use crate::falloff::{FalloffMask, FalloffPolarity, FalloffSettings};
use crate::heightfield::{Heightfield, check_resolution};
use crate::math::inverse_lerp;

/// Base noise function of a layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoiseKind {
    /// Classic gradient noise.
    Perlin,
    /// Simplex gradient noise.
    #[default]
    Simplex,
    /// OpenSimplex noise.
    OpenSimplex,
    /// OpenSimplex2-style "super simplex" noise.
    SuperSimplex,
    /// Interpolated value noise.
    Value,
    /// Cellular (Worley) noise.
    Cellular,
}

/// How octaves are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FractalKind {
    /// A single octave, no fractal accumulation.
    None,
    /// Fractal Brownian motion.
    #[default]
    Fbm,
    /// Absolute-value octaves, giving puffy rounded features.
    Billow,
    /// Inverted absolute-value octaves weighted by the previous octave.
    Ridged,
}

/// Configuration of one noise layer.
///
/// Two snapshots compare equal when every field matches by value and the
/// response curves agree key by key on `(time, value)`; that equality is what
/// the layer cache uses to decide whether a buffer is still valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerSettings {
    /// Disabled layers are still evaluated but contribute nothing.
    pub enabled: bool,
    /// Base noise function.
    pub noise: NoiseKind,
    /// Octave combination.
    pub fractal: FractalKind,
    /// Number of octaves (at least 1).
    pub octaves: u32,
    /// Feature size in samples. Larger values give broader features.
    pub scale: f32,
    /// Noise seed.
    pub seed: u32,
    /// Frequency multiplier between octaves.
    pub lacunarity: f32,
    /// Amplitude multiplier between octaves.
    pub persistence: f32,
    /// Contribution weight in per-mille (1000 = full weight).
    pub depth: f32,
    /// Response curve applied to the normalized sample.
    pub curve: ResponseCurve,
    /// Use the value-mirrored curve instead of `curve`.
    pub invert_curve: bool,
    /// Optional outward falloff subtracted before the curve.
    pub falloff: Option<FalloffSettings>,
    /// Box blur radius applied after evaluation. Zero disables the blur.
    pub blur_radius: u32,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            noise: NoiseKind::default(),
            fractal: FractalKind::default(),
            octaves: 4,
            scale: 50.0,
            seed: 0,
            lacunarity: 2.0,
            persistence: 0.5,
            depth: 100.0,
            curve: ResponseCurve::linear(),
            invert_curve: false,
            falloff: None,
            blur_radius: 0,
        }
    }
}

/// Multiplier applied to [`LayerSettings::depth`] to get a blend factor.
pub const DEPTH_SCALE: f32 = 0.001;

impl LayerSettings {
    /// Blend factor of this layer, zero when disabled.
    pub fn depth_factor(&self) -> f32 {
        if self.enabled {
            self.depth * DEPTH_SCALE
        } else {
            0.0
        }
    }

    /// Reject settings the evaluator cannot use.
    pub fn validate(&self) -> Result<(), TerrainError> {
        if self.octaves == 0 {
            return Err(TerrainError::ConfigurationMismatch(
                "layer needs at least one octave".into(),
            ));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(TerrainError::ConfigurationMismatch(format!(
                "layer scale {} must be positive",
                self.scale
            )));
        }
        if !(self.lacunarity.is_finite() && self.persistence.is_finite() && self.depth.is_finite())
        {
            return Err(TerrainError::ConfigurationMismatch(
                "layer lacunarity, persistence and depth must be finite".into(),
            ));
        }
        self.curve.validate()?;
        if let Some(falloff) = &self.falloff {
            falloff.validate()?;
        }
        Ok(())
    }
}

/// Boxed noise source so every kind shares one evaluation loop.
///
/// Not `Send`: `Worley` holds its distance function in an `Rc`.
type NoiseSource = Box<dyn NoiseFn<f64, 2>>;

fn noise_source(kind: NoiseKind, seed: u32) -> NoiseSource {
    match kind {
        NoiseKind::Perlin => Box::new(Perlin::new(seed)),
        NoiseKind::Simplex => Box::new(Simplex::new(seed)),
        NoiseKind::OpenSimplex => Box::new(OpenSimplex::new(seed)),
        NoiseKind::SuperSimplex => Box::new(SuperSimplex::new(seed)),
        NoiseKind::Value => Box::new(Value::new(seed)),
        NoiseKind::Cellular => Box::new(Worley::new(seed)),
    }
}

/// Fractal sampler over one noise source.
struct FractalSampler {
    noise: NoiseSource,
    fractal: FractalKind,
    octaves: u32,
    lacunarity: f64,
    persistence: f64,
    inv_scale: f64,
}

impl FractalSampler {
    fn new(settings: &LayerSettings) -> Self {
        Self {
            noise: noise_source(settings.noise, settings.seed),
            fractal: settings.fractal,
            octaves: settings.octaves,
            lacunarity: settings.lacunarity as f64,
            persistence: settings.persistence as f64,
            inv_scale: 1.0 / settings.scale as f64,
        }
    }

    fn sample(&self, x: f64, y: f64) -> f64 {
        let x = x * self.inv_scale;
        let y = y * self.inv_scale;

        if self.fractal == FractalKind::None {
            return self.noise.get([x, y]);
        }

        let mut total = 0.0;
        let mut frequency = 1.0;
        let mut amplitude = 1.0;
        let mut weight = 1.0;

        for _ in 0..self.octaves {
            let n = self.noise.get([x * frequency, y * frequency]);
            total += match self.fractal {
                FractalKind::Billow => (n.abs() * 2.0 - 1.0) * amplitude,
                FractalKind::Ridged => {
                    let ridge = 1.0 - n.abs();
                    let signal = ridge * ridge * weight;
                    weight = signal.clamp(0.0, 1.0);
                    signal * amplitude
                }
                FractalKind::Fbm | FractalKind::None => n * amplitude,
            };

            frequency *= self.lacunarity;
            amplitude *= self.persistence;
        }

        total
    }
}

/// Evaluates [`LayerSettings`] into heightfields.
pub struct NoiseLayerEvaluator;

impl NoiseLayerEvaluator {
    /// Evaluate a layer over a `resolution × resolution` grid.
    ///
    /// Output samples lie in the response curve's value range; samples pushed
    /// below zero by the falloff mask are exactly zero. Identical inputs give
    /// bit-identical output.
    pub fn evaluate(
        settings: &LayerSettings,
        resolution: usize,
    ) -> Result<Heightfield, TerrainError> {
        check_resolution(resolution)?;
        settings.validate()?;

        let sampler = FractalSampler::new(settings);
        let mut raw = Vec::with_capacity(resolution * resolution);
        for y in 0..resolution {
            for x in 0..resolution {
                raw.push(sampler.sample(x as f64, y as f64) as f32);
            }
        }

        let (min, max) = raw
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        let mask = match &settings.falloff {
            Some(falloff) => Some(FalloffMask::generate(
                resolution,
                falloff,
                FalloffPolarity::RisingOutward,
            )?),
            None => None,
        };

        let curve = if settings.invert_curve {
            settings.curve.inverted()
        } else {
            settings.curve.clone()
        };

        for (i, sample) in raw.iter_mut().enumerate() {
            let mut t = inverse_lerp(min, max, *sample);
            if let Some(mask) = &mask {
                t -= mask.as_slice()[i];
            }
            *sample = if t < 0.0 { 0.0 } else { curve.evaluate(t) };
        }

        Heightfield::from_vec(resolution, raw)
    }
}
