//! Square-distance falloff masks.
//!
//! A mask is a pure function of resolution, range and transition width. The
//! distance metric is Chebyshev (`max(|u|, |v|)`) in normalized tile space, so
//! iso-lines are concentric squares.

use serde::{Deserialize, Serialize};

use crate::error::TerrainError;
use crate::heightfield::{Heightfield, check_resolution};
use crate::math::smoothstep;

/// Shape of a falloff ramp.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FalloffSettings {
    /// Normalized distance from the centre (0 = centre, 1 = border) where the
    /// ramp starts.
    pub range: f32,
    /// Normalized width of the ramp. Zero gives a hard step.
    pub transition_width: f32,
}

impl Default for FalloffSettings {
    fn default() -> Self {
        Self {
            range: 0.6,
            transition_width: 0.3,
        }
    }
}

impl FalloffSettings {
    /// Reject negative or non-finite parameters.
    pub fn validate(&self) -> Result<(), TerrainError> {
        if !self.range.is_finite() || !self.transition_width.is_finite() {
            return Err(TerrainError::ConfigurationMismatch(
                "falloff parameters must be finite".into(),
            ));
        }
        if self.transition_width < 0.0 {
            return Err(TerrainError::ConfigurationMismatch(format!(
                "falloff transition width {} is negative",
                self.transition_width
            )));
        }
        Ok(())
    }

    /// Ramp value at normalized Chebyshev distance `d`, rising from 0 inside
    /// `range` to 1 past `range + transition_width`.
    pub fn ramp(&self, d: f32) -> f32 {
        if self.transition_width <= 0.0 {
            return if d >= self.range { 1.0 } else { 0.0 };
        }
        smoothstep(self.range, self.range + self.transition_width, d)
    }
}

/// Which end of the ramp sits at the tile centre.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FalloffPolarity {
    /// 0 at the centre, 1 at the border.
    RisingOutward,
    /// 1 at the centre, 0 at the border.
    RisingInward,
}

/// Generator for falloff masks.
pub struct FalloffMask;

impl FalloffMask {
    /// Normalized Chebyshev distance of sample `(x, y)` from the tile centre.
    pub fn distance(resolution: usize, x: usize, y: usize) -> f32 {
        let max = (resolution - 1) as f32;
        let u = x as f32 / max * 2.0 - 1.0;
        let v = y as f32 / max * 2.0 - 1.0;
        u.abs().max(v.abs())
    }

    /// Build a `resolution × resolution` mask.
    pub fn generate(
        resolution: usize,
        settings: &FalloffSettings,
        polarity: FalloffPolarity,
    ) -> Result<Heightfield, TerrainError> {
        check_resolution(resolution)?;
        settings.validate()?;

        let mut data = Vec::with_capacity(resolution * resolution);
        for y in 0..resolution {
            for x in 0..resolution {
                let t = settings.ramp(Self::distance(resolution, x, y));
                data.push(match polarity {
                    FalloffPolarity::RisingOutward => t,
                    FalloffPolarity::RisingInward => 1.0 - t,
                });
            }
        }
        Heightfield::from_vec(resolution, data)
    }
}
