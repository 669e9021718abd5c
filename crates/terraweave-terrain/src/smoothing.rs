//! Blur a tile toward its own border.

use serde::{Deserialize, Serialize};

use crate::blur::BlurStrategy;
use crate::error::TerrainError;
use crate::falloff::{FalloffMask, FalloffPolarity, FalloffSettings};
use crate::heightfield::Heightfield;
use crate::math::lerp;

/// Edge smoothing configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSmoothSettings {
    pub enabled: bool,
    pub blur_radius: u32,
    pub falloff: FalloffSettings,
}

impl Default for EdgeSmoothSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            blur_radius: 2,
            falloff: FalloffSettings {
                range: 0.8,
                transition_width: 0.2,
            },
        }
    }
}

pub struct EdgeSmoother;

impl EdgeSmoother {
    /// Blend `field` toward its box-blurred copy, weighted by an outward
    /// falloff: the centre is untouched, the border fully blurred.
    pub fn smooth(
        field: &Heightfield,
        blur_radius: u32,
        falloff: &FalloffSettings,
        blur: &dyn BlurStrategy,
    ) -> Result<Heightfield, TerrainError> {
        let blurred = blur.box_blur(field, blur_radius);
        let mask = FalloffMask::generate(field.resolution(), falloff, FalloffPolarity::RisingOutward)?;

        let mut out = field.clone();
        for ((sample, &soft), &weight) in out
            .as_mut_slice()
            .iter_mut()
            .zip(blurred.as_slice())
            .zip(mask.as_slice())
        {
            *sample = lerp(*sample, soft, weight);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blur::SequentialBlur;

    fn checker(res: usize) -> Heightfield {
        let data = (0..res * res)
            .map(|i| if (i % res + i / res) % 2 == 0 { 1.0 } else { 0.0 })
            .collect();
        Heightfield::from_vec(res, data).unwrap()
    }

    #[test]
    fn test_centre_untouched_border_blurred() {
        let field = checker(17);
        let falloff = FalloffSettings {
            range: 0.5,
            transition_width: 0.25,
        };
        let out = EdgeSmoother::smooth(&field, 1, &falloff, &SequentialBlur).unwrap();
        let blurred = SequentialBlur.box_blur(&field, 1);

        assert_eq!(out.get(8, 8), field.get(8, 8), "centre lies inside the falloff range");
        assert!(
            (out.get(0, 5) - blurred.get(0, 5)).abs() < 1e-6,
            "border takes the blurred value"
        );
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let field = checker(9);
        let out =
            EdgeSmoother::smooth(&field, 0, &FalloffSettings::default(), &SequentialBlur).unwrap();
        assert_eq!(out, field);
    }

    #[test]
    fn test_bad_falloff_rejected() {
        let falloff = FalloffSettings {
            range: 0.5,
            transition_width: -1.0,
        };
        assert!(EdgeSmoother::smooth(&checker(9), 1, &falloff, &SequentialBlur).is_err());
    }
}
