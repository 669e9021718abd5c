//! Depth-weighted layer composition.

use crate::error::TerrainError;
use crate::heightfield::Heightfield;
use crate::math::lerp;
use crate::noise_layer::LayerSettings;

/// Blends layer buffers into one base heightfield.
pub struct HeightfieldCompositor;

impl HeightfieldCompositor {
    /// Start from `base_height` everywhere and add each layer in order.
    ///
    /// Each enabled layer adds `lerp(0, layer, d) * d` where `d` is its depth
    /// factor, so the contribution grows with `d²` rather than `d`. Terrain
    /// shapes produced so far depend on this; changing it to a linear weight
    /// would alter every generated tile.
    pub fn compose(
        base_height: f32,
        resolution: usize,
        layers: &[(&LayerSettings, &Heightfield)],
    ) -> Result<Heightfield, TerrainError> {
        let mut acc = Heightfield::flat(resolution, base_height)?;

        for (index, (settings, buffer)) in layers.iter().enumerate() {
            if buffer.resolution() != resolution {
                return Err(TerrainError::ConfigurationMismatch(format!(
                    "layer {index} is {} samples wide, tile is {resolution}",
                    buffer.resolution()
                )));
            }
            let depth = settings.depth_factor();
            for (out, &sample) in acc.as_mut_slice().iter_mut().zip(buffer.as_slice()) {
                *out += lerp(0.0, sample, depth) * depth;
            }
        }

        Ok(acc)
    }
}
