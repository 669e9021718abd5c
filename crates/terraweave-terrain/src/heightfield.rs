//! Square heightfield buffers and resampling.
//!
//! A [`Heightfield`] is a row-major grid of normalized height samples whose
//! side length is always `2^k + 1`. `x` runs along grid columns and `y` along
//! grid lines, so sample `(x, y)` lives at `y * resolution + x`.

use crate::error::TerrainError;

/// Smallest accepted resolution (`2^1 + 1`).
pub const MIN_RESOLUTION: usize = 3;

/// Largest accepted resolution (`2^12 + 1`).
pub const MAX_RESOLUTION: usize = 4097;

/// Returns `true` if `resolution` is `2^k + 1` within the accepted range.
pub fn is_valid_resolution(resolution: usize) -> bool {
    (MIN_RESOLUTION..=MAX_RESOLUTION).contains(&resolution)
        && (resolution - 1).is_power_of_two()
}

/// Validate a resolution, returning [`TerrainError::InvalidResolution`] otherwise.
pub fn check_resolution(resolution: usize) -> Result<usize, TerrainError> {
    if is_valid_resolution(resolution) {
        Ok(resolution)
    } else {
        Err(TerrainError::InvalidResolution(resolution))
    }
}

/// A square grid of height samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Heightfield {
    resolution: usize,
    data: Vec<f32>,
}

impl Heightfield {
    /// Create a heightfield with every sample set to `value`.
    pub fn flat(resolution: usize, value: f32) -> Result<Self, TerrainError> {
        check_resolution(resolution)?;
        Ok(Self {
            resolution,
            data: vec![value; resolution * resolution],
        })
    }

    /// Wrap an existing row-major buffer.
    ///
    /// # Errors
    ///
    /// Fails if the resolution is invalid or `data.len() != resolution²`.
    pub fn from_vec(resolution: usize, data: Vec<f32>) -> Result<Self, TerrainError> {
        check_resolution(resolution)?;
        if data.len() != resolution * resolution {
            return Err(TerrainError::ConfigurationMismatch(format!(
                "buffer of {} samples cannot back a {resolution}x{resolution} heightfield",
                data.len()
            )));
        }
        Ok(Self { resolution, data })
    }

    /// Side length in samples.
    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Row-major sample buffer.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable row-major sample buffer.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consume the heightfield and return its buffer.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Sample at integer coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `x` or `y` is out of range.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.resolution + x]
    }

    /// Overwrite the sample at integer coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `x` or `y` is out of range.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.resolution + x] = value;
    }

    /// Bilinearly interpolated sample; coordinates are clamped to the field.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        let max = (self.resolution - 1) as f32;
        let x = x.clamp(0.0, max);
        let y = y.clamp(0.0, max);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.resolution - 1);
        let y1 = (y0 + 1).min(self.resolution - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let h00 = self.get(x0, y0);
        let h10 = self.get(x1, y0);
        let h01 = self.get(x0, y1);
        let h11 = self.get(x1, y1);

        let h0 = h00 * (1.0 - fx) + h10 * fx;
        let h1 = h01 * (1.0 - fx) + h11 * fx;
        h0 * (1.0 - fy) + h1 * fy
    }

    /// Resample to `resolution` by nearest-index lookup.
    ///
    /// Destination index `d` reads source index
    /// `floor(d / (dst - 1) * (src - 1))`. When the ratio between the two
    /// resolutions is not integral this repeats or skips source rows, which
    /// can leave one-sample seams; that behavior is kept as-is.
    pub fn resample_nearest(&self, resolution: usize) -> Result<Self, TerrainError> {
        check_resolution(resolution)?;
        if resolution == self.resolution {
            return Ok(self.clone());
        }
        let src_max = (self.resolution - 1) as f32;
        let dst_max = (resolution - 1) as f32;
        let index: Vec<usize> = (0..resolution)
            .map(|d| ((d as f32 / dst_max * src_max).floor() as usize).min(self.resolution - 1))
            .collect();

        let mut data = Vec::with_capacity(resolution * resolution);
        for &sy in &index {
            for &sx in &index {
                data.push(self.get(sx, sy));
            }
        }
        Ok(Self { resolution, data })
    }

    /// Resample to `resolution` by bilinear interpolation.
    pub fn resample_bilinear(&self, resolution: usize) -> Result<Self, TerrainError> {
        check_resolution(resolution)?;
        if resolution == self.resolution {
            return Ok(self.clone());
        }
        let scale = (self.resolution - 1) as f32 / (resolution - 1) as f32;
        let mut data = Vec::with_capacity(resolution * resolution);
        for y in 0..resolution {
            for x in 0..resolution {
                data.push(self.sample_bilinear(x as f32 * scale, y as f32 * scale));
            }
        }
        Ok(Self { resolution, data })
    }

    /// Minimum and maximum sample values.
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Mean sample value.
    pub fn mean(&self) -> f32 {
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        (sum / self.data.len() as f64) as f32
    }

    /// Copy of column `x` (bottom to top).
    pub fn column(&self, x: usize) -> Vec<f32> {
        (0..self.resolution).map(|y| self.get(x, y)).collect()
    }

    /// Copy of row `y` (left to right).
    pub fn row(&self, y: usize) -> Vec<f32> {
        self.data[y * self.resolution..(y + 1) * self.resolution].to_vec()
    }
}
