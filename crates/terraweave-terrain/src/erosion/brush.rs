//! Circular erosion brush.

use crate::math::det_sqrt;

/// Offsets and normalized weights of a circular brush.
#[derive(Clone, Debug, PartialEq)]
pub struct ErosionBrush {
    radius: u32,
    offsets: Vec<(i32, i32)>,
    weights: Vec<f32>,
}

impl ErosionBrush {
    /// Build a brush of the given radius.
    ///
    /// Every integer offset with `dist² < radius²` gets weight
    /// `1 - sqrt(dist²) / radius`; weights are then normalized to sum to 1.
    pub fn new(radius: u32) -> Self {
        let r = radius as i32;
        let r_sq = (r * r) as f32;
        let mut offsets = Vec::new();
        let mut weights = Vec::new();
        let mut total = 0.0;

        for dy in -r..=r {
            for dx in -r..=r {
                let dist_sq = (dx * dx + dy * dy) as f32;
                if dist_sq < r_sq {
                    let weight = 1.0 - det_sqrt(dist_sq) / radius as f32;
                    total += weight;
                    offsets.push((dx, dy));
                    weights.push(weight);
                }
            }
        }

        if total > 0.0 {
            for w in &mut weights {
                *w /= total;
            }
        }

        Self {
            radius,
            offsets,
            weights,
        }
    }

    /// Brush radius in samples.
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// `(dx, dy)` offsets covered by the brush.
    pub fn offsets(&self) -> &[(i32, i32)] {
        &self.offsets
    }

    /// Weight per offset, summing to 1.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Number of cells touched by the brush.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `true` for a zero-radius brush.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        for radius in 1..6 {
            let brush = ErosionBrush::new(radius);
            let sum: f32 = brush.weights().iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "radius {radius} weights sum to {sum}");
        }
    }

    #[test]
    fn test_offsets_strictly_inside_radius() {
        let brush = ErosionBrush::new(3);
        for &(dx, dy) in brush.offsets() {
            assert!(dx * dx + dy * dy < 9, "({dx}, {dy}) lies on or outside the radius");
        }
        assert!(brush.offsets().contains(&(0, 0)));
        assert!(!brush.offsets().contains(&(3, 0)));
    }

    #[test]
    fn test_centre_weighs_most() {
        let brush = ErosionBrush::new(4);
        let centre = brush
            .offsets()
            .iter()
            .position(|&o| o == (0, 0))
            .unwrap();
        let max = brush.weights().iter().cloned().fold(0.0, f32::max);
        assert_eq!(brush.weights()[centre], max);
    }

    #[test]
    fn test_radius_one_is_single_cell() {
        let brush = ErosionBrush::new(1);
        assert_eq!(brush.offsets(), &[(0, 0)]);
        assert_eq!(brush.weights(), &[1.0]);
    }

    #[test]
    fn test_radius_zero_is_empty() {
        assert!(ErosionBrush::new(0).is_empty());
    }
}
