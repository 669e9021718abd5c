//! Keyframed height-response curves.

use serde::{Deserialize, Serialize};

use crate::error::TerrainError;

/// A single curve key with Hermite tangents.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Position on the input axis.
    pub time: f32,
    /// Output value at `time`.
    pub value: f32,
    /// Incoming slope.
    #[serde(default)]
    pub in_tangent: f32,
    /// Outgoing slope.
    #[serde(default)]
    pub out_tangent: f32,
}

impl Keyframe {
    /// A key with both tangents set to `tangent`.
    pub fn new(time: f32, value: f32, tangent: f32) -> Self {
        Self {
            time,
            value,
            in_tangent: tangent,
            out_tangent: tangent,
        }
    }
}

/// Maps a normalized noise sample to a height response.
///
/// Keys are kept sorted by time. Evaluation is cubic Hermite between keys and
/// clamps to the first/last value outside the key range.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseCurve {
    keys: Vec<Keyframe>,
}

impl ResponseCurve {
    /// Build a curve from keys in any order.
    pub fn new(mut keys: Vec<Keyframe>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    /// Identity on `[0, 1]`.
    pub fn linear() -> Self {
        Self::new(vec![Keyframe::new(0.0, 0.0, 1.0), Keyframe::new(1.0, 1.0, 1.0)])
    }

    /// The curve's keys, sorted by time.
    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    /// Reject empty curves and non-finite keys.
    pub fn validate(&self) -> Result<(), TerrainError> {
        if self.keys.is_empty() {
            return Err(TerrainError::ConfigurationMismatch(
                "response curve has no keys".into(),
            ));
        }
        let finite = self.keys.iter().all(|k| {
            k.time.is_finite()
                && k.value.is_finite()
                && k.in_tangent.is_finite()
                && k.out_tangent.is_finite()
        });
        if !finite {
            return Err(TerrainError::ConfigurationMismatch(
                "response curve has non-finite keys".into(),
            ));
        }
        Ok(())
    }

    /// Evaluate the curve at `t`.
    ///
    /// An empty curve passes `t` through unchanged.
    pub fn evaluate(&self, t: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return t;
        };
        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        // First key strictly after t; t > first.time guarantees idx >= 1.
        let idx = self.keys.partition_point(|k| k.time <= t);
        let k0 = &self.keys[idx - 1];
        let k1 = &self.keys[idx];
        let dt = k1.time - k0.time;
        if dt <= 0.0 {
            return k1.value;
        }

        let s = (t - k0.time) / dt;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        h00 * k0.value + h10 * k0.out_tangent * dt + h01 * k1.value + h11 * k1.in_tangent * dt
    }

    /// The curve mirrored on the value axis about its first and last keys.
    ///
    /// Each value `v` becomes `first + last - v` and tangents flip sign, so a
    /// rising curve becomes a falling one over the same domain. Times are not
    /// touched. Applying this twice gives back the original curve.
    pub fn inverted(&self) -> Self {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return self.clone();
        };
        let pivot = first.value + last.value;
        let keys = self
            .keys
            .iter()
            .map(|k| Keyframe {
                time: k.time,
                value: pivot - k.value,
                in_tangent: -k.in_tangent,
                out_tangent: -k.out_tangent,
            })
            .collect();
        Self { keys }
    }
}

impl Default for ResponseCurve {
    fn default() -> Self {
        Self::linear()
    }
}

/// Curves compare equal when their keys match pairwise on `(time, value)`.
impl PartialEq for ResponseCurve {
    fn eq(&self, other: &Self) -> bool {
        self.keys.len() == other.keys.len()
            && self
                .keys
                .iter()
                .zip(&other.keys)
                .all(|(a, b)| a.time == b.time && a.value == b.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    fn bumpy() -> ResponseCurve {
        ResponseCurve::new(vec![
            Keyframe::new(0.0, 0.1, 0.0),
            Keyframe::new(0.4, 0.7, 2.0),
            Keyframe::new(1.0, 0.9, -0.5),
        ])
    }

    #[test]
    fn test_linear_curve_is_identity() {
        let curve = ResponseCurve::linear();
        for i in 0..=20 {
            let t = i as f32 / 20.0;
            assert!(
                (curve.evaluate(t) - t).abs() < EPSILON,
                "linear curve should map {t} to itself, got {}",
                curve.evaluate(t)
            );
        }
    }

    #[test]
    fn test_evaluate_clamps_outside_range() {
        let curve = bumpy();
        assert_eq!(curve.evaluate(-1.0), 0.1);
        assert_eq!(curve.evaluate(5.0), 0.9);
    }

    #[test]
    fn test_evaluate_hits_keys_exactly() {
        let curve = bumpy();
        assert!((curve.evaluate(0.4) - 0.7).abs() < EPSILON);
    }

    #[test]
    fn test_keys_sorted_on_construction() {
        let curve = ResponseCurve::new(vec![
            Keyframe::new(1.0, 1.0, 0.0),
            Keyframe::new(0.0, 0.0, 0.0),
        ]);
        assert_eq!(curve.keys()[0].time, 0.0);
    }

    #[test]
    fn test_inversion_is_an_involution() {
        let curve = bumpy();
        let twice = curve.inverted().inverted();
        for i in 0..=50 {
            let t = i as f32 / 50.0;
            assert!(
                (curve.evaluate(t) - twice.evaluate(t)).abs() < EPSILON,
                "double inversion changed the curve at {t}"
            );
        }
    }

    #[test]
    fn test_inverted_linear_falls() {
        let inverted = ResponseCurve::linear().inverted();
        assert!((inverted.evaluate(0.0) - 1.0).abs() < EPSILON);
        assert!((inverted.evaluate(1.0) - 0.0).abs() < EPSILON);
        assert!((inverted.evaluate(0.25) - 0.75).abs() < EPSILON);
    }

    #[test]
    fn test_equality_ignores_tangents() {
        let a = ResponseCurve::new(vec![Keyframe::new(0.0, 0.0, 1.0)]);
        let b = ResponseCurve::new(vec![Keyframe::new(0.0, 0.0, 3.0)]);
        let c = ResponseCurve::new(vec![Keyframe::new(0.0, 0.5, 1.0)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_curve_fails_validation() {
        assert!(ResponseCurve::new(Vec::new()).validate().is_err());
        assert!(ResponseCurve::linear().validate().is_ok());
    }
}
