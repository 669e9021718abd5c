//! Directional edge blending between abutting tiles.
//!
//! Blending only ever writes the current tile. The sample at distance `i`
//! from the shared edge moves toward the neighbour's sample at distance `i`
//! on the other side of the edge, with full weight on the edge itself so the
//! two tiles meet exactly.

use serde::{Deserialize, Serialize};

use crate::error::TerrainError;
use crate::heightfield::Heightfield;
use crate::math::{lerp, smoothstep};

/// One side of a tile, named by where its neighbour sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendSide {
    /// Neighbour at `column + 1`; edge `x = resolution - 1`.
    Right,
    /// Neighbour at `column - 1`; edge `x = 0`.
    Left,
    /// Neighbour at `line + 1`; edge `y = resolution - 1`.
    Top,
    /// Neighbour at `line - 1`; edge `y = 0`.
    Bottom,
}

impl BlendSide {
    /// Blend order within a tile.
    pub const ALL: [BlendSide; 4] = [Self::Right, Self::Left, Self::Top, Self::Bottom];

    /// Bit of this side in a [`BlendAction`] id.
    pub const fn bit(self) -> u8 {
        match self {
            Self::Right => 1,
            Self::Left => 2,
            Self::Top => 4,
            Self::Bottom => 8,
        }
    }

    /// Slot of this side in a neighbour array.
    pub const fn index(self) -> usize {
        match self {
            Self::Right => 0,
            Self::Left => 1,
            Self::Top => 2,
            Self::Bottom => 3,
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::Right => Self::Left,
            Self::Left => Self::Right,
            Self::Top => Self::Bottom,
            Self::Bottom => Self::Top,
        }
    }

    /// Sides whose edges meet the start (`k = 0`) and end (`k = res - 1`)
    /// of this side's edge.
    const fn ends(self) -> (Self, Self) {
        match self {
            Self::Right | Self::Left => (Self::Bottom, Self::Top),
            Self::Top | Self::Bottom => (Self::Left, Self::Right),
        }
    }

    /// Current-tile coordinates of the sample at distance `i` from this edge
    /// and position `k` along it.
    fn inner(self, res: usize, i: usize, k: usize) -> (usize, usize) {
        match self {
            Self::Right => (res - 1 - i, k),
            Self::Left => (i, k),
            Self::Top => (k, res - 1 - i),
            Self::Bottom => (k, i),
        }
    }

    /// Neighbour coordinates mirroring [`BlendSide::inner`] across the edge.
    fn mirrored(self, res: usize, i: usize, k: usize) -> (usize, usize) {
        self.opposite().inner(res, i, k)
    }
}

/// Which sides of a tile blend toward their neighbours.
///
/// The id is the bitwise OR of [`BlendSide::bit`], so the 15 non-empty
/// combinations map to ids `1..=15`. A tile with no sides to blend has no
/// action at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendAction(u8);

impl BlendAction {
    pub fn from_id(id: u8) -> Option<Self> {
        (1..=15).contains(&id).then_some(Self(id))
    }

    pub fn from_sides(sides: &[BlendSide]) -> Option<Self> {
        Self::from_id(sides.iter().fold(0, |acc, side| acc | side.bit()))
    }

    /// All 15 actions in id order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=15).map(Self)
    }

    pub fn id(self) -> u8 {
        self.0
    }

    pub fn contains(self, side: BlendSide) -> bool {
        self.0 & side.bit() != 0
    }

    /// Sides in blend order.
    pub fn sides(self) -> impl Iterator<Item = BlendSide> {
        BlendSide::ALL.into_iter().filter(move |&s| self.contains(s))
    }

    pub fn side_count(self) -> u32 {
        self.0.count_ones()
    }

    /// Two or more sides: transitions are halved and shared corners split.
    pub fn is_diagonal(self) -> bool {
        self.side_count() >= 2
    }
}

/// Width and strength of edge transitions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendSettings {
    /// World-space width of the transition band.
    pub transition_width: f32,
    /// Weight applied to every sample past the edge itself.
    pub transition_strength: f32,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            transition_width: 100.0,
            transition_strength: 1.0,
        }
    }
}

impl BlendSettings {
    /// Transition band in samples.
    ///
    /// `round(width / tile_size * resolution)`, clamped to `resolution - 1`,
    /// and to half of that when blending diagonally.
    pub fn transition_samples(&self, tile_size: f32, resolution: usize, diagonal: bool) -> usize {
        let raw = (self.transition_width / tile_size * resolution as f32).round();
        let raw = if raw.is_finite() && raw > 0.0 { raw as usize } else { 0 };
        let cap = if diagonal {
            (resolution - 1) / 2
        } else {
            resolution - 1
        };
        raw.min(cap)
    }
}

/// Blend `current` toward `neighbor` across `side`.
///
/// # Errors
///
/// [`TerrainError::ConfigurationMismatch`] if the two fields differ in
/// resolution.
pub fn blend_side(
    current: &mut Heightfield,
    neighbor: &Heightfield,
    side: BlendSide,
    action: BlendAction,
    settings: &BlendSettings,
    tile_size: f32,
) -> Result<(), TerrainError> {
    let res = current.resolution();
    if neighbor.resolution() != res {
        return Err(TerrainError::ConfigurationMismatch(format!(
            "cannot blend a {res}-sample tile with a {}-sample neighbour",
            neighbor.resolution()
        )));
    }

    let diagonal = action.is_diagonal();
    let band = settings.transition_samples(tile_size, res, diagonal);
    let (start_side, end_side) = side.ends();
    let corner_start = diagonal && action.contains(start_side);
    let corner_end = diagonal && action.contains(end_side);

    for i in 0..=band {
        let base = if i == 0 {
            1.0
        } else {
            smoothstep(0.0, 1.0, (band - i) as f32 / band as f32) * settings.transition_strength
        };

        for k in 0..res {
            let mut factor = base;
            if i > 0 {
                let corner_j = if corner_start && k < band {
                    Some(k)
                } else if corner_end && res - 1 - k < band {
                    Some(res - 1 - k)
                } else {
                    None
                };
                if let Some(j) = corner_j {
                    if j < i {
                        continue;
                    }
                    factor *= smoothstep(0.0, 1.0, j as f32 / band as f32);
                }
            }

            let (cx, cy) = side.inner(res, i, k);
            let (nx, ny) = side.mirrored(res, i, k);
            let target = neighbor.get(nx, ny);
            let value = if i == 0 {
                target
            } else {
                lerp(current.get(cx, cy), target, factor)
            };
            current.set(cx, cy, value);
        }
    }
    Ok(())
}

/// Blend across the right edge (`x = resolution - 1`).
pub fn blend_right(
    current: &mut Heightfield,
    neighbor: &Heightfield,
    action: BlendAction,
    settings: &BlendSettings,
    tile_size: f32,
) -> Result<(), TerrainError> {
    blend_side(current, neighbor, BlendSide::Right, action, settings, tile_size)
}

/// Blend across the left edge (`x = 0`).
pub fn blend_left(
    current: &mut Heightfield,
    neighbor: &Heightfield,
    action: BlendAction,
    settings: &BlendSettings,
    tile_size: f32,
) -> Result<(), TerrainError> {
    blend_side(current, neighbor, BlendSide::Left, action, settings, tile_size)
}

/// Blend across the top edge (`y = resolution - 1`).
pub fn blend_top(
    current: &mut Heightfield,
    neighbor: &Heightfield,
    action: BlendAction,
    settings: &BlendSettings,
    tile_size: f32,
) -> Result<(), TerrainError> {
    blend_side(current, neighbor, BlendSide::Top, action, settings, tile_size)
}

/// Blend across the bottom edge (`y = 0`).
pub fn blend_bottom(
    current: &mut Heightfield,
    neighbor: &Heightfield,
    action: BlendAction,
    settings: &BlendSettings,
    tile_size: f32,
) -> Result<(), TerrainError> {
    blend_side(current, neighbor, BlendSide::Bottom, action, settings, tile_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy(res: usize, salt: usize) -> Heightfield {
        let data = (0..res * res)
            .map(|i| ((i * 7919 + salt * 104_729) % 1000) as f32 / 1000.0)
            .collect();
        Heightfield::from_vec(res, data).unwrap()
    }

    fn right_only() -> BlendAction {
        BlendAction::from_sides(&[BlendSide::Right]).unwrap()
    }

    #[test]
    fn test_action_ids_cover_fifteen() {
        assert_eq!(BlendAction::all().count(), 15);
        assert_eq!(BlendAction::all().filter(|a| a.is_diagonal()).count(), 11);
        assert!(BlendAction::from_id(0).is_none());
        assert!(BlendAction::from_id(16).is_none());
        assert!(BlendAction::from_sides(&[]).is_none());
        let corner = BlendAction::from_sides(&[BlendSide::Left, BlendSide::Bottom]).unwrap();
        assert_eq!(corner.id(), 10);
        assert_eq!(
            corner.sides().collect::<Vec<_>>(),
            vec![BlendSide::Left, BlendSide::Bottom]
        );
    }

    #[test]
    fn test_transition_samples_clamped() {
        let settings = BlendSettings {
            transition_width: 250.0,
            transition_strength: 1.0,
        };
        assert_eq!(settings.transition_samples(1000.0, 33, false), 8);
        let wide = BlendSettings {
            transition_width: 5000.0,
            ..settings
        };
        assert_eq!(wide.transition_samples(1000.0, 33, false), 32);
        assert_eq!(wide.transition_samples(1000.0, 33, true), 16);
    }

    #[test]
    fn test_blend_right_matches_shared_edge() {
        let mut current = noisy(17, 1);
        let neighbor = noisy(17, 2);
        blend_right(
            &mut current,
            &neighbor,
            right_only(),
            &BlendSettings::default(),
            200.0,
        )
        .unwrap();
        assert_eq!(
            current.column(16),
            neighbor.column(0),
            "the shared edge must match exactly"
        );
    }

    #[test]
    fn test_every_direction_matches_its_edge() {
        let res = 9;
        let settings = BlendSettings::default();
        let neighbor = noisy(res, 5);

        let mut a = noisy(res, 4);
        blend_left(&mut a, &neighbor, BlendAction::from_id(2).unwrap(), &settings, 400.0).unwrap();
        assert_eq!(a.column(0), neighbor.column(res - 1));

        let mut b = noisy(res, 4);
        blend_top(&mut b, &neighbor, BlendAction::from_id(4).unwrap(), &settings, 400.0).unwrap();
        assert_eq!(b.row(res - 1), neighbor.row(0));

        let mut c = noisy(res, 4);
        blend_bottom(&mut c, &neighbor, BlendAction::from_id(8).unwrap(), &settings, 400.0)
            .unwrap();
        assert_eq!(c.row(0), neighbor.row(res - 1));
    }

    #[test]
    fn test_two_tile_scenario_influence_decreases_inward() {
        let mut left = Heightfield::flat(5, 0.0).unwrap();
        let right = Heightfield::flat(5, 1.0).unwrap();
        let settings = BlendSettings {
            transition_width: 50.0,
            transition_strength: 1.0,
        };
        assert_eq!(settings.transition_samples(100.0, 5, false), 3);
        blend_right(&mut left, &right, right_only(), &settings, 100.0).unwrap();

        for y in 0..5 {
            assert_eq!(left.get(4, y), 1.0, "shared edge takes the neighbour value");
            let profile: Vec<f32> = (0..4).map(|i| left.get(4 - i, y)).collect();
            for pair in profile.windows(2) {
                assert!(
                    pair[0] > pair[1],
                    "influence must fall strictly inward, got {profile:?}"
                );
            }
            assert_eq!(left.get(1, y), 0.0, "band ends at distance 3");
            assert_eq!(left.get(0, y), 0.0, "outside the band is untouched");
        }
    }

    #[test]
    fn test_two_tile_scenario_full_width_band() {
        let mut left = Heightfield::flat(5, 0.0).unwrap();
        let right = Heightfield::flat(5, 1.0).unwrap();
        let settings = BlendSettings {
            transition_width: 100.0,
            transition_strength: 1.0,
        };
        assert_eq!(
            settings.transition_samples(100.0, 5, false),
            4,
            "a band as wide as the tile clamps to resolution - 1"
        );
        blend_right(&mut left, &right, right_only(), &settings, 100.0).unwrap();

        let expected = [0.0, 0.15625, 0.5, 0.84375, 1.0];
        for y in 0..5 {
            for (x, want) in expected.iter().enumerate() {
                assert!(
                    (left.get(x, y) - want).abs() < 1e-6,
                    "({x}, {y}) = {}, expected {want}",
                    left.get(x, y)
                );
            }
        }
        assert!(
            (0..4).all(|x| left.get(x, 2) < left.get(x + 1, 2)),
            "influence must fall strictly inward across the whole tile"
        );
    }

    #[test]
    fn test_strength_scales_interior_only() {
        let mut weak = Heightfield::flat(9, 0.0).unwrap();
        let neighbor = Heightfield::flat(9, 1.0).unwrap();
        let settings = BlendSettings {
            transition_width: 400.0,
            transition_strength: 0.0,
        };
        blend_right(&mut weak, &neighbor, right_only(), &settings, 1000.0).unwrap();
        assert_eq!(weak.column(8), vec![1.0; 9]);
        assert_eq!(weak.column(7), vec![0.0; 9], "zero strength leaves the interior alone");
    }

    #[test]
    fn test_corner_splits_along_diagonal() {
        let res = 9;
        let action = BlendAction::from_sides(&[BlendSide::Right, BlendSide::Top]).unwrap();
        let settings = BlendSettings {
            transition_width: 1000.0,
            transition_strength: 1.0,
        };
        let band = settings.transition_samples(1000.0, res, true);
        assert_eq!(band, 4);

        let mut field = Heightfield::flat(res, 0.0).unwrap();
        let neighbor = Heightfield::flat(res, 1.0).unwrap();
        blend_right(&mut field, &neighbor, action, &settings, 1000.0).unwrap();

        // Distance 2 from the right edge and 1 from the top: j < i, skipped.
        assert_eq!(field.get(res - 1 - 2, res - 1 - 1), 0.0);
        // Distance 1 from the right edge and 3 from the top: inside the half.
        assert!(field.get(res - 1 - 1, res - 1 - 3) > 0.0);
        // The edge itself is always replaced, corner included.
        assert_eq!(field.get(res - 1, res - 1), 1.0);
        // Far from the corner the ordinary falloff applies.
        let plain = smoothstep(0.0, 1.0, 3.0 / 4.0);
        assert!((field.get(res - 2, 4) - plain).abs() < 1e-6);
    }

    #[test]
    fn test_resolution_mismatch_rejected() {
        let mut current = Heightfield::flat(9, 0.0).unwrap();
        let neighbor = Heightfield::flat(17, 0.0).unwrap();
        let err = blend_right(
            &mut current,
            &neighbor,
            right_only(),
            &BlendSettings::default(),
            100.0,
        )
        .unwrap_err();
        assert!(matches!(err, TerrainError::ConfigurationMismatch(_)));
    }
}
