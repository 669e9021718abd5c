//! Per-generation invalidation record.

/// What changed since the previous generation of a tile.
///
/// Built fresh at the start of each generation and threaded through the
/// pipeline stages so no stage has to keep its own "is modified" flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerationInvalidation {
    /// At least one noise layer was recomputed.
    pub layers_modified: bool,
    /// Base height or the layer list changed.
    pub composition_modified: bool,
    /// Erosion simulation parameters changed.
    pub erosion_modified: bool,
    /// The tile resolution differs from the previous generation.
    pub resolution_changed: bool,
}

impl GenerationInvalidation {
    /// Record for a generation that must recompute everything.
    pub fn everything() -> Self {
        Self {
            layers_modified: true,
            composition_modified: true,
            erosion_modified: true,
            resolution_changed: true,
        }
    }

    /// `true` if the composed base heightfield may differ from last time.
    pub fn base_changed(&self) -> bool {
        self.layers_modified || self.composition_modified || self.resolution_changed
    }
}
