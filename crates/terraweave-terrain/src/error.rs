//! Terrain pipeline error types.

/// Errors produced by the heightfield pipeline.
///
/// None of these cross a tile boundary: grid-level operations log them and
/// carry on with the remaining tiles.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TerrainError {
    /// A required collaborator (tile storage, erosion kernel) is not attached.
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),

    /// Two tiles disagree on resolution or size, or a layer/falloff/curve/grid
    /// configuration is malformed.
    #[error("configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// The erosion kernel failed; erosion is skipped for this generation.
    #[error("erosion simulation failed: {0}")]
    SimulationFailure(String),

    /// A heightfield resolution that is not of the form `2^k + 1`.
    #[error("invalid heightfield resolution {0} (expected 2^k + 1, 3..=4097)")]
    InvalidResolution(usize),
}
