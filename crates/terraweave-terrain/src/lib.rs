//! Procedural terrain heightfields: layered noise, droplet erosion, and
//! seamless stitching of tile grids.

mod compositor;
mod curve;
mod error;
mod falloff;
mod heightfield;
mod invalidation;
mod layer_cache;
mod math;
mod noise_layer;
mod preset;
mod smoothing;
mod storage;

pub mod blend;
pub mod blur;
pub mod erosion;
pub mod generator;
pub mod grid;
pub mod scheduler;

pub use blend::{
    BlendAction, BlendSettings, BlendSide, blend_bottom, blend_left, blend_right, blend_side,
    blend_top,
};
pub use blur::{BlurStrategy, ParallelBlur, SequentialBlur, select_blur_strategy};
pub use compositor::HeightfieldCompositor;
pub use curve::{Keyframe, ResponseCurve};
pub use erosion::{
    CpuErosionKernel, DropletParams, ErosionBrush, ErosionKernel, ErosionSettings,
    HydraulicErosionSimulator, KernelInput,
};
pub use error::TerrainError;
pub use falloff::{FalloffMask, FalloffPolarity, FalloffSettings};
pub use generator::{GenerationReport, TerrainGenerator, TerrainSettings};
pub use grid::{
    AxisPhase, GridReport, GridSettings, TileCell, TileCoord, TileGrid, classify, queue_index,
};
pub use heightfield::{
    Heightfield, MAX_RESOLUTION, MIN_RESOLUTION, check_resolution, is_valid_resolution,
};
pub use invalidation::GenerationInvalidation;
pub use layer_cache::{LayerCache, LayerCacheEntry};
pub use math::{inverse_lerp, lerp, smoothstep};
pub use noise_layer::{
    DEPTH_SCALE, FractalKind, LayerSettings, NoiseKind, NoiseLayerEvaluator,
};
pub use preset::BiomePreset;
pub use scheduler::{DEFAULT_DEBOUNCE, RegenerationScheduler};
pub use smoothing::{EdgeSmoothSettings, EdgeSmoother};
pub use storage::{MemoryTileStorage, TileStorage};
