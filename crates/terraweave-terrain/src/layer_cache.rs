//! Memoized per-layer height buffers.

use tracing::debug;

use crate::blur::BlurStrategy;
use crate::error::TerrainError;
use crate::heightfield::Heightfield;
use crate::invalidation::GenerationInvalidation;
use crate::noise_layer::{LayerSettings, NoiseLayerEvaluator};

/// Snapshot and buffer for one layer slot.
#[derive(Clone, Debug)]
pub struct LayerCacheEntry {
    /// Settings the buffer was computed from.
    pub settings: LayerSettings,
    /// Evaluated (and blurred) layer.
    pub buffer: Heightfield,
    /// Set when the entry must be recomputed before its next read.
    pub dirty: bool,
}

/// Layer buffers keyed by layer index.
///
/// A layer is recomputed only when its settings differ from the stored
/// snapshot, the resolution changed, or the caller forces it.
#[derive(Debug, Default)]
pub struct LayerCache {
    entries: Vec<Option<LayerCacheEntry>>,
    compute_count: u64,
    hit_count: u64,
}

impl LayerCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the buffer for `index`, recomputing it when stale.
    ///
    /// A recompute sets `invalidation.layers_modified`. Disabled layers are
    /// evaluated too, so re-enabling them needs no recompute (the `enabled`
    /// flip itself still counts as a change).
    pub fn get_or_compute(
        &mut self,
        index: usize,
        settings: &LayerSettings,
        resolution: usize,
        force_invalid: bool,
        invalidation: &mut GenerationInvalidation,
        blur: &dyn BlurStrategy,
    ) -> Result<&Heightfield, TerrainError> {
        if self.entries.len() <= index {
            self.entries.resize_with(index + 1, || None);
        }

        let fresh = matches!(
            &self.entries[index],
            Some(entry) if !entry.dirty
                && !force_invalid
                && entry.buffer.resolution() == resolution
                && entry.settings == *settings
        );

        if fresh {
            self.hit_count += 1;
            debug!(layer = index, "layer cache hit");
        } else {
            let evaluated = NoiseLayerEvaluator::evaluate(settings, resolution)?;
            let buffer = blur.box_blur(&evaluated, settings.blur_radius);
            self.compute_count += 1;
            invalidation.layers_modified = true;
            debug!(layer = index, resolution, "layer recomputed");
            self.entries[index] = Some(LayerCacheEntry {
                settings: settings.clone(),
                buffer,
                dirty: false,
            });
        }

        match &self.entries[index] {
            Some(entry) => Ok(&entry.buffer),
            None => Err(TerrainError::ConfigurationMismatch(format!(
                "layer {index} has no cached buffer"
            ))),
        }
    }

    /// Cached buffer for `index`, if one has been produced and is not dirty.
    pub fn get(&self, index: usize) -> Option<&Heightfield> {
        self.entries
            .get(index)?
            .as_ref()
            .filter(|entry| !entry.dirty)
            .map(|entry| &entry.buffer)
    }

    /// Mark every entry dirty (e.g. after a resolution change).
    pub fn invalidate_all(&mut self) {
        for entry in self.entries.iter_mut().flatten() {
            entry.dirty = true;
        }
    }

    /// Drop entries beyond `len` when layers are removed.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// Number of layer evaluations performed so far.
    pub fn compute_count(&self) -> u64 {
        self.compute_count
    }

    /// Number of lookups served from the cache.
    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    /// Number of layer slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no layer has been cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
