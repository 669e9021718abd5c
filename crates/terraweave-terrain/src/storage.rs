//! Tile height storage.
//!
//! The pipeline never keeps the committed heights itself; it reads and writes
//! them through a [`TileStorage`], which in a host application would be the
//! terrain object that renders the tile.

use crate::error::TerrainError;
use crate::heightfield::{Heightfield, check_resolution};

/// Where a tile's committed heights live.
pub trait TileStorage: Send {
    /// Side length in samples.
    fn resolution(&self) -> usize;

    /// Resize the storage. Existing heights are discarded.
    fn set_resolution(&mut self, resolution: usize) -> Result<(), TerrainError>;

    /// World-space edge length of the tile.
    fn size(&self) -> f32;

    fn set_size(&mut self, size: f32);

    /// Copy out the square region starting at `(x, y)`.
    fn get_heights(&self, x: usize, y: usize, w: usize, h: usize)
    -> Result<Heightfield, TerrainError>;

    /// Write `heights` with its first sample at `(x, y)`.
    fn set_heights(&mut self, x: usize, y: usize, heights: &Heightfield)
    -> Result<(), TerrainError>;

    /// Drop all stored heights.
    fn clear(&mut self);
}

/// In-process [`TileStorage`].
#[derive(Clone, Debug)]
pub struct MemoryTileStorage {
    resolution: usize,
    size: f32,
    data: Option<Vec<f32>>,
}

impl MemoryTileStorage {
    /// Storage of the given resolution, initially holding zeros.
    pub fn new(resolution: usize, size: f32) -> Result<Self, TerrainError> {
        check_resolution(resolution)?;
        Ok(Self {
            resolution,
            size,
            data: Some(vec![0.0; resolution * resolution]),
        })
    }

    /// `true` after [`TileStorage::clear`] until the next write.
    pub fn is_cleared(&self) -> bool {
        self.data.is_none()
    }

    fn check_region(&self, x: usize, y: usize, w: usize, h: usize) -> Result<(), TerrainError> {
        if w != h {
            return Err(TerrainError::ConfigurationMismatch(format!(
                "height regions must be square, got {w}x{h}"
            )));
        }
        if x + w > self.resolution || y + h > self.resolution {
            return Err(TerrainError::ConfigurationMismatch(format!(
                "region ({x}, {y}) {w}x{h} exceeds a {0}x{0} tile",
                self.resolution
            )));
        }
        Ok(())
    }
}

impl TileStorage for MemoryTileStorage {
    fn resolution(&self) -> usize {
        self.resolution
    }

    fn set_resolution(&mut self, resolution: usize) -> Result<(), TerrainError> {
        check_resolution(resolution)?;
        self.resolution = resolution;
        self.data = Some(vec![0.0; resolution * resolution]);
        Ok(())
    }

    fn size(&self) -> f32 {
        self.size
    }

    fn set_size(&mut self, size: f32) {
        self.size = size;
    }

    fn get_heights(
        &self,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
    ) -> Result<Heightfield, TerrainError> {
        self.check_region(x, y, w, h)?;
        let data = self
            .data
            .as_ref()
            .ok_or(TerrainError::MissingDependency("tile heights"))?;
        let mut region = Vec::with_capacity(w * h);
        for row in y..y + h {
            let start = row * self.resolution + x;
            region.extend_from_slice(&data[start..start + w]);
        }
        Heightfield::from_vec(w, region)
    }

    fn set_heights(
        &mut self,
        x: usize,
        y: usize,
        heights: &Heightfield,
    ) -> Result<(), TerrainError> {
        let n = heights.resolution();
        self.check_region(x, y, n, n)?;
        let res = self.resolution;
        let data = self.data.get_or_insert_with(|| vec![0.0; res * res]);
        for (row, src) in heights.as_slice().chunks(n).enumerate() {
            let start = (y + row) * res + x;
            data[start..start + n].copy_from_slice(src);
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.data = None;
    }
}
