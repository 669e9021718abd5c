//! Tile grids and their stitching order.
//!
//! Tiles sit on a `columns × rows` lattice. Even/even tiles are anchors and
//! keep their own edges; every other tile blends toward its neighbours so each
//! shared edge is written by exactly one of its two tiles. Single-axis tiles
//! blend first (they only read anchors), two-axis corner tiles last.

use std::time::{Duration, Instant};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::blend::{BlendAction, BlendSettings, BlendSide, blend_side};
use crate::error::TerrainError;
use crate::generator::{TerrainGenerator, TerrainSettings};
use crate::heightfield::{Heightfield, check_resolution};
use crate::scheduler::RegenerationScheduler;
use crate::storage::{MemoryTileStorage, TileStorage};

/// Smallest and largest accepted row/column count.
pub const GRID_LIMITS: std::ops::RangeInclusive<usize> = 2..=12;

/// Grid dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    /// Tile count along `y` (lines).
    pub rows: usize,
    /// Tile count along `x`.
    pub columns: usize,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            rows: 3,
            columns: 3,
        }
    }
}

impl GridSettings {
    pub fn validate(&self) -> Result<(), TerrainError> {
        if !GRID_LIMITS.contains(&self.rows) || !GRID_LIMITS.contains(&self.columns) {
            return Err(TerrainError::ConfigurationMismatch(format!(
                "grid of {}x{} tiles is outside 2..=12 per axis",
                self.columns, self.rows
            )));
        }
        Ok(())
    }

    pub fn tile_count(&self) -> usize {
        self.rows * self.columns
    }
}

/// Position of a tile in the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub column: usize,
    pub line: usize,
}

impl TileCoord {
    pub const fn new(column: usize, line: usize) -> Self {
        Self { column, line }
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.column, self.line)
    }
}

/// Role of a tile index along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AxisPhase {
    /// Even index; keeps its edges on this axis.
    Anchor,
    /// Odd index with a successor; blends toward both sides.
    Bridge,
    /// Odd index, last on the axis; blends toward its predecessor.
    Tail,
}

impl AxisPhase {
    pub fn of(index: usize, count: usize) -> Self {
        if index % 2 == 0 {
            Self::Anchor
        } else if index + 1 < count {
            Self::Bridge
        } else {
            Self::Tail
        }
    }

    fn column_sides(self) -> &'static [BlendSide] {
        match self {
            Self::Anchor => &[],
            Self::Bridge => &[BlendSide::Right, BlendSide::Left],
            Self::Tail => &[BlendSide::Left],
        }
    }

    fn line_sides(self) -> &'static [BlendSide] {
        match self {
            Self::Anchor => &[],
            Self::Bridge => &[BlendSide::Top, BlendSide::Bottom],
            Self::Tail => &[BlendSide::Bottom],
        }
    }
}

/// Blend action of the tile at `coord`, or `None` for anchors.
///
/// The pattern repeats every two tiles on each axis, so a parity lookup is
/// the whole tiling table. Anchors are the tiles with no neighbours to blend:
/// they are never queued and their edges are the reference their neighbours
/// blend toward.
pub fn classify(coord: TileCoord, columns: usize, rows: usize) -> Option<BlendAction> {
    let column = AxisPhase::of(coord.column, columns);
    let line = AxisPhase::of(coord.line, rows);
    let sides: Vec<BlendSide> = column
        .column_sides()
        .iter()
        .chain(line.line_sides())
        .copied()
        .collect();
    BlendAction::from_sides(&sides)
}

/// Ordering key of a tile in the blend queue.
///
/// `tier * tile_count + line * columns + column`, where tier 1 blends along
/// one axis and tier 2 along both.
pub fn queue_index(coord: TileCoord, columns: usize, rows: usize) -> Option<usize> {
    let column = AxisPhase::of(coord.column, columns);
    let line = AxisPhase::of(coord.line, rows);
    let tier = [column, line]
        .iter()
        .filter(|&&p| p != AxisPhase::Anchor)
        .count();
    if tier == 0 {
        return None;
    }
    Some(tier * columns * rows + coord.line * columns + coord.column)
}

/// One tile: its generator, settings, storage and place in the grid.
pub struct TileCell {
    coord: TileCoord,
    offset: Vec2,
    settings: TerrainSettings,
    generator: TerrainGenerator,
    storage: Option<Box<dyn TileStorage>>,
    neighbors: [Option<usize>; 4],
    action: Option<BlendAction>,
    queue_index: Option<usize>,
}

impl TileCell {
    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// World-space position of the tile's `(0, 0)` corner.
    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Settings for this tile only, e.g. to mark it as an empty biome.
    pub fn settings_mut(&mut self) -> &mut TerrainSettings {
        &mut self.settings
    }

    pub fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    pub fn neighbor(&self, side: BlendSide) -> Option<usize> {
        self.neighbors[side.index()]
    }

    pub fn action(&self) -> Option<BlendAction> {
        self.action
    }

    pub fn queue_index(&self) -> Option<usize> {
        self.queue_index
    }

    pub fn storage(&self) -> Option<&dyn TileStorage> {
        self.storage.as_deref()
    }

    /// Committed heights of the whole tile.
    pub fn heights(&self) -> Result<Heightfield, TerrainError> {
        let storage = self
            .storage
            .as_deref()
            .ok_or(TerrainError::MissingDependency("tile storage"))?;
        let res = storage.resolution();
        storage.get_heights(0, 0, res, res)
    }
}

/// Summary of a grid-wide operation.
#[derive(Debug, Default)]
pub struct GridReport {
    pub tiles_generated: usize,
    pub edges_blended: usize,
    /// Per-tile failures; siblings carry on regardless.
    pub failures: Vec<(TileCoord, TerrainError)>,
    pub elapsed: Duration,
}

impl GridReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A grid of tiles and its blend queue.
pub struct TileGrid {
    columns: usize,
    rows: usize,
    tile_size: f32,
    cells: Vec<TileCell>,
    queue: Vec<usize>,
}

impl TileGrid {
    /// Build a grid whose tiles all start from `terrain`.
    ///
    /// `storage_for` is asked for each tile's storage; a tile whose storage
    /// cannot be created is kept without one and reported as a missing
    /// dependency when it is generated or blended.
    pub fn build<F>(
        grid: &GridSettings,
        terrain: &TerrainSettings,
        mut storage_for: F,
    ) -> Result<Self, TerrainError>
    where
        F: FnMut(TileCoord, &TerrainSettings) -> Result<Box<dyn TileStorage>, TerrainError>,
    {
        grid.validate()?;
        check_resolution(terrain.resolution)?;
        if !(terrain.tile_size.is_finite() && terrain.tile_size > 0.0) {
            return Err(TerrainError::ConfigurationMismatch(format!(
                "tile size {} must be positive",
                terrain.tile_size
            )));
        }

        let (columns, rows) = (grid.columns, grid.rows);
        let mut cells = Vec::with_capacity(grid.tile_count());
        for line in 0..rows {
            for column in 0..columns {
                let coord = TileCoord::new(column, line);
                let storage = match storage_for(coord, terrain) {
                    Ok(storage) => Some(storage),
                    Err(e) => {
                        warn!(tile = %coord, error = %e, "tile has no storage");
                        None
                    }
                };
                let neighbor = |c: Option<usize>, l: Option<usize>| match (c, l) {
                    (Some(c), Some(l)) if c < columns && l < rows => Some(l * columns + c),
                    _ => None,
                };
                cells.push(TileCell {
                    coord,
                    offset: Vec2::new(column as f32, line as f32) * terrain.tile_size,
                    settings: terrain.clone(),
                    generator: TerrainGenerator::default(),
                    storage,
                    neighbors: [
                        neighbor(Some(column + 1), Some(line)),
                        neighbor(column.checked_sub(1), Some(line)),
                        neighbor(Some(column), Some(line + 1)),
                        neighbor(Some(column), line.checked_sub(1)),
                    ],
                    action: None,
                    queue_index: None,
                });
            }
        }

        let mut grid = Self {
            columns,
            rows,
            tile_size: terrain.tile_size,
            cells,
            queue: Vec::new(),
        };
        grid.classify_and_queue();
        info!(columns, rows, queued = grid.queue.len(), "tile grid built");
        Ok(grid)
    }

    /// Grid backed by [`MemoryTileStorage`].
    pub fn in_memory(grid: &GridSettings, terrain: &TerrainSettings) -> Result<Self, TerrainError> {
        Self::build(grid, terrain, |_, t| {
            Ok(Box::new(MemoryTileStorage::new(t.resolution, t.tile_size)?) as Box<dyn TileStorage>)
        })
    }

    /// Recompute every tile's blend action and rebuild the queue.
    pub fn classify_and_queue(&mut self) {
        for cell in &mut self.cells {
            cell.action = classify(cell.coord, self.columns, self.rows);
            cell.queue_index = queue_index(cell.coord, self.columns, self.rows);
        }
        let mut queue: Vec<usize> = (0..self.cells.len())
            .filter(|&i| self.cells[i].action.is_some())
            .collect();
        queue.sort_by_key(|&i| self.cells[i].queue_index);
        self.queue = queue;
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn cells(&self) -> &[TileCell] {
        &self.cells
    }

    pub fn cell(&self, coord: TileCoord) -> Option<&TileCell> {
        self.index_of(coord).map(|i| &self.cells[i])
    }

    pub fn cell_mut(&mut self, coord: TileCoord) -> Option<&mut TileCell> {
        self.index_of(coord).map(move |i| &mut self.cells[i])
    }

    /// Tiles in blend order.
    pub fn queue(&self) -> impl Iterator<Item = &TileCell> {
        self.queue.iter().map(|&i| &self.cells[i])
    }

    fn index_of(&self, coord: TileCoord) -> Option<usize> {
        (coord.column < self.columns && coord.line < self.rows)
            .then_some(coord.line * self.columns + coord.column)
    }

    /// Generate one tile and commit it to its storage.
    pub fn generate_tile(&mut self, coord: TileCoord) -> Result<(), TerrainError> {
        let index = self
            .index_of(coord)
            .ok_or_else(|| TerrainError::ConfigurationMismatch(format!("no tile at {coord}")))?;
        let cell = &mut self.cells[index];
        let storage = cell
            .storage
            .as_deref_mut()
            .ok_or(TerrainError::MissingDependency("tile storage"))?;
        cell.generator.generate_into(&cell.settings, storage)?;
        Ok(())
    }

    /// Generate every tile independently.
    pub fn generate_all(&mut self) -> GridReport {
        let start = Instant::now();
        let mut report = GridReport::default();
        for index in 0..self.cells.len() {
            let coord = self.cells[index].coord;
            match self.generate_tile(coord) {
                Ok(()) => report.tiles_generated += 1,
                Err(e) => {
                    log_failure(coord, &e);
                    report.failures.push((coord, e));
                }
            }
        }
        report.elapsed = start.elapsed();
        info!(
            tiles = report.tiles_generated,
            failures = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "grid generated"
        );
        report
    }

    /// Blend every queued tile toward its neighbours, in queue order.
    pub fn blend_all(&mut self, settings: &BlendSettings) -> GridReport {
        let start = Instant::now();
        let mut report = GridReport::default();
        for position in 0..self.queue.len() {
            let index = self.queue[position];
            self.blend_into_report(index, settings, &mut report);
        }
        report.elapsed = start.elapsed();
        info!(
            edges = report.edges_blended,
            failures = report.failures.len(),
            "grid blended"
        );
        report
    }

    fn blend_into_report(
        &mut self,
        index: usize,
        settings: &BlendSettings,
        report: &mut GridReport,
    ) {
        let coord = self.cells[index].coord;
        match self.blend_tile(index, settings) {
            Ok((blended, failures)) => {
                report.edges_blended += blended;
                for e in failures {
                    log_failure(coord, &e);
                    report.failures.push((coord, e));
                }
            }
            Err(e) => {
                log_failure(coord, &e);
                report.failures.push((coord, e));
            }
        }
    }

    /// Blend one tile. Pair-level mismatches are returned alongside the
    /// count of edges that did blend; a missing storage aborts the tile.
    fn blend_tile(
        &mut self,
        index: usize,
        settings: &BlendSettings,
    ) -> Result<(usize, Vec<TerrainError>), TerrainError> {
        let cell = &self.cells[index];
        let Some(action) = cell.action else {
            return Ok((0, Vec::new()));
        };
        let mut current = cell.heights()?;
        let current_size = cell.storage().map(|s| s.size()).unwrap_or(self.tile_size);

        let mut blended = 0;
        let mut failures = Vec::new();
        for side in action.sides() {
            let Some(other) = cell.neighbor(side) else {
                continue;
            };
            let neighbor_cell = &self.cells[other];
            let neighbor = match neighbor_cell.heights() {
                Ok(field) => field,
                Err(e) => {
                    failures.push(e);
                    continue;
                }
            };
            let neighbor_size = neighbor_cell
                .storage()
                .map(|s| s.size())
                .unwrap_or(self.tile_size);
            if (neighbor_size - current_size).abs() > f32::EPSILON * current_size.abs().max(1.0) {
                failures.push(TerrainError::ConfigurationMismatch(format!(
                    "tile size {current_size} differs from neighbour {} size {neighbor_size}",
                    neighbor_cell.coord
                )));
                continue;
            }
            match blend_side(&mut current, &neighbor, side, action, settings, current_size) {
                Ok(()) => blended += 1,
                Err(e) => failures.push(e),
            }
        }

        let storage = self.cells[index]
            .storage
            .as_deref_mut()
            .ok_or(TerrainError::MissingDependency("tile storage"))?;
        storage.set_heights(0, 0, &current)?;
        Ok((blended, failures))
    }

    /// Generate every tile, then blend them.
    pub fn run(&mut self, settings: &BlendSettings) -> GridReport {
        let mut report = self.generate_all();
        let blend = self.blend_all(settings);
        report.edges_blended = blend.edges_blended;
        report.failures.extend(blend.failures);
        report.elapsed += blend.elapsed;
        report
    }

    /// Regenerate `coords` and re-blend every tile that depends on them.
    ///
    /// A queued tile depends on the neighbours it blends toward, so the dirty
    /// set grows until no queued tile reads a dirty neighbour. Tiles pulled in
    /// this way regenerate from their caches before blending again.
    pub fn regenerate(&mut self, coords: &[TileCoord], settings: &BlendSettings) -> GridReport {
        let start = Instant::now();
        let mut report = GridReport::default();
        let mut dirty = vec![false; self.cells.len()];
        for &coord in coords {
            match self.index_of(coord) {
                Some(index) => dirty[index] = true,
                None => {
                    let e = TerrainError::ConfigurationMismatch(format!("no tile at {coord}"));
                    log_failure(coord, &e);
                    report.failures.push((coord, e));
                }
            }
        }

        loop {
            let mut grew = false;
            for &index in &self.queue {
                if dirty[index] {
                    continue;
                }
                let cell = &self.cells[index];
                let reads_dirty = cell.action.is_some_and(|action| {
                    action
                        .sides()
                        .any(|side| cell.neighbor(side).is_some_and(|other| dirty[other]))
                });
                if reads_dirty {
                    dirty[index] = true;
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        for index in 0..self.cells.len() {
            if !dirty[index] {
                continue;
            }
            let coord = self.cells[index].coord;
            match self.generate_tile(coord) {
                Ok(()) => report.tiles_generated += 1,
                Err(e) => {
                    log_failure(coord, &e);
                    report.failures.push((coord, e));
                }
            }
        }
        for position in 0..self.queue.len() {
            let index = self.queue[position];
            if dirty[index] {
                self.blend_into_report(index, settings, &mut report);
            }
        }

        report.elapsed = start.elapsed();
        info!(
            requested = coords.len(),
            tiles = report.tiles_generated,
            edges = report.edges_blended,
            failures = report.failures.len(),
            "tiles regenerated"
        );
        report
    }

    /// Scheduler whose settled requests feed [`TileGrid::wait_settled`].
    pub fn regeneration_scheduler(
        debounce: Duration,
    ) -> std::io::Result<RegenerationScheduler<TileCoord>> {
        RegenerationScheduler::new(debounce, |coord: TileCoord| {
            debug!(tile = %coord, "regeneration request settled");
        })
    }

    /// Wait up to `timeout` for debounced requests to settle, then regenerate
    /// every settled tile.
    ///
    /// Returns an empty report when nothing settled in time.
    pub fn wait_settled(
        &mut self,
        scheduler: &RegenerationScheduler<TileCoord>,
        timeout: Duration,
        settings: &BlendSettings,
    ) -> GridReport {
        let Some(first) = scheduler.wait_completed(timeout) else {
            return GridReport::default();
        };
        let mut settled = vec![first];
        settled.extend(scheduler.drain_completed());
        settled.sort();
        settled.dedup();
        self.regenerate(&settled, settings)
    }

    /// Largest height difference across any shared edge.
    ///
    /// Tiles without readable heights are ignored.
    pub fn max_seam_error(&self) -> f32 {
        let fields: Vec<Option<Heightfield>> =
            self.cells.iter().map(|c| c.heights().ok()).collect();
        let mut worst = 0.0_f32;
        for (index, cell) in self.cells.iter().enumerate() {
            let Some(here) = &fields[index] else {
                continue;
            };
            let last = here.resolution() - 1;
            for side in [BlendSide::Right, BlendSide::Top] {
                let Some(other) = cell.neighbor(side) else {
                    continue;
                };
                let Some(there) = &fields[other] else {
                    continue;
                };
                if there.resolution() != here.resolution() {
                    continue;
                }
                let (a, b) = match side {
                    BlendSide::Right => (here.column(last), there.column(0)),
                    _ => (here.row(last), there.row(0)),
                };
                for (x, y) in a.iter().zip(&b) {
                    worst = worst.max((x - y).abs());
                }
            }
        }
        worst
    }

    /// Clear every tile's stored heights and drop the grid.
    pub fn delete(mut self) {
        for cell in &mut self.cells {
            if let Some(storage) = cell.storage.as_deref_mut() {
                storage.clear();
            }
        }
        info!(tiles = self.cells.len(), "tile grid deleted");
    }
}

fn log_failure(coord: TileCoord, e: &TerrainError) {
    match e {
        TerrainError::MissingDependency(_) => warn!(tile = %coord, error = %e, "tile skipped"),
        _ => error!(tile = %coord, error = %e, "tile operation failed"),
    }
}
