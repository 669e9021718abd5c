//! Droplet kernels.
//!
//! A kernel receives one working-resolution height buffer plus a list of
//! droplet start cells and returns the eroded buffer. [`CpuErosionKernel`]
//! runs droplets in fixed-size batches. Every droplet in a batch is first
//! simulated in parallel against the map as it stood when the batch began,
//! recording which cells it read and the edits it made. The batch is then
//! committed in droplet order: a droplet whose reads touch a cell an earlier
//! droplet of the same batch wrote is simulated again against the live map.
//! The result is identical to running every droplet one after another, and
//! never depends on thread scheduling.

use glam::Vec2;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use super::brush::ErosionBrush;
use crate::error::TerrainError;
use crate::math::det_sqrt;

/// Droplets per batch for [`CpuErosionKernel`].
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Physical parameters of a single droplet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DropletParams {
    /// Share of the previous direction kept each step (0..=1).
    pub inertia: f32,
    /// Sediment carried per unit of drop, speed and water.
    pub sediment_capacity_factor: f32,
    /// Capacity floor, so droplets on flat ground still carry something.
    pub min_sediment_capacity: f32,
    /// Fraction of free capacity taken from the ground per step.
    pub erode_speed: f32,
    /// Fraction of surplus sediment dropped per step.
    pub deposit_speed: f32,
    /// Fraction of water lost per step.
    pub evaporate_speed: f32,
    /// Acceleration gained per unit of height lost.
    pub gravity: f32,
    /// Maximum steps before a droplet is dropped.
    pub max_lifetime: u32,
    /// Water a droplet starts with.
    pub initial_water_volume: f32,
    /// Speed a droplet starts with.
    pub initial_speed: f32,
}

/// Everything a kernel needs for one pass.
pub struct KernelInput<'a> {
    /// Side length of `heights`.
    pub resolution: usize,
    /// Row-major heights at working resolution.
    pub heights: &'a [f32],
    /// Start cell of each droplet as `y * resolution + x`.
    pub start_indices: &'a [u32],
    /// Weighted footprint of a single erosion step.
    pub brush: &'a ErosionBrush,
    pub params: DropletParams,
}

/// Runs the droplet simulation over a height buffer.
pub trait ErosionKernel: Send + Sync {
    /// Simulate every droplet in `input` and return the eroded buffer.
    ///
    /// # Errors
    ///
    /// [`TerrainError::SimulationFailure`] if the input cannot be simulated.
    fn dispatch(&self, input: &KernelInput<'_>) -> Result<Vec<f32>, TerrainError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Data-parallel CPU kernel on the rayon pool.
#[derive(Clone, Copy, Debug)]
pub struct CpuErosionKernel {
    batch_size: usize,
}

impl Default for CpuErosionKernel {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl CpuErosionKernel {
    /// Kernel with a custom batch size (minimum 1).
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl ErosionKernel for CpuErosionKernel {
    fn dispatch(&self, input: &KernelInput<'_>) -> Result<Vec<f32>, TerrainError> {
        let res = input.resolution;
        if input.heights.len() != res * res {
            return Err(TerrainError::SimulationFailure(format!(
                "height buffer holds {} samples, expected {}",
                input.heights.len(),
                res * res
            )));
        }
        if input.brush.is_empty() {
            return Err(TerrainError::SimulationFailure("erosion brush is empty".into()));
        }
        let border = input.brush.radius() as usize;
        if res < 2 * border + 2 {
            return Err(TerrainError::SimulationFailure(format!(
                "resolution {res} leaves no room inside a border of {border}"
            )));
        }
        if let Some(&bad) = input.start_indices.iter().find(|&&i| i as usize >= res * res) {
            return Err(TerrainError::SimulationFailure(format!(
                "droplet start index {bad} is outside the map"
            )));
        }

        let mut map = input.heights.to_vec();
        let mut written: FxHashSet<usize> = FxHashSet::default();
        for batch in input.start_indices.chunks(self.batch_size) {
            let speculative: Vec<DropletTrace> = {
                let snapshot = &map;
                batch
                    .par_iter()
                    .map(|&start| Droplet::simulate(snapshot, res, border, input, start as usize))
                    .collect()
            };

            written.clear();
            let mut replayed = 0usize;
            for (outcome, &start) in speculative.into_iter().zip(batch) {
                let outcome = if outcome.reads.iter().any(|index| written.contains(index)) {
                    replayed += 1;
                    Droplet::simulate(&map, res, border, input, start as usize)
                } else {
                    outcome
                };
                for (index, delta) in outcome.deltas {
                    map[index] += delta;
                    written.insert(index);
                }
            }
            trace!(droplets = batch.len(), replayed, "erosion batch committed");
        }
        Ok(map)
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}

/// Cells a droplet read and the edits it made, sorted by index.
struct DropletTrace {
    reads: Vec<usize>,
    deltas: Vec<(usize, f32)>,
}

/// One droplet reading a height map through a private edit overlay.
struct Droplet<'a> {
    snapshot: &'a [f32],
    res: usize,
    border: usize,
    brush: &'a ErosionBrush,
    params: DropletParams,
    overlay: FxHashMap<usize, f32>,
    reads: FxHashSet<usize>,
}

impl<'a> Droplet<'a> {
    fn new(snapshot: &'a [f32], res: usize, border: usize, input: &'a KernelInput<'_>) -> Self {
        Self {
            snapshot,
            res,
            border,
            brush: input.brush,
            params: input.params,
            overlay: FxHashMap::default(),
            reads: FxHashSet::default(),
        }
    }

    /// Run the droplet starting at `start` over `map` without touching it.
    fn simulate(
        map: &'a [f32],
        res: usize,
        border: usize,
        input: &'a KernelInput<'_>,
        start: usize,
    ) -> DropletTrace {
        let mut droplet = Droplet::new(map, res, border, input);
        droplet.run(start);
        droplet.into_trace()
    }

    #[inline]
    fn height(&mut self, index: usize) -> f32 {
        self.reads.insert(index);
        self.snapshot[index] + self.overlay.get(&index).copied().unwrap_or(0.0)
    }

    #[inline]
    fn add(&mut self, index: usize, delta: f32) {
        *self.overlay.entry(index).or_insert(0.0) += delta;
    }

    /// Bilinear height and gradient at `pos`.
    fn height_and_gradient(&mut self, pos: Vec2) -> (f32, Vec2) {
        let node_x = pos.x as usize;
        let node_y = pos.y as usize;
        let x = pos.x - node_x as f32;
        let y = pos.y - node_y as f32;

        let nw = node_y * self.res + node_x;
        let h_nw = self.height(nw);
        let h_ne = self.height(nw + 1);
        let h_sw = self.height(nw + self.res);
        let h_se = self.height(nw + self.res + 1);

        let gradient = Vec2::new(
            (h_ne - h_nw) * (1.0 - y) + (h_se - h_sw) * y,
            (h_sw - h_nw) * (1.0 - x) + (h_se - h_ne) * x,
        );
        let height = h_nw * (1.0 - x) * (1.0 - y)
            + h_ne * x * (1.0 - y)
            + h_sw * (1.0 - x) * y
            + h_se * x * y;
        (height, gradient)
    }

    fn inside(&self, pos: Vec2) -> bool {
        let lo = self.border as f32;
        let hi = (self.res - 1 - self.border) as f32;
        pos.x >= lo && pos.x <= hi && pos.y >= lo && pos.y <= hi
    }

    fn run(&mut self, start: usize) {
        let p = self.params;
        let mut pos = Vec2::new((start % self.res) as f32, (start / self.res) as f32);
        let mut dir = Vec2::ZERO;
        let mut speed = p.initial_speed;
        let mut water = p.initial_water_volume;
        let mut sediment = 0.0_f32;

        if !self.inside(pos) {
            return;
        }

        for _ in 0..p.max_lifetime {
            let node_x = pos.x as usize;
            let node_y = pos.y as usize;
            let node = node_y * self.res + node_x;
            let cell = Vec2::new(pos.x - node_x as f32, pos.y - node_y as f32);

            let (height, gradient) = self.height_and_gradient(pos);

            dir = dir * p.inertia - gradient * (1.0 - p.inertia);
            let len = dir.length();
            if len != 0.0 {
                dir /= len;
            }
            pos += dir;

            if dir == Vec2::ZERO || !self.inside(pos) {
                break;
            }

            let (new_height, _) = self.height_and_gradient(pos);
            let delta_height = new_height - height;

            let capacity = (-delta_height * speed * water * p.sediment_capacity_factor)
                .max(p.min_sediment_capacity);

            if sediment > capacity || delta_height > 0.0 {
                let amount = if delta_height > 0.0 {
                    delta_height.min(sediment)
                } else {
                    (sediment - capacity) * p.deposit_speed
                };
                sediment -= amount;

                self.add(node, amount * (1.0 - cell.x) * (1.0 - cell.y));
                self.add(node + 1, amount * cell.x * (1.0 - cell.y));
                self.add(node + self.res, amount * (1.0 - cell.x) * cell.y);
                self.add(node + self.res + 1, amount * cell.x * cell.y);
            } else {
                let amount = ((capacity - sediment) * p.erode_speed).min(-delta_height);
                for k in 0..self.brush.len() {
                    let (dx, dy) = self.brush.offsets()[k];
                    let bx = node_x as i64 + dx as i64;
                    let by = node_y as i64 + dy as i64;
                    if bx < 0 || by < 0 || bx >= self.res as i64 || by >= self.res as i64 {
                        continue;
                    }
                    let index = by as usize * self.res + bx as usize;
                    let weighed = amount * self.brush.weights()[k];
                    let current = self.height(index);
                    let removed = if current < weighed { current.max(0.0) } else { weighed };
                    self.add(index, -removed);
                    sediment += removed;
                }
            }

            speed = det_sqrt((speed * speed - delta_height * p.gravity).max(0.0));
            water *= 1.0 - p.evaporate_speed;
            if water <= 0.0 {
                break;
            }
        }
    }

    fn into_trace(self) -> DropletTrace {
        let mut deltas: Vec<(usize, f32)> = self.overlay.into_iter().collect();
        deltas.sort_unstable_by_key(|&(index, _)| index);
        let mut reads: Vec<usize> = self.reads.into_iter().collect();
        reads.sort_unstable();
        DropletTrace { reads, deltas }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DropletParams {
        DropletParams {
            inertia: 0.05,
            sediment_capacity_factor: 4.0,
            min_sediment_capacity: 0.01,
            erode_speed: 0.3,
            deposit_speed: 0.3,
            evaporate_speed: 0.01,
            gravity: 4.0,
            max_lifetime: 30,
            initial_water_volume: 1.0,
            initial_speed: 1.0,
        }
    }

    /// A ramp sloping down along x with a small y ripple.
    fn slope(res: usize) -> Vec<f32> {
        let mut data = Vec::with_capacity(res * res);
        for y in 0..res {
            for x in 0..res {
                let ripple = ((y as f32) * 0.7).sin() * 0.02;
                data.push(1.0 - x as f32 / (res - 1) as f32 * 0.8 + ripple);
            }
        }
        data
    }

    fn starts(res: usize, border: usize) -> Vec<u32> {
        let mut out = Vec::new();
        for y in (border..res - border).step_by(3) {
            for x in (border..res - border).step_by(5) {
                out.push((y * res + x) as u32);
            }
        }
        out
    }

    #[test]
    fn test_flat_map_is_untouched() {
        let res = 17;
        let heights = vec![0.5; res * res];
        let brush = ErosionBrush::new(2);
        let starts = starts(res, 2);
        let input = KernelInput {
            resolution: res,
            heights: &heights,
            start_indices: &starts,
            brush: &brush,
            params: params(),
        };
        let out = CpuErosionKernel::default().dispatch(&input).unwrap();
        assert_eq!(out, heights, "droplets on a flat map never move");
    }

    #[test]
    fn test_slope_is_eroded() {
        let res = 33;
        let heights = slope(res);
        let brush = ErosionBrush::new(3);
        let starts = starts(res, 3);
        let input = KernelInput {
            resolution: res,
            heights: &heights,
            start_indices: &starts,
            brush: &brush,
            params: params(),
        };
        let out = CpuErosionKernel::default().dispatch(&input).unwrap();
        assert_ne!(out, heights, "droplets running down a slope must move material");
        assert!(out.iter().all(|v| v.is_finite()));
        assert!(out.iter().all(|&v| v >= 0.0), "erosion never digs below zero");
    }

    #[test]
    fn test_result_independent_of_thread_scheduling() {
        let res = 33;
        let heights = slope(res);
        let brush = ErosionBrush::new(2);
        let starts = starts(res, 2);
        let input = KernelInput {
            resolution: res,
            heights: &heights,
            start_indices: &starts,
            brush: &brush,
            params: params(),
        };
        let kernel = CpuErosionKernel::with_batch_size(8);
        let a = kernel.dispatch(&input).unwrap();
        let b = kernel.dispatch(&input).unwrap();
        assert_eq!(a, b, "same input and batch size must give bit-identical output");
    }

    #[test]
    fn test_single_droplet_batches_match_sequential_semantics() {
        let res = 17;
        let heights = slope(res);
        let brush = ErosionBrush::new(2);
        let starts = starts(res, 2);
        let input = KernelInput {
            resolution: res,
            heights: &heights,
            start_indices: &starts,
            brush: &brush,
            params: params(),
        };
        let one = CpuErosionKernel::with_batch_size(1).dispatch(&input).unwrap();
        let again = CpuErosionKernel::with_batch_size(0).dispatch(&input).unwrap();
        assert_eq!(one, again, "batch size is clamped to at least one");
    }

    /// Rolling bumps in [0, 1].
    fn bumps(res: usize) -> Vec<f32> {
        let mut data = Vec::with_capacity(res * res);
        for y in 0..res {
            for x in 0..res {
                let (fx, fy) = (x as f32, y as f32);
                let wave = (fx * 0.9).sin() * (fy * 0.7).cos();
                data.push(0.5 + 0.25 * wave + 0.25 * ((fx + fy) * 0.37).sin());
            }
        }
        data
    }

    #[test]
    fn test_crowded_batches_match_one_by_one() {
        let res = 33;
        let heights = bumps(res);
        let brush = ErosionBrush::new(3);
        // Thousands of droplets over a small interior, so batches overlap heavily.
        let span = (res - 6) as u32;
        let starts: Vec<u32> = (0..4000u32)
            .map(|i| {
                let x = 3 + (i * 7) % span;
                let y = 3 + (i * 13 + i / span) % span;
                y * res as u32 + x
            })
            .collect();
        let input = KernelInput {
            resolution: res,
            heights: &heights,
            start_indices: &starts,
            brush: &brush,
            params: params(),
        };

        let batched = CpuErosionKernel::default().dispatch(&input).unwrap();
        let serial = CpuErosionKernel::with_batch_size(1).dispatch(&input).unwrap();
        assert_eq!(batched, serial, "overlapping droplets must see each other's edits");
        assert!(batched.iter().all(|&v| v >= 0.0), "erosion never digs below zero");
        assert!(
            batched.iter().all(|&v| v <= 1.25),
            "heights ran away: max {}",
            batched.iter().copied().fold(f32::MIN, f32::max)
        );
    }

    #[test]
    fn test_rejects_mismatched_buffer() {
        let heights = vec![0.0; 10];
        let brush = ErosionBrush::new(1);
        let input = KernelInput {
            resolution: 5,
            heights: &heights,
            start_indices: &[],
            brush: &brush,
            params: params(),
        };
        assert!(matches!(
            CpuErosionKernel::default().dispatch(&input),
            Err(TerrainError::SimulationFailure(_))
        ));
    }

    #[test]
    fn test_rejects_brush_wider_than_map() {
        let heights = vec![0.0; 25];
        let brush = ErosionBrush::new(3);
        let input = KernelInput {
            resolution: 5,
            heights: &heights,
            start_indices: &[12],
            brush: &brush,
            params: params(),
        };
        assert!(CpuErosionKernel::default().dispatch(&input).is_err());
    }
}
