//! Box blur behind a capability interface.
//!
//! [`select_blur_strategy`] picks the rayon-backed implementation when more
//! than one core is available and falls back to the sequential one otherwise.
//! Both produce bit-identical output.

use std::sync::Arc;

use rayon::prelude::*;

use crate::heightfield::Heightfield;

/// A separable, edge-clamped box blur.
pub trait BlurStrategy: Send + Sync {
    /// Blur `field` with a `(2 * radius + 1)²` box. Radius 0 returns a copy.
    fn box_blur(&self, field: &Heightfield, radius: u32) -> Heightfield;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Single-threaded blur.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialBlur;

/// Row/column-parallel blur on the rayon pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParallelBlur;

/// Pick a blur implementation for this machine.
pub fn select_blur_strategy() -> Arc<dyn BlurStrategy> {
    if num_cpus::get() > 1 {
        Arc::new(ParallelBlur)
    } else {
        Arc::new(SequentialBlur)
    }
}

/// Average of `line[i - r ..= i + r]` with indices clamped to the line.
#[inline]
fn box_sample(line: &[f32], i: usize, radius: usize) -> f32 {
    let last = line.len() - 1;
    let mut sum = 0.0;
    for k in 0..=2 * radius {
        let j = (i + k).saturating_sub(radius).min(last);
        sum += line[j];
    }
    sum / (2 * radius + 1) as f32
}

fn blur_row(src: &[f32], dst: &mut [f32], radius: usize) {
    for (i, out) in dst.iter_mut().enumerate() {
        *out = box_sample(src, i, radius);
    }
}

fn transpose(data: &[f32], n: usize) -> Vec<f32> {
    let mut out = vec![0.0; data.len()];
    for y in 0..n {
        for x in 0..n {
            out[x * n + y] = data[y * n + x];
        }
    }
    out
}

impl BlurStrategy for SequentialBlur {
    fn box_blur(&self, field: &Heightfield, radius: u32) -> Heightfield {
        if radius == 0 {
            return field.clone();
        }
        let n = field.resolution();
        let r = radius as usize;

        let mut horizontal = vec![0.0; n * n];
        for (src, dst) in field.as_slice().chunks(n).zip(horizontal.chunks_mut(n)) {
            blur_row(src, dst, r);
        }

        let columns = transpose(&horizontal, n);
        let mut vertical = vec![0.0; n * n];
        for (src, dst) in columns.chunks(n).zip(vertical.chunks_mut(n)) {
            blur_row(src, dst, r);
        }

        let mut out = field.clone();
        out.as_mut_slice().copy_from_slice(&transpose(&vertical, n));
        out
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

impl BlurStrategy for ParallelBlur {
    fn box_blur(&self, field: &Heightfield, radius: u32) -> Heightfield {
        if radius == 0 {
            return field.clone();
        }
        let n = field.resolution();
        let r = radius as usize;

        let mut horizontal = vec![0.0; n * n];
        horizontal
            .par_chunks_mut(n)
            .zip(field.as_slice().par_chunks(n))
            .for_each(|(dst, src)| blur_row(src, dst, r));

        let columns = transpose(&horizontal, n);
        let mut vertical = vec![0.0; n * n];
        vertical
            .par_chunks_mut(n)
            .zip(columns.par_chunks(n))
            .for_each(|(dst, src)| blur_row(src, dst, r));

        let mut out = field.clone();
        out.as_mut_slice().copy_from_slice(&transpose(&vertical, n));
        out
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}
