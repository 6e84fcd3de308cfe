//! Row-band partitioning for the worker pool.
//!
//! `height / workers` rows per band, bands laid out from row 0, and the
//! last band stretched to the bottom of the image so that the bands
//! cover `[0, height)` exactly once. When there are more workers than
//! rows, each row becomes its own band and the surplus workers sit idle.

use crate::types::{Band, SeamPolicy};

/// Split `height` rows into at most `worker_count` contiguous bands.
///
/// Returns an empty vector for a zero height. `worker_count` is treated
/// as at least 1.
#[must_use]
pub fn partition(height: u32, worker_count: usize) -> Vec<Band> {
    let workers = clamp_workers(worker_count);
    let rows_per_band = (height / workers).max(1);
    lay_out(height, workers, rows_per_band)
}

/// Like [`partition`], but with the band height rounded up to a multiple
/// of `block_size` so that no block straddles a seam.
///
/// This can produce fewer bands than workers even when `height` is
/// large. A zero `block_size` falls back to [`partition`].
#[must_use]
pub fn partition_aligned(height: u32, worker_count: usize, block_size: u32) -> Vec<Band> {
    if block_size == 0 {
        return partition(height, worker_count);
    }
    let workers = clamp_workers(worker_count);
    let rows_per_band = (height / workers)
        .max(1)
        .div_ceil(block_size)
        .saturating_mul(block_size);
    lay_out(height, workers, rows_per_band)
}

/// Partition according to a seam policy.
#[must_use]
pub fn partition_for(
    policy: SeamPolicy,
    height: u32,
    worker_count: usize,
    block_size: u32,
) -> Vec<Band> {
    match policy {
        SeamPolicy::Faithful => partition(height, worker_count),
        SeamPolicy::Aligned => partition_aligned(height, worker_count, block_size),
    }
}

/// Number of blocks a worker will visit for `band` in an image of the
/// given size.
#[must_use]
pub fn count_blocks(width: u32, height: u32, band: Band, block_size: u32) -> usize {
    if block_size == 0 {
        return 0;
    }
    let rows = band.end_row().min(height).saturating_sub(band.start_row);
    let per_row = width.div_ceil(block_size) as usize;
    let block_rows = rows.div_ceil(block_size) as usize;
    per_row * block_rows
}

fn clamp_workers(worker_count: usize) -> u32 {
    u32::try_from(worker_count).unwrap_or(u32::MAX).max(1)
}

fn lay_out(height: u32, workers: u32, rows_per_band: u32) -> Vec<Band> {
    let mut bands = Vec::with_capacity(workers.min(height) as usize);
    let mut start = 0;
    while start < height {
        let remaining = height - start;
        let rows = if bands.len() + 1 == workers as usize {
            remaining
        } else {
            remaining.min(rows_per_band)
        };
        bands.push(Band::new(start, rows));
        start += rows;
    }
    bands
}
