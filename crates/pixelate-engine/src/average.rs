//! Block averaging over a range of rows.
//!
//! The image is tiled into `block_size × block_size` squares anchored at
//! the top of the row range and at column 0. Each square is clipped to
//! the image bounds, its channels are summed, divided (truncating) by the
//! pixel count, and the resulting color is written back to every pixel
//! of the square.
//!
//! Blocks are clipped to the image's real height, not to the end of the
//! requested row range, so the last block row of a range may extend
//! below it. This is what makes bands overlap at seams when the band
//! height is not a multiple of the block size.

use std::ops::ControlFlow;

use crate::canvas::PixelGrid;
use crate::types::{Block, Rgb};

/// How a walk over a row range ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOutcome {
    /// Blocks averaged and written.
    pub blocks: usize,
    /// `true` if the per-block callback asked to stop early.
    pub stopped: bool,
}

/// Average every block of the rows `[row_start, row_start + row_count)`.
///
/// Rows past the bottom of the grid are ignored. Returns the number of
/// blocks written.
///
/// `block_size` must be at least 1; a zero block size is rejected by
/// [`RunConfig::validate`](crate::RunConfig::validate) before a run
/// starts and is treated here as a no-op.
pub fn average_region<G: PixelGrid>(
    grid: &mut G,
    block_size: u32,
    row_start: u32,
    row_count: u32,
) -> usize {
    average_region_with(grid, block_size, row_start, row_count, |_| {
        ControlFlow::Continue(())
    })
    .blocks
}

/// Like [`average_region`], calling `after_block` once each block has
/// been written.
///
/// Returning [`ControlFlow::Break`] from the callback stops the walk at
/// that block boundary; blocks already written stay written. A break
/// after the last block has nothing left to stop, so the outcome is not
/// marked as stopped.
pub fn average_region_with<G, F>(
    grid: &mut G,
    block_size: u32,
    row_start: u32,
    row_count: u32,
    mut after_block: F,
) -> RegionOutcome
where
    G: PixelGrid,
    F: FnMut(Block) -> ControlFlow<()>,
{
    let mut outcome = RegionOutcome {
        blocks: 0,
        stopped: false,
    };
    if block_size == 0 {
        return outcome;
    }

    let dims = grid.dimensions();
    let row_end = row_start.saturating_add(row_count).min(dims.height);
    let step = block_size as usize;

    for y in (row_start..row_end).step_by(step) {
        for x in (0..dims.width).step_by(step) {
            let block = Block {
                x,
                y,
                width: x.saturating_add(block_size).min(dims.width) - x,
                height: y.saturating_add(block_size).min(dims.height) - y,
            };
            average_block(grid, block);
            outcome.blocks += 1;

            if after_block(block).is_break() {
                let last = x.saturating_add(block_size) >= dims.width
                    && y.saturating_add(block_size) >= row_end;
                outcome.stopped = !last;
                return outcome;
            }
        }
    }
    outcome
}

/// Replace every pixel of `block` with the block's average color and
/// return that color.
///
/// `block` must lie inside the grid and cover at least one pixel.
pub fn average_block<G: PixelGrid>(grid: &mut G, block: Block) -> Rgb<u8> {
    let rows = block.y..block.y + block.height;
    let cols = block.x..block.x + block.width;

    let color = block_average(
        rows.clone()
            .flat_map(|y| cols.clone().map(move |x| (x, y)))
            .map(|(x, y)| grid.pixel(x, y)),
    );

    for y in rows {
        for x in cols.clone() {
            grid.set_pixel(x, y, color);
        }
    }
    color
}

/// Truncating per-channel mean of a set of pixels.
///
/// Returns black for an empty set.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn block_average<I>(pixels: I) -> Rgb<u8>
where
    I: IntoIterator<Item = Rgb<u8>>,
{
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for Rgb(channels) in pixels {
        for (total, value) in sum.iter_mut().zip(channels) {
            *total += u64::from(value);
        }
        count += 1;
    }
    if count == 0 {
        return Rgb([0, 0, 0]);
    }
    // Each quotient is a mean of u8 values, so it fits in a u8.
    Rgb(sum.map(|total| (total / count) as u8))
}
