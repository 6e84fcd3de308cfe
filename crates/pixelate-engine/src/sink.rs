//! Progressive display of a run in progress.
//!
//! Workers never touch a sink. They post a message after each block, and
//! the thread that called the scheduler drains those messages, snapshots
//! the shared buffer, and hands the snapshot to the sink. Every frame is
//! therefore at least as new as the last block reported before it.

use crate::types::RgbImage;

/// One progress update.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Current contents of the buffer being pixelated.
    pub snapshot: &'a RgbImage,
    /// Blocks written so far, across all workers.
    pub blocks_done: usize,
    /// Blocks the run will write if no worker fails.
    pub blocks_total: usize,
}

impl Frame<'_> {
    /// Progress as a fraction in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.blocks_total == 0 {
            1.0
        } else {
            (self.blocks_done as f64 / self.blocks_total as f64).min(1.0)
        }
    }

    /// `true` once every expected block has been written.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.blocks_done >= self.blocks_total
    }
}

/// Receives progressive snapshots of a run.
pub trait DisplaySink {
    /// Called with a fresh snapshot after one or more blocks finish.
    fn update(&mut self, frame: &Frame<'_>);

    /// Whether this sink looks at snapshots at all.
    ///
    /// Returning `false` lets the scheduler skip the per-frame buffer
    /// copy entirely.
    fn wants_frames(&self) -> bool {
        true
    }
}

/// A sink that ignores every update. Used for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn update(&mut self, _frame: &Frame<'_>) {}

    fn wants_frames(&self) -> bool {
        false
    }
}

/// Counts frames and keeps the most recent snapshot.
#[derive(Debug, Default, Clone)]
pub struct FrameRecorder {
    /// Number of frames received.
    pub frames: usize,
    /// `blocks_done` of every frame, in arrival order.
    pub progress: Vec<usize>,
    /// The last snapshot seen.
    pub last: Option<RgbImage>,
}

impl DisplaySink for FrameRecorder {
    fn update(&mut self, frame: &Frame<'_>) {
        self.frames += 1;
        self.progress.push(frame.blocks_done);
        self.last = Some(frame.snapshot.clone());
    }
}

impl<S: DisplaySink + ?Sized> DisplaySink for &mut S {
    fn update(&mut self, frame: &Frame<'_>) {
        (**self).update(frame);
    }

    fn wants_frames(&self) -> bool {
        (**self).wants_frames()
    }
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn update(&mut self, frame: &Frame<'_>) {
        (**self).update(frame);
    }

    fn wants_frames(&self) -> bool {
        (**self).wants_frames()
    }
}
