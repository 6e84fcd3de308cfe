//! Parallel pixelation over row bands.
//!
//! [`PixelationScheduler`] splits the image into bands (see
//! [`crate::partition`]), runs one scoped worker thread per band over a
//! shared [`Canvas`], and waits for all of them. The calling thread stays
//! busy while the workers run: it is the only consumer of the workers'
//! progress messages and the only thread that talks to the
//! [`DisplaySink`].
//!
//! ```rust
//! # use pixelate_engine::{NullSink, PixelationScheduler, RgbImage, RunConfig};
//! # fn run() -> Result<(), pixelate_engine::PixelateError> {
//! let mut image = RgbImage::new(64, 48);
//! let scheduler = PixelationScheduler::new(RunConfig {
//!     block_size: 8,
//!     worker_count: 4,
//!     ..RunConfig::default()
//! })?;
//! let report = scheduler.run(&mut image, &mut NullSink)?;
//! assert_eq!(report.bands.len(), 4);
//! # Ok(())
//! # }
//! ```
//!
//! # Failure handling
//!
//! A worker that is cancelled or panics does not stop its siblings. Every
//! worker is joined, the canvas is copied back into the caller's image
//! regardless of outcome, and the failures are returned together as
//! [`PixelateError::Workers`]. The image may therefore be partially
//! pixelated after an error.

use std::any::Any;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Instant;

use crate::average::average_region_with;
use crate::canvas::Canvas;
use crate::diagnostics::{BandDiagnostics, RunReport};
use crate::partition::{count_blocks, partition_for};
use crate::sink::{DisplaySink, Frame};
use crate::types::{Band, Block, Dimensions, PixelateError, RgbImage, RunConfig, WorkerFailure};

/// Shared flag used to ask running workers to stop.
///
/// Clones share the same flag. Workers check it after every block, so a
/// cancelled run stops within one block (plus the configured delay) per
/// worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Message a worker posts after writing a block.
#[derive(Debug, Clone, Copy)]
struct BlockDone {
    band: Band,
    block: Block,
}

/// Runs the block averager over an image with a fixed-size worker pool.
#[derive(Debug, Clone)]
pub struct PixelationScheduler {
    config: RunConfig,
    /// Start row of a band whose worker panics after its first block.
    #[cfg(test)]
    panic_band: Option<u32>,
}

impl PixelationScheduler {
    /// Create a scheduler for a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PixelateError::InvalidConfig`] if the block size or
    /// worker count is zero.
    pub fn new(config: RunConfig) -> Result<Self, PixelateError> {
        config.validate()?;
        Ok(Self {
            config,
            #[cfg(test)]
            panic_band: None,
        })
    }

    /// The configuration this scheduler runs with.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Bands the scheduler would hand out for an image of `height` rows.
    #[must_use]
    pub fn bands(&self, height: u32) -> Vec<Band> {
        partition_for(
            self.config.seam_policy,
            height,
            self.config.worker_count,
            self.config.block_size,
        )
    }

    /// Pixelate `image` in place, reporting progress to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`PixelateError::Workers`] if any worker panicked or could
    /// not be spawned.
    pub fn run<S>(&self, image: &mut RgbImage, sink: &mut S) -> Result<RunReport, PixelateError>
    where
        S: DisplaySink + ?Sized,
    {
        self.run_with_cancel(image, sink, &CancelToken::new())
    }

    /// Pixelate `image` in place, stopping early if `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`PixelateError::Workers`] listing every worker that was
    /// interrupted, panicked, or failed to spawn. `image` holds the
    /// partial result.
    pub fn run_with_cancel<S>(
        &self,
        image: &mut RgbImage,
        sink: &mut S,
        cancel: &CancelToken,
    ) -> Result<RunReport, PixelateError>
    where
        S: DisplaySink + ?Sized,
    {
        let started = Instant::now();
        let dimensions = Dimensions::of(image);
        let bands = self.bands(dimensions.height);
        let blocks_total = bands
            .iter()
            .map(|&band| {
                count_blocks(
                    dimensions.width,
                    dimensions.height,
                    band,
                    self.config.block_size,
                )
            })
            .sum();

        tracing::debug!(
            %dimensions,
            block_size = self.config.block_size,
            workers = self.config.worker_count,
            bands = bands.len(),
            blocks_total,
            "starting pixelation run"
        );

        let canvas = Canvas::from_image(image);
        let (tx, rx) = mpsc::channel();

        let (results, frames) = thread::scope(|scope| {
            let handles: Vec<_> = bands
                .iter()
                .map(|&band| {
                    let tx = tx.clone();
                    let canvas = &canvas;
                    let handle = thread::Builder::new()
                        .name(format!("pixelate-{}", band.start_row))
                        .spawn_scoped(scope, move || self.run_band(canvas, band, &tx, cancel));
                    (band, handle)
                })
                .collect();
            // Only the workers hold senders now, so the progress loop ends
            // once every worker has returned.
            drop(tx);

            let frames = drive_sink(&rx, &canvas, sink, blocks_total);

            let results: Vec<_> = handles
                .into_iter()
                .map(|(band, handle)| match handle {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|payload| Err(WorkerFailure::Panicked {
                            band,
                            message: panic_message(payload.as_ref()),
                        })),
                    Err(e) => Err(WorkerFailure::Spawn {
                        band,
                        message: e.to_string(),
                    }),
                })
                .collect();
            (results, frames)
        });

        canvas.write_to(image);

        let mut band_diagnostics = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(diag) => band_diagnostics.push(diag),
                Err(failure) => {
                    tracing::warn!(%failure, "worker did not finish its band");
                    failures.push(failure);
                }
            }
        }

        if !failures.is_empty() {
            return Err(PixelateError::Workers(failures));
        }

        let report = RunReport {
            dimensions,
            block_size: self.config.block_size,
            worker_count: self.config.worker_count,
            seam_policy: self.config.seam_policy,
            bands: band_diagnostics,
            frames,
            total_duration: started.elapsed(),
        };
        tracing::debug!(
            blocks = report.total_blocks(),
            frames,
            elapsed_ms = report.total_duration.as_secs_f64() * 1000.0,
            "pixelation run finished"
        );
        Ok(report)
    }

    /// Body of one worker thread.
    fn run_band(
        &self,
        canvas: &Canvas,
        band: Band,
        progress: &Sender<BlockDone>,
        cancel: &CancelToken,
    ) -> Result<BandDiagnostics, WorkerFailure> {
        let started = Instant::now();
        if cancel.is_cancelled() {
            return Err(WorkerFailure::Interrupted { band });
        }

        let delay = self.config.block_delay;
        let mut grid = canvas;
        let outcome = average_region_with(
            &mut grid,
            self.config.block_size,
            band.start_row,
            band.row_count,
            |block| {
                #[cfg(test)]
                self.panic_if_chosen(band);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                // The receiver only goes away once the run is over.
                let _ = progress.send(BlockDone { band, block });
                if cancel.is_cancelled() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        );

        if outcome.stopped {
            tracing::debug!(%band, blocks = outcome.blocks, "worker interrupted");
            return Err(WorkerFailure::Interrupted { band });
        }

        let duration = started.elapsed();
        tracing::trace!(%band, blocks = outcome.blocks, ?duration, "band done");
        Ok(BandDiagnostics {
            band,
            blocks: outcome.blocks,
            duration,
        })
    }
}

#[cfg(test)]
impl PixelationScheduler {
    /// Make the worker for the band starting at `start_row` panic once it
    /// has written its first block.
    fn panicking_at(mut self, start_row: u32) -> Self {
        self.panic_band = Some(start_row);
        self
    }

    #[allow(clippy::panic)]
    fn panic_if_chosen(&self, band: Band) {
        if self.panic_band == Some(band.start_row) {
            panic!("worker for {band} hit a bad block");
        }
    }
}

/// Feed the sink until every worker has dropped its sender.
///
/// Messages that piled up while the sink was busy are folded into a
/// single frame, so a slow sink never holds the workers back. Returns
/// the number of frames delivered.
fn drive_sink<S>(
    rx: &Receiver<BlockDone>,
    canvas: &Canvas,
    sink: &mut S,
    blocks_total: usize,
) -> usize
where
    S: DisplaySink + ?Sized,
{
    let wants_frames = sink.wants_frames();
    let mut blocks_done = 0;
    let mut frames = 0;

    while let Ok(first) = rx.recv() {
        for done in std::iter::once(first).chain(rx.try_iter()) {
            tracing::trace!(
                band = %done.band,
                x = done.block.x,
                y = done.block.y,
                "block written"
            );
            blocks_done += 1;
        }
        if !wants_frames {
            continue;
        }
        let snapshot = canvas.snapshot();
        sink.update(&Frame {
            snapshot: &snapshot,
            blocks_done,
            blocks_total,
        });
        frames += 1;
    }
    frames
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
