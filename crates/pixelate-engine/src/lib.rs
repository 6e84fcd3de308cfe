//! pixelate-engine: block-averaging pixelation with a parallel row-band
//! scheduler.
//!
//! The image is tiled into square blocks; every block is replaced by the
//! truncated integer mean of its pixels. Work is split by rows: the
//! image height is cut into one band per worker and each worker averages
//! the blocks that start inside its band.
//!
//! - [`average`]: the block averager, usable on its own on any
//!   [`PixelGrid`].
//! - [`partition`]: band layout for a given height and worker count.
//! - [`scheduler`]: the worker pool, cancellation and progress fan-in.
//! - [`sink`]: the [`DisplaySink`] trait that receives progressive
//!   snapshots.
//! - [`resize`]: display-only downscaling.
//!
//! This crate does no file I/O. Decoding, encoding and presentation live
//! in the `pixelate` binary.

pub mod average;
pub mod canvas;
pub mod diagnostics;
pub mod partition;
pub mod resize;
pub mod scheduler;
pub mod sink;
pub mod types;

pub use average::{average_block, average_region, average_region_with, block_average};
pub use canvas::{Canvas, PixelGrid};
pub use diagnostics::{BandDiagnostics, RunReport};
pub use partition::{partition, partition_aligned};
pub use resize::{ResizeFilter, fit};
pub use scheduler::{CancelToken, PixelationScheduler};
pub use sink::{DisplaySink, Frame, FrameRecorder, NullSink};
pub use types::{
    Band, Block, Dimensions, PixelateError, Rgb, RgbImage, RunConfig, SeamPolicy, ThreadMode,
    WorkerFailure,
};

/// Pixelate `image` in place without progress reporting.
///
/// Shorthand for building a [`PixelationScheduler`] and running it with
/// a [`NullSink`].
///
/// # Errors
///
/// Returns [`PixelateError::InvalidConfig`] if `config` fails
/// validation, or [`PixelateError::Workers`] if a worker failed.
pub fn pixelate(image: &mut RgbImage, config: &RunConfig) -> Result<RunReport, PixelateError> {
    PixelationScheduler::new(config.clone())?.run(image, &mut NullSink)
}
