//! Shared types for the pixelation engine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::seconds;

/// Re-export `RgbImage` so downstream crates can hand buffers to the
/// engine without depending on `image` directly.
pub use image::{Rgb, RgbImage};

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing image buffer.
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A horizontal run of rows `[start_row, start_row + row_count)` handed
/// to exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Band {
    /// First row of the band.
    pub start_row: u32,
    /// Number of rows in the band. Never zero for emitted bands.
    pub row_count: u32,
}

impl Band {
    /// Create a new band.
    #[must_use]
    pub const fn new(start_row: u32, row_count: u32) -> Self {
        Self {
            start_row,
            row_count,
        }
    }

    /// One past the last row of the band.
    #[must_use]
    pub const fn end_row(self) -> u32 {
        self.start_row + self.row_count
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rows {}..{}", self.start_row, self.end_row())
    }
}

/// A block of pixels sharing one averaged color, already clipped to the
/// image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Left column of the block.
    pub x: u32,
    /// Top row of the block.
    pub y: u32,
    /// Clipped width (at most the block size).
    pub width: u32,
    /// Clipped height (at most the block size).
    pub height: u32,
}

impl Block {
    /// Number of pixels covered by the clipped block.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// How band seams relate to block rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeamPolicy {
    /// Bands are cut at `height / workers` regardless of block size.
    ///
    /// A block straddling a seam is averaged by both adjacent bands and
    /// the later write wins for the shared rows. Output is identical to
    /// a single worker only when the band height is a multiple of the
    /// block size.
    #[default]
    Faithful,
    /// Band heights are rounded up to a multiple of the block size, so
    /// every block belongs to exactly one band and the output does not
    /// depend on the worker count.
    Aligned,
}

impl fmt::Display for SeamPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Faithful => f.write_str("Faithful"),
            Self::Aligned => f.write_str("Aligned"),
        }
    }
}

/// Worker selection as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadMode {
    /// `S`: one worker.
    Single,
    /// `M`: one worker per logical CPU on the host.
    Multi,
}

impl ThreadMode {
    /// Resolve the mode into a concrete worker count (always `>= 1`).
    #[must_use]
    pub fn worker_count(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Multi => num_cpus::get().max(1),
        }
    }
}

impl FromStr for ThreadMode {
    type Err = PixelateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("s") {
            Ok(Self::Single)
        } else if s.eq_ignore_ascii_case("m") {
            Ok(Self::Multi)
        } else {
            Err(PixelateError::InvalidThreadMode(s.to_string()))
        }
    }
}

impl fmt::Display for ThreadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("S"),
            Self::Multi => f.write_str("M"),
        }
    }
}

/// Configuration for a single pixelation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Edge length of a square block in pixels. Must be at least 1.
    pub block_size: u32,

    /// Number of parallel workers. Must be at least 1.
    pub worker_count: usize,

    /// Pause after every block write, so progressive display is
    /// visible. Zero disables throttling.
    #[serde(with = "seconds")]
    pub block_delay: Duration,

    /// Where band seams are placed relative to block rows.
    pub seam_policy: SeamPolicy,
}

impl RunConfig {
    /// Default block size in pixels.
    pub const DEFAULT_BLOCK_SIZE: u32 = 10;

    /// Default number of workers.
    pub const DEFAULT_WORKER_COUNT: usize = 1;

    /// Build a config from a block size and thread mode, with all other
    /// fields at their defaults.
    #[must_use]
    pub fn new(block_size: u32, mode: ThreadMode) -> Self {
        Self {
            block_size,
            worker_count: mode.worker_count(),
            ..Self::default()
        }
    }

    /// Check the invariants the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns [`PixelateError::InvalidConfig`] if `block_size` or
    /// `worker_count` is zero.
    pub fn validate(&self) -> Result<(), PixelateError> {
        if self.block_size == 0 {
            return Err(PixelateError::InvalidConfig(
                "block size must be a positive integer".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(PixelateError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            worker_count: Self::DEFAULT_WORKER_COUNT,
            block_delay: Duration::ZERO,
            seam_policy: SeamPolicy::default(),
        }
    }
}

/// Why a single worker did not finish its band.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerFailure {
    /// The run was cancelled; the worker stopped at a block boundary.
    #[error("worker for {band} was interrupted")]
    Interrupted {
        /// Band the worker was processing.
        band: Band,
    },

    /// The worker thread panicked.
    #[error("worker for {band} panicked: {message}")]
    Panicked {
        /// Band the worker was processing.
        band: Band,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// The operating system refused to start the worker thread.
    #[error("worker for {band} could not be spawned: {message}")]
    Spawn {
        /// Band the worker would have processed.
        band: Band,
        /// The spawn error.
        message: String,
    },
}

impl WorkerFailure {
    /// The band the failed worker was assigned.
    #[must_use]
    pub const fn band(&self) -> Band {
        match self {
            Self::Interrupted { band } | Self::Panicked { band, .. } | Self::Spawn { band, .. } => {
                *band
            }
        }
    }
}

/// Errors that can occur while configuring or running the engine.
#[derive(Debug, thiserror::Error)]
pub enum PixelateError {
    /// Run configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Thread mode was neither `S` nor `M`.
    #[error("unsupported thread mode '{0}' (expected S or M)")]
    InvalidThreadMode(String),

    /// One or more workers failed. The image still holds whatever the
    /// surviving workers wrote.
    #[error("{} worker(s) failed: {}", .0.len(), join_failures(.0))]
    Workers(Vec<WorkerFailure>),
}

fn join_failures(failures: &[WorkerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn thread_mode_parses_case_insensitively() {
        assert_eq!("S".parse::<ThreadMode>().unwrap(), ThreadMode::Single);
        assert_eq!("s".parse::<ThreadMode>().unwrap(), ThreadMode::Single);
        assert_eq!("M".parse::<ThreadMode>().unwrap(), ThreadMode::Multi);
        assert_eq!("m".parse::<ThreadMode>().unwrap(), ThreadMode::Multi);
    }

    #[test]
    fn thread_mode_rejects_other_values() {
        for bad in ["", "x", "SM", "single", " s"] {
            let err = bad.parse::<ThreadMode>().unwrap_err();
            assert!(matches!(err, PixelateError::InvalidThreadMode(ref s) if s == bad));
        }
    }

    #[test]
    fn single_mode_uses_one_worker() {
        assert_eq!(ThreadMode::Single.worker_count(), 1);
    }

    #[test]
    fn multi_mode_uses_at_least_one_worker() {
        assert!(ThreadMode::Multi.worker_count() >= 1);
    }

    #[test]
    fn run_config_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.block_size, 10);
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.block_delay, Duration::ZERO);
        assert_eq!(config.seam_policy, SeamPolicy::Faithful);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_block_size_is_invalid() {
        let config = RunConfig {
            block_size: 0,
            ..RunConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PixelateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_workers_is_invalid() {
        let config = RunConfig {
            worker_count: 0,
            ..RunConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PixelateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn run_config_serde_round_trip() {
        let config = RunConfig {
            block_size: 7,
            worker_count: 3,
            block_delay: Duration::from_millis(40),
            seam_policy: SeamPolicy::Aligned,
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn run_config_missing_fields_use_defaults() {
        let config: RunConfig = serde_json::from_str(r#"{"block_size": 4}"#).unwrap();
        assert_eq!(config.block_size, 4);
        assert_eq!(config.worker_count, RunConfig::DEFAULT_WORKER_COUNT);
        assert_eq!(config.block_delay, Duration::ZERO);
    }

    #[test]
    fn band_end_row() {
        assert_eq!(Band::new(4, 3).end_row(), 7);
        assert_eq!(Band::new(4, 3).to_string(), "rows 4..7");
    }

    #[test]
    fn workers_error_lists_every_failure() {
        let err = PixelateError::Workers(vec![
            WorkerFailure::Interrupted {
                band: Band::new(0, 2),
            },
            WorkerFailure::Panicked {
                band: Band::new(2, 2),
                message: "boom".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "2 worker(s) failed: worker for rows 0..2 was interrupted; \
             worker for rows 2..4 panicked: boom",
        );
    }

    #[test]
    fn invalid_thread_mode_display() {
        let err = PixelateError::InvalidThreadMode("Q".to_string());
        assert_eq!(
            err.to_string(),
            "unsupported thread mode 'Q' (expected S or M)"
        );
    }
}
