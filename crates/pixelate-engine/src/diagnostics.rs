//! Run diagnostics: per-band timing and block counts.
//!
//! Every scheduler run produces a [`RunReport`]. The CLI prints it as a
//! short text summary or as JSON.
//!
//! Durations appear in JSON as seconds, e.g. `"duration": 0.0042`.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Band, Dimensions, SeamPolicy};

/// `Duration` fields as a plain number of seconds.
pub(crate) mod seconds {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    /// Negative, NaN and out-of-range values are rejected.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format_args!("{secs} is not a valid duration: {e}")))
    }
}

/// Metrics for one worker's band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandDiagnostics {
    /// The rows the worker was assigned.
    pub band: Band,
    /// Number of blocks averaged, including seam blocks shared with the
    /// next band.
    pub blocks: usize,
    /// Wall-clock time the worker spent on the band (seconds).
    #[serde(with = "seconds")]
    pub duration: Duration,
}

/// Diagnostics collected from a single scheduler run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Dimensions of the processed buffer.
    pub dimensions: Dimensions,
    /// Block size used.
    pub block_size: u32,
    /// Size of the worker pool.
    pub worker_count: usize,
    /// Seam placement used for the bands.
    pub seam_policy: SeamPolicy,
    /// One entry per band, in row order.
    pub bands: Vec<BandDiagnostics>,
    /// Number of display frames delivered to the sink.
    pub frames: usize,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "seconds")]
    pub total_duration: Duration,
}

impl RunReport {
    /// Total blocks averaged across all bands.
    #[must_use]
    pub fn total_blocks(&self) -> usize {
        self.bands.iter().map(|b| b.blocks).sum()
    }

    /// Format the report as a human-readable table.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Image {} | block {}px | {} worker(s) | {} bands ({} seams)",
            self.dimensions,
            self.block_size,
            self.worker_count,
            self.bands.len(),
            self.seam_policy,
        );
        let _ = writeln!(out, "{}", "-".repeat(48));
        let _ = writeln!(out, "{:<20} {:>10} {:>14}", "Band", "Blocks", "Time (ms)");
        for band in &self.bands {
            let _ = writeln!(
                out,
                "{:<20} {:>10} {:>14.3}",
                band.band.to_string(),
                band.blocks,
                band.duration.as_secs_f64() * 1000.0,
            );
        }
        let _ = writeln!(out, "{}", "-".repeat(48));
        let _ = write!(
            out,
            "{} blocks, {} frames, {:.3}ms total",
            self.total_blocks(),
            self.frames,
            self.total_duration.as_secs_f64() * 1000.0,
        );
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> RunReport {
        RunReport {
            dimensions: Dimensions {
                width: 8,
                height: 6,
            },
            block_size: 2,
            worker_count: 2,
            seam_policy: SeamPolicy::Faithful,
            bands: vec![
                BandDiagnostics {
                    band: Band::new(0, 3),
                    blocks: 8,
                    duration: Duration::from_millis(3),
                },
                BandDiagnostics {
                    band: Band::new(3, 3),
                    blocks: 8,
                    duration: Duration::from_millis(4),
                },
            ],
            frames: 5,
            total_duration: Duration::from_millis(9),
        }
    }

    #[test]
    fn total_blocks_sums_bands() {
        assert_eq!(sample().total_blocks(), 16);
    }

    #[test]
    fn report_mentions_every_band() {
        let text = sample().report();
        assert!(text.contains("Image 8x6"));
        assert!(text.contains("rows 0..3"));
        assert!(text.contains("rows 3..6"));
        assert!(text.contains("16 blocks, 5 frames"));
    }

    #[test]
    fn run_report_json_uses_fractional_seconds() {
        let json = serde_json::to_value(sample()).unwrap();
        let secs = json["total_duration"].as_f64().unwrap();
        assert!((secs - 0.009).abs() < 1e-9);
        let deserialized: RunReport = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized.bands.len(), 2);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = r#"{"band":{"start_row":0,"row_count":1},"blocks":1,"duration":-1.0}"#;
        assert!(serde_json::from_str::<BandDiagnostics>(json).is_err());
    }
}
