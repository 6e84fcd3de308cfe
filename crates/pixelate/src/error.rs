//! Errors surfaced by the `pixelate` binary.

use std::path::PathBuf;

use pixelate_engine::PixelateError;

/// Anything that makes the binary exit with a failure status.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Arguments or `--config-json` did not describe a usable run.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The input image could not be opened or decoded.
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The output image could not be encoded or written.
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The engine rejected the configuration or a worker failed.
    #[error(transparent)]
    Pixelate(#[from] PixelateError),

    /// The run report could not be serialized.
    #[error("failed to serialize run report")]
    Report(#[from] serde_json::Error),
}
