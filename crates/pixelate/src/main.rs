//! pixelate: block-average an image with a live preview.
//!
//! Loads an image, shrinks a copy to fit the display bounds, pixelates
//! that copy while drawing progress in the terminal, then writes a
//! pixelated version of the image at its original resolution.
//!
//! # Usage
//!
//! ```text
//! pixelate [OPTIONS] <IMAGE_PATH> <BLOCK_SIZE> <THREAD_MODE>
//! ```
//!
//! `THREAD_MODE` is `S` for a single worker or `M` for one worker per
//! logical CPU. Set `RUST_LOG` to change log verbosity (default `info`).
//!
//! A run is never cancelled from the command line: the scheduler is
//! driven without a `CancelToken`, and an interrupt signal ends the
//! process with its default action before any output is written.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod error;
mod preview;

use std::fs::File;
use std::io::{self, BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, ImageFormat};
use pixelate_engine::{
    Dimensions, DisplaySink, NullSink, PixelationScheduler, ResizeFilter, RgbImage, RunConfig,
    RunReport, SeamPolicy, ThreadMode,
};
use tracing_subscriber::EnvFilter;

use crate::error::CliError;
use crate::preview::{LogProgress, TerminalPreview};

/// Pixelate an image by averaging square blocks of pixels.
///
/// The preview is drawn from a downscaled copy; the output file always
/// has the input's resolution.
#[derive(Debug, Parser)]
#[command(name = "pixelate", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Edge length of each square block, in pixels.
    #[arg(value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    block_size: u32,

    /// S (single worker) or M (one worker per logical CPU).
    thread_mode: ThreadMode,

    /// Output path. The format follows the extension.
    #[arg(short, long, default_value = "output_image.jpg")]
    output: PathBuf,

    /// JPEG quality for JPEG output.
    #[arg(long, default_value_t = 90, value_parser = clap::builder::RangedU64ValueParser::<u8>::new().range(1..=100))]
    quality: u8,

    /// Maximum preview width in pixels.
    #[arg(long, default_value_t = 120, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_width: u32,

    /// Maximum preview height in pixels.
    #[arg(long, default_value_t = 80, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_height: u32,

    /// Resampling filter for the preview downscale.
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    filter: Filter,

    /// How to show progress.
    #[arg(long, value_enum, default_value_t = Preview::Terminal)]
    preview: Preview,

    /// Pause after each block, in milliseconds.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Round band heights up to whole blocks so no block spans two
    /// workers.
    #[arg(long)]
    aligned_seams: bool,

    /// Print the run report as JSON instead of a text summary.
    #[arg(long)]
    json: bool,

    /// Full run config as a JSON string.
    ///
    /// When provided, `BLOCK_SIZE`, `THREAD_MODE`, `--delay-ms` and
    /// `--aligned-seams` are ignored. The JSON must be a valid
    /// `RunConfig` serialization; missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Preview resampling filter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl Filter {
    const fn to_resize_filter(self) -> ResizeFilter {
        match self {
            Self::Nearest => ResizeFilter::Nearest,
            Self::Triangle => ResizeFilter::Triangle,
            Self::CatmullRom => ResizeFilter::CatmullRom,
            Self::Gaussian => ResizeFilter::Gaussian,
            Self::Lanczos3 => ResizeFilter::Lanczos3,
        }
    }
}

/// Progress display selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preview {
    /// Redraw the image in the terminal as it is pixelated.
    Terminal,
    /// Log progress every 10%.
    Log,
    /// No progress output.
    None,
}

impl Preview {
    fn sink(self) -> Box<dyn DisplaySink> {
        match self {
            Self::Terminal => Box::new(TerminalPreview::stderr()),
            Self::Log => Box::new(LogProgress::default()),
            Self::None => Box::new(NullSink),
        }
    }
}

/// Build a [`RunConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual run flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<RunConfig, CliError> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json)
            .map_err(|e| CliError::Config(format!("--config-json: {e}")));
    }

    Ok(RunConfig {
        block_size: cli.block_size,
        worker_count: cli.thread_mode.worker_count(),
        block_delay: Duration::from_millis(cli.delay_ms),
        seam_policy: if cli.aligned_seams {
            SeamPolicy::Aligned
        } else {
            SeamPolicy::Faithful
        },
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_image(path: &Path) -> Result<RgbImage, CliError> {
    let image = image::open(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgb8())
}

/// Encode `image` to `path`, using `quality` when the extension is JPEG.
fn write_image(image: &RgbImage, path: &Path, quality: u8) -> Result<(), CliError> {
    let write_error = |source: ImageError| CliError::Write {
        path: path.to_path_buf(),
        source,
    };

    match ImageFormat::from_path(path).map_err(write_error)? {
        ImageFormat::Jpeg => {
            let file = File::create(path).map_err(|e| write_error(ImageError::IoError(e)))?;
            let mut writer = BufWriter::new(file);
            JpegEncoder::new_with_quality(&mut writer, quality)
                .encode_image(image)
                .map_err(write_error)?;
            writer
                .flush()
                .map_err(|e| write_error(ImageError::IoError(e)))
        }
        _ => image.save(path).map_err(write_error),
    }
}

/// Config for the headless run that produces the output after a preview
/// on a downscaled copy.
///
/// Seams are aligned to block rows, so the output equals one sequential
/// pass over the whole image whatever the worker count. No delay.
fn full_resolution_config(config: &RunConfig) -> RunConfig {
    RunConfig {
        block_delay: Duration::ZERO,
        seam_policy: SeamPolicy::Aligned,
        ..config.clone()
    }
}

/// Pixelate the input and write the output. Returns the report for the
/// run that produced the output file.
fn run(cli: &Cli) -> Result<RunReport, CliError> {
    let config = config_from_cli(cli)?;
    let scheduler = PixelationScheduler::new(config)?;

    let mut original = read_image(&cli.image_path)?;
    tracing::info!(
        path = %cli.image_path.display(),
        dimensions = %Dimensions::of(&original),
        block_size = scheduler.config().block_size,
        workers = scheduler.config().worker_count,
        "loaded image"
    );

    let mut sink = cli.preview.sink();
    let displayed = pixelate_engine::fit(
        &original,
        cli.max_width,
        cli.max_height,
        cli.filter.to_resize_filter(),
    );

    let report = if let Some(mut shown) = displayed {
        let preview = scheduler.run(&mut shown, &mut sink)?;
        tracing::info!(
            dimensions = %preview.dimensions,
            frames = preview.frames,
            "preview finished, pixelating at full resolution"
        );
        PixelationScheduler::new(full_resolution_config(scheduler.config()))?
            .run(&mut original, &mut NullSink)?
    } else {
        scheduler.run(&mut original, &mut sink)?
    };

    write_image(&original, &cli.output, cli.quality)?;
    tracing::info!(path = %cli.output.display(), "wrote output");
    Ok(report)
}

fn print_report(report: &RunReport, json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.report());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(&cli).and_then(|report| print_report(&report, cli.json)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                tracing::error!("caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pixelate_engine::{Rgb, average_region};

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("pixelate").chain(args.iter().copied()))
    }

    #[test]
    fn defaults() {
        let cli = parse(&["in.png", "10", "S"]).unwrap();
        assert_eq!(cli.image_path, PathBuf::from("in.png"));
        assert_eq!(cli.block_size, 10);
        assert_eq!(cli.thread_mode, ThreadMode::Single);
        assert_eq!(cli.output, PathBuf::from("output_image.jpg"));
        assert_eq!(cli.quality, 90);
        assert_eq!((cli.max_width, cli.max_height), (120, 80));
        assert_eq!(cli.filter, Filter::Triangle);
        assert_eq!(cli.preview, Preview::Terminal);
        assert!(!cli.json);

        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.block_size, 10);
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.block_delay, Duration::ZERO);
        assert_eq!(config.seam_policy, SeamPolicy::Faithful);
    }

    #[test]
    fn thread_mode_is_case_insensitive() {
        assert_eq!(parse(&["a.png", "4", "m"]).unwrap().thread_mode, ThreadMode::Multi);
        assert_eq!(parse(&["a.png", "4", "s"]).unwrap().thread_mode, ThreadMode::Single);
    }

    #[test]
    fn rejects_unknown_thread_mode() {
        assert!(parse(&["a.png", "4", "X"]).is_err());
        assert!(parse(&["a.png", "4", "multi"]).is_err());
    }

    #[test]
    fn rejects_zero_block_size() {
        assert!(parse(&["a.png", "0", "S"]).is_err());
        assert!(parse(&["a.png", "-3", "S"]).is_err());
    }

    #[test]
    fn rejects_out_of_range_quality() {
        assert!(parse(&["a.png", "4", "S", "--quality", "0"]).is_err());
        assert!(parse(&["a.png", "4", "S", "--quality", "101"]).is_err());
    }

    #[test]
    fn flags_shape_the_config() {
        let cli = parse(&[
            "a.png",
            "6",
            "M",
            "--delay-ms",
            "25",
            "--aligned-seams",
            "--preview",
            "none",
            "--filter",
            "catmull-rom",
        ])
        .unwrap();
        assert_eq!(cli.preview, Preview::None);
        assert_eq!(cli.filter.to_resize_filter(), ResizeFilter::CatmullRom);

        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.block_size, 6);
        assert!(config.worker_count >= 1);
        assert_eq!(config.block_delay, Duration::from_millis(25));
        assert_eq!(config.seam_policy, SeamPolicy::Aligned);
    }

    #[test]
    fn filter_flag_names_match_library_names() {
        for filter in Filter::value_variants() {
            let flag = filter.to_possible_value().unwrap();
            assert_eq!(flag.get_name(), filter.to_resize_filter().name());
        }
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = parse(&[
            "a.png",
            "6",
            "S",
            "--aligned-seams",
            "--config-json",
            r#"{"block_size": 3, "worker_count": 2}"#,
        ])
        .unwrap();
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.block_size, 3);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.seam_policy, SeamPolicy::Faithful);
    }

    #[test]
    fn malformed_config_json_is_a_config_error() {
        let cli = parse(&["a.png", "6", "S", "--config-json", "{not json"]).unwrap();
        assert!(matches!(config_from_cli(&cli), Err(CliError::Config(_))));
    }

    #[test]
    fn zero_block_size_in_config_json_fails_validation() {
        let cli = parse(&["a.png", "6", "S", "--config-json", r#"{"block_size": 0}"#]).unwrap();
        let config = config_from_cli(&cli).unwrap();
        assert!(PixelationScheduler::new(config).is_err());
    }

    #[test]
    fn writes_png_and_jpeg_at_full_size() {
        let dir = std::env::temp_dir().join(format!("pixelate-main-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let image = RgbImage::from_pixel(9, 7, Rgb([200, 40, 90]));

        let png = dir.join("out.png");
        write_image(&image, &png, 90).unwrap();
        assert_eq!(read_image(&png).unwrap(), image);

        let jpeg = dir.join("out.jpg");
        write_image(&image, &jpeg, 75).unwrap();
        assert_eq!(read_image(&jpeg).unwrap().dimensions(), (9, 7));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unknown_output_extension_is_a_write_error() {
        let image = RgbImage::new(2, 2);
        let result = write_image(&image, Path::new("out.unknown-format"), 90);
        assert!(matches!(result, Err(CliError::Write { .. })));
    }

    #[test]
    fn missing_input_is_a_read_error() {
        let result = read_image(Path::new("definitely/not/here.png"));
        assert!(matches!(result, Err(CliError::Read { .. })));
    }

    #[test]
    fn full_resolution_config_aligns_seams_and_drops_delay() {
        let preview = RunConfig {
            block_size: 7,
            worker_count: 3,
            block_delay: Duration::from_millis(40),
            seam_policy: SeamPolicy::Faithful,
        };
        let full = full_resolution_config(&preview);
        assert_eq!(full.block_size, 7);
        assert_eq!(full.worker_count, 3);
        assert_eq!(full.block_delay, Duration::ZERO);
        assert_eq!(full.seam_policy, SeamPolicy::Aligned);
    }

    #[test]
    fn downscaled_preview_still_writes_seamless_output() {
        let dir = std::env::temp_dir().join(format!("pixelate-seamless-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("in.png");
        let output = dir.join("out.png");
        let source = RgbImage::from_fn(200, 150, |x, y| {
            Rgb([
                u8::try_from((x * 7 + y * 13) % 256).unwrap(),
                u8::try_from((x * y) % 256).unwrap(),
                u8::try_from((x * 3 + y * 29) % 256).unwrap(),
            ])
        });
        source.save(&input).unwrap();

        // 150 rows / 2 workers = 75 rows per band, not a multiple of 4.
        let cli = parse(&[
            input.to_str().unwrap(),
            "4",
            "S",
            "--preview",
            "none",
            "--config-json",
            r#"{"block_size": 4, "worker_count": 2}"#,
            "-o",
            output.to_str().unwrap(),
        ])
        .unwrap();
        let report = run(&cli).unwrap();
        assert_eq!(report.dimensions, Dimensions::of(&source));

        let mut expected = source;
        average_region(&mut expected, 4, 0, 150);
        assert_eq!(read_image(&output).unwrap(), expected);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
