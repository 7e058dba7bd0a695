//! gridsnap-bench: CLI tool for normalizing grid photographs and
//! inspecting per-pass diagnostics.
//!
//! Runs the normalization on a given image file with configurable
//! parameters, printing a per-pass, per-stage report. Useful for:
//!
//! - Checking why a photograph needs recovery or fails outright
//! - Tuning scan lines, consensus iterations and the inlier band
//! - Measuring per-stage durations to identify bottlenecks
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin gridsnap-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use gridsnap_pipeline::diagnostics::PassDiagnostics;
use gridsnap_pipeline::{Clock, NormalizeConfig, NormalizeDiagnostics, RgbaImage};

/// Grid photograph normalization and diagnostics for gridsnap.
///
/// Normalizes a photograph of a square grid into a canonical square and
/// prints detailed per-pass timing and detection diagnostics.
#[derive(Parser)]
#[command(name = "gridsnap-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Side length of the square output canvas.
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_MAX_DIMENSION)]
    max_dimension: u32,

    /// Margin between the canvas edge and the warped grid.
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_BORDER_MARGIN)]
    border_margin: u32,

    /// Working resolution (max dimension in pixels after downsampling).
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_WORKING_RESOLUTION, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    working_resolution: u32,

    /// Downsample filter (disabled, nearest, triangle, catmull-rom, gaussian, lanczos3).
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    downsample_filter: Filter,

    /// Scan lines per side.
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_SCAN_LINES, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(2..))]
    scan_lines: u32,

    /// Consensus iterations per side.
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_RANSAC_ITERATIONS, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    ransac_iterations: u32,

    /// Inlier distance in pixels.
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_INLIER_THRESHOLD)]
    inlier_threshold: f64,

    /// Seed for consensus sampling.
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_SEED)]
    seed: u64,

    /// Largest pass 2/3 RMSE that still counts as converged.
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_SIMILARITY_THRESHOLD)]
    similarity_threshold: f64,

    /// Full normalization config as a JSON string.
    ///
    /// When provided, all other parameter flags are ignored.
    /// The JSON must be a valid `NormalizeConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Write the normalized square to this PNG file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the binarized working image to this PNG file.
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Write the photograph with the detected outline drawn on it.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Print progress messages as they are emitted.
    #[arg(long, short)]
    verbose: bool,
}

/// Downsample resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Disabled: skip downsampling regardless of image size.
    Disabled,
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

/// Maps a [`gridsnap_pipeline::DownsampleFilter`] to the local CLI [`Filter`] enum.
const fn filter_from_pipeline(f: gridsnap_pipeline::DownsampleFilter) -> Filter {
    match f {
        gridsnap_pipeline::DownsampleFilter::Disabled => Filter::Disabled,
        gridsnap_pipeline::DownsampleFilter::Nearest => Filter::Nearest,
        gridsnap_pipeline::DownsampleFilter::Triangle => Filter::Triangle,
        gridsnap_pipeline::DownsampleFilter::CatmullRom => Filter::CatmullRom,
        gridsnap_pipeline::DownsampleFilter::Gaussian => Filter::Gaussian,
        gridsnap_pipeline::DownsampleFilter::Lanczos3 => Filter::Lanczos3,
    }
}

const fn filter_to_pipeline(f: Filter) -> gridsnap_pipeline::DownsampleFilter {
    match f {
        Filter::Disabled => gridsnap_pipeline::DownsampleFilter::Disabled,
        Filter::Nearest => gridsnap_pipeline::DownsampleFilter::Nearest,
        Filter::Triangle => gridsnap_pipeline::DownsampleFilter::Triangle,
        Filter::CatmullRom => gridsnap_pipeline::DownsampleFilter::CatmullRom,
        Filter::Gaussian => gridsnap_pipeline::DownsampleFilter::Gaussian,
        Filter::Lanczos3 => gridsnap_pipeline::DownsampleFilter::Lanczos3,
    }
}

/// The CLI default filter, derived from [`NormalizeConfig::DEFAULT_DOWNSAMPLE_FILTER`]
/// so the two cannot silently diverge.
const CLI_DEFAULT_FILTER: Filter = filter_from_pipeline(NormalizeConfig::DEFAULT_DOWNSAMPLE_FILTER);

/// Build a [`NormalizeConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Missing fields take their
/// defaults.
fn config_from_cli(cli: &Cli) -> Result<NormalizeConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(NormalizeConfig {
        max_dimension: cli.max_dimension,
        border_margin: cli.border_margin,
        working_resolution: cli.working_resolution,
        downsample_filter: filter_to_pipeline(cli.downsample_filter),
        scan_lines: cli.scan_lines,
        ransac_iterations: cli.ransac_iterations,
        inlier_threshold: cli.inlier_threshold,
        seed: cli.seed,
        similarity_threshold: cli.similarity_threshold,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    let photo = match gridsnap_pipeline::codec::decode_rgba(&image_bytes) {
        Ok(img) => img,
        Err(e) => {
            eprintln!("Error decoding {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes, {}x{})",
        cli.image_path.display(),
        image_bytes.len(),
        photo.width(),
        photo.height(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut failed = false;

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let mut progress = gridsnap_pipeline::ProgressFn(|message: &str| {
            if cli.verbose {
                eprintln!("  {message}");
            }
        });
        let (outcome, diagnostics) = gridsnap_pipeline::normalize_with_diagnostics(
            &photo,
            &config,
            &mut progress,
            &StdClock,
        );

        if cli.json {
            match serde_json::to_string_pretty(&diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", diagnostics.report());
        }

        match outcome {
            Ok(result) => {
                let c = &result.corners;
                eprintln!(
                    "Mode: {}{}",
                    result.mode,
                    if result.recovered { " (recovered)" } else { "" },
                );
                eprintln!(
                    "Corners: TL ({:.1}, {:.1})  TR ({:.1}, {:.1})  BR ({:.1}, {:.1})  BL ({:.1}, {:.1})",
                    c.top_left.x,
                    c.top_left.y,
                    c.top_right.x,
                    c.top_right.y,
                    c.bottom_right.x,
                    c.bottom_right.y,
                    c.bottom_left.x,
                    c.bottom_left.y,
                );

                // Write images on the first run only.
                if run == 0 {
                    if let Some(ref path) = cli.output {
                        write_png(path, &result.final_image, "Output");
                    }
                    if let Some(ref path) = cli.binary {
                        write_png(path, &result.processed_binary_image, "Binary image");
                    }
                    if let Some(ref path) = cli.overlay {
                        let overlay = gridsnap_pipeline::overlay::draw_detection(&photo, &result.corners);
                        write_png(path, &overlay, "Overlay");
                    }
                }
            }
            Err(e) => {
                eprintln!("Normalization error: {e}");
                failed = true;
            }
        }

        all_diagnostics.push(diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Encode `image` as PNG and write it to `path`, reporting the outcome.
fn write_png(path: &Path, image: &RgbaImage, what: &str) {
    let bytes = match gridsnap_pipeline::codec::encode_png(image) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error encoding {what}: {e}");
            return;
        }
    };
    match std::fs::write(path, &bytes) {
        Ok(()) => {
            log::info!("wrote {} ({} bytes)", path.display(), bytes.len());
            eprintln!("{what} written to {} ({} bytes)", path.display(), bytes.len());
        }
        Err(e) => {
            eprintln!("Error writing {what} to {}: {e}", path.display());
        }
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from one pass.
type StageExtractor = fn(&PassDiagnostics) -> Option<Duration>;

fn stage_duration(pass: &PassDiagnostics, name: &str) -> Option<Duration> {
    pass.stages
        .iter()
        .find(|s| s.stage == name)
        .map(|s| s.duration)
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[NormalizeDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means across every pass of every run.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Prepare", |p| stage_duration(p, "prepare")),
        ("Binarize", |p| stage_duration(p, "binarize")),
        ("Border Clean", |p| stage_duration(p, "border")),
        ("Edge Sampling", |p| stage_duration(p, "sample")),
        ("Line Fitting", |p| stage_duration(p, "fit")),
        ("Corner Solving", |p| stage_duration(p, "corners")),
        ("Warp", |p| stage_duration(p, "warp")),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .flat_map(|d| d.passes.iter())
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }

    let recovered = all_diagnostics.iter().filter(|d| d.recovered).count();
    println!();
    println!("Recovered runs: {recovered}/{}", all_diagnostics.len());
}
