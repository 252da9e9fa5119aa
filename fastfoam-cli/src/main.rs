//! Offline replay driver for the fastfoam pipeline.
//!
//! Generates deterministic synthetic trains, pushes them through
//! correction, assembly and the statistics accumulator, and prints a
//! run summary. Useful for benchmarking and for exercising the full
//! pipeline without a bridge connection.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::too_many_lines
)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use ndarray::Array2;
use thiserror::Error;

use fastfoam_algorithms::{
    radial_profile, HistogramConfig, ProcessorConfig, RoiDefinition, StatisticsConfig,
    TrainProcessor,
};
use fastfoam_core::{
    AssembledImage, CalibrationSet, CorrectionConstants, GeometryDescriptor, ModulePanel,
    ModulePlacement, Orientation, Pulse, PulseTag, QuadPosition, Train,
};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ROI file error: {0}")]
    RoiFile(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] fastfoam_core::Error),
}

/// Offline replay for detector train processing.
#[derive(Parser)]
#[command(name = "fastfoam")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay synthetic trains through the full pipeline
    Replay {
        /// Number of trains to generate
        #[arg(long, default_value_t = 64)]
        trains: usize,

        /// Pulses per train
        #[arg(long, default_value_t = 32)]
        pulses: usize,

        /// Module edge length in pixels (modules are square)
        #[arg(long, default_value_t = 128)]
        module_size: usize,

        /// Seed for the synthetic data generator
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// JSON file with ROI definitions
        #[arg(long)]
        rois: Option<PathBuf>,

        /// Histogram bin edges
        #[arg(long, value_delimiter = ',')]
        edges: Option<Vec<f64>>,

        /// First pulse index to process (inclusive)
        #[arg(long)]
        first_pulse: Option<usize>,

        /// Last pulse index to process (inclusive)
        #[arg(long)]
        last_pulse: Option<usize>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Replay {
            trains,
            pulses,
            module_size,
            seed,
            rois,
            edges,
            first_pulse,
            last_pulse,
        } => replay(
            trains,
            pulses,
            module_size,
            seed,
            rois,
            edges,
            (first_pulse, last_pulse),
        ),
    }
}

fn replay(
    trains: usize,
    pulses: usize,
    module_size: usize,
    seed: u64,
    roi_file: Option<PathBuf>,
    edges: Option<Vec<f64>>,
    pulse_window: (Option<usize>, Option<usize>),
) -> Result<()> {
    let geometry = quad_geometry(module_size)?;
    let calibration = synthetic_calibration(&geometry, seed)?;

    let statistics = StatisticsConfig {
        rois: load_rois(roi_file)?,
        histogram: edges.map(|edges| HistogramConfig { edges }),
    };
    let pulse_range = match pulse_window {
        (None, None) => None,
        (first, last) => Some((first.unwrap_or(0), last.unwrap_or(usize::MAX))),
    };

    let mut processor = TrainProcessor::new(
        geometry.clone(),
        calibration,
        ProcessorConfig {
            statistics,
            pulse_range,
        },
    )?;

    println!(
        "Replaying {} trains x {} pulses, canvas {:?}",
        trains,
        pulses,
        processor.canvas_shape()
    );

    let mut generator = Lcg::new(seed);
    let start = Instant::now();
    for train_id in 0..trains {
        let train = synthetic_train(&geometry, train_id as u64, pulses, &mut generator);
        processor.process_train(train);
    }
    let elapsed = start.elapsed();

    let counters = processor.statistics();
    let snapshot = processor.snapshot();

    println!("\n=== Run summary ===");
    println!("Trains processed:   {}", counters.trains);
    println!("Pulses assembled:   {}", counters.pulses);
    println!("Frames dropped:     {}", counters.dropped_frames);
    println!(
        "Throughput:         {:.1} pulses/s",
        counters.pulses as f64 / elapsed.as_secs_f64()
    );

    for (name, stream) in [("on", &snapshot.on), ("off", &snapshot.off)] {
        let valid_means: Vec<f64> = stream
            .mean
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        let overall = if valid_means.is_empty() {
            f64::NAN
        } else {
            valid_means.iter().sum::<f64>() / valid_means.len() as f64
        };
        println!(
            "Stream {:<4} frames {:>6}  mean-image average {:.3}",
            name, stream.frames, overall
        );

        for series in &stream.rois {
            let defined = series.samples.iter().filter(|s| s.value.is_some()).count();
            println!(
                "  ROI {:<12} {} samples ({} with data)",
                series.label,
                series.samples.len(),
                defined
            );
        }
        if let Some(histogram) = &stream.histogram {
            println!(
                "  Histogram: {} binned, {} rejected, counts {:?}",
                histogram.total(),
                histogram.rejected(),
                histogram.counts()
            );
        }
    }

    // radial profile of the pumped mean image about the canvas centre
    let (rows, cols) = processor.canvas_shape();
    let mean_image = AssembledImage::new(snapshot.on.mean.mapv(|v| v as f32));
    let profile = radial_profile(&mean_image, (cols as f64 / 2.0, rows as f64 / 2.0));
    let rings: Vec<String> = (0..profile.len().min(8))
        .map(|radius| match profile.mean(radius) {
            Some(mean) => format!("{mean:.1}"),
            None => "-".to_string(),
        })
        .collect();
    println!("Radial profile (inner rings): [{}]", rings.join(", "));

    Ok(())
}

/// Four square modules in a quadrant layout with a 4-pixel cross gap;
/// the right-hand quadrants are mounted rotated by 180 degrees.
fn quad_geometry(module_size: usize) -> Result<Arc<GeometryDescriptor>> {
    let size = module_size as f64;
    let gap = 4.0;
    let placements = vec![
        ModulePlacement::new(QuadPosition::new(0.0, 0.0), Orientation::R0),
        ModulePlacement::new(QuadPosition::new(size + gap, 0.0), Orientation::R180),
        ModulePlacement::new(QuadPosition::new(0.0, size + gap), Orientation::R0),
        ModulePlacement::new(QuadPosition::new(size + gap, size + gap), Orientation::R180),
    ];
    let geometry = GeometryDescriptor::new((module_size, module_size), 0.5e-3, placements)?;
    Ok(Arc::new(geometry))
}

/// Dark ~100, gain ~1, a sprinkling of masked pixels, saturation at the
/// 14-bit full well.
fn synthetic_calibration(
    geometry: &GeometryDescriptor,
    seed: u64,
) -> Result<CalibrationSet> {
    let shape = geometry.module_shape();
    let mut generator = Lcg::new(seed ^ 0xCA11_B8A7);
    let modules = (0..geometry.module_count())
        .map(|_| {
            let dark = Array2::from_shape_fn(shape, |_| 95.0 + 10.0 * generator.uniform());
            let gain = Array2::from_shape_fn(shape, |_| 0.9 + 0.2 * generator.uniform());
            let mask = Array2::from_shape_fn(shape, |_| generator.uniform() < 0.001);
            CorrectionConstants { dark, gain, mask }
        })
        .collect();
    Ok(CalibrationSet::new(1, 16_383.0, modules, geometry)?)
}

fn synthetic_train(
    geometry: &GeometryDescriptor,
    train_id: u64,
    pulses: usize,
    generator: &mut Lcg,
) -> Train {
    let shape = geometry.module_shape();
    let pulse_list = (0..pulses)
        .map(|index| {
            let tag = if index % 2 == 0 { PulseTag::On } else { PulseTag::Off };
            // pumped pulses carry extra signal on top of the pedestal
            let signal = match tag {
                PulseTag::On => 400.0,
                PulseTag::Off => 250.0,
            };
            let modules = (0..geometry.module_count())
                .map(|module| {
                    let data = Array2::from_shape_fn(shape, |_| {
                        100.0 + signal * generator.uniform()
                    });
                    ModulePanel::new(module, data)
                })
                .collect();
            Pulse::new(train_id * pulses as u64 + index as u64, tag, modules)
        })
        .collect();
    Train::with_pulses(train_id, pulse_list)
}

fn load_rois(path: Option<PathBuf>) -> Result<Vec<RoiDefinition>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text = fs::read_to_string(path)?;
    let rois: Vec<RoiDefinition> = serde_json::from_str(&text)?;
    for roi in &rois {
        roi.validate()?;
    }
    Ok(rois)
}

/// Small deterministic generator so replays are reproducible.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    /// Uniform value in [0, 1).
    fn uniform(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 40) as f32) / ((1u64 << 24) as f32)
    }
}
