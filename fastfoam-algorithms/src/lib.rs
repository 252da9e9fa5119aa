//! fastfoam-algorithms: numeric kernels for detector train processing.
//!
//! Builds on the `fastfoam-core` data model with three layers:
//! per-pixel correction kernels, the cached-placement geometry
//! assembler, and the streaming statistics accumulator (Welford
//! mean/variance images, ROI series, histograms, radial profiles).
//! The [`processing`] module wires them into a per-train pipeline.
//!

pub mod assembler;
pub mod correction;
pub mod histogram;
pub mod processing;
pub mod radial;
pub mod roi;
pub mod statistics;

pub use assembler::ImageAssembler;
pub use correction::{correct_panel, correct_stack, GAIN_EPSILON};
pub use histogram::{Histogram, HistogramConfig};
pub use processing::{CalibrationStore, PipelineStatistics, ProcessorConfig, TrainProcessor};
pub use radial::{radial_profile, RadialProfile};
pub use roi::{RoiDefinition, RoiReduction, RoiShape};
pub use statistics::{
    AccumulatorCell, PumpProbeAccumulator, PumpProbeSnapshot, RoiSample, RunningStatistics,
    StatisticsConfig, StatisticsSnapshot,
};
