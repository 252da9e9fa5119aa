//! Streaming statistical aggregation over assembled frames.
//!
//! All reductions are online with O(1) amortized memory per update:
//! per-pixel mean and variance use Welford's recurrence in f64, ROI
//! scalars are appended per pulse, and histograms have fixed edges. Two
//! accumulators over disjoint sample sets combine with the parallel
//! variance merge rule, which makes sharded accumulation equivalent to
//! sequential accumulation within floating tolerance.

use std::sync::{Mutex, PoisonError};

use ndarray::{Array2, Zip};

use fastfoam_core::{AssembledImage, Error, PulseTag, Result};

use crate::histogram::{Histogram, HistogramConfig};
use crate::roi::{RoiDefinition, RoiReduction};

/// Statistics configuration supplied once per run.
#[derive(Debug, Clone, Default)]
pub struct StatisticsConfig {
    /// Regions reduced to per-pulse scalars.
    pub rois: Vec<RoiDefinition>,
    /// Optional pixel-value histogram.
    pub histogram: Option<HistogramConfig>,
}

/// One entry of an ROI scalar series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiSample {
    /// Pulse the sample belongs to.
    pub pulse_id: u64,
    /// Reduction result; `None` when the region held no valid pixel.
    pub value: Option<RoiReduction>,
}

/// Online accumulator for one tag stream.
///
/// Updates require `&mut self`, so concurrent unsynchronized mutation is
/// impossible by construction; shard per worker and [`merge`] before
/// taking a snapshot, or serialize updates through an
/// [`AccumulatorCell`].
///
/// [`merge`]: RunningStatistics::merge
#[derive(Debug, Clone)]
pub struct RunningStatistics {
    shape: (usize, usize),
    count: Array2<u32>,
    mean: Array2<f64>,
    m2: Array2<f64>,
    frames: u64,
    rois: Vec<RoiDefinition>,
    roi_series: Vec<Vec<RoiSample>>,
    histogram: Option<Histogram>,
}

impl RunningStatistics {
    /// Creates an empty accumulator for images of the given shape.
    pub fn new(shape: (usize, usize), config: &StatisticsConfig) -> Result<Self> {
        for roi in &config.rois {
            roi.validate()?;
        }
        let histogram = match &config.histogram {
            Some(hist_config) => Some(Histogram::from_config(hist_config)?),
            None => None,
        };
        Ok(Self {
            shape,
            count: Array2::zeros(shape),
            mean: Array2::zeros(shape),
            m2: Array2::zeros(shape),
            frames: 0,
            rois: config.rois.clone(),
            roi_series: vec![Vec::new(); config.rois.len()],
            histogram,
        })
    }

    /// Folds one frame into the accumulator.
    ///
    /// Invalid pixels are excluded from every aggregate's denominator,
    /// never treated as zero.
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] if the frame shape differs from the
    /// accumulator's; the accumulator is left untouched.
    pub fn update(&mut self, frame: &AssembledImage, pulse_id: u64) -> Result<()> {
        if frame.shape() != self.shape {
            return Err(Error::ShapeMismatch {
                module: 0,
                expected: self.shape,
                actual: frame.shape(),
            });
        }

        Zip::from(&mut self.count)
            .and(&mut self.mean)
            .and(&mut self.m2)
            .and(frame.data())
            .for_each(|count, mean, m2, &value| {
                if AssembledImage::is_valid_value(value) {
                    *count += 1;
                    let x = f64::from(value);
                    let delta = x - *mean;
                    *mean += delta / f64::from(*count);
                    *m2 += delta * (x - *mean);
                }
            });

        for (roi, series) in self.rois.iter().zip(&mut self.roi_series) {
            series.push(RoiSample {
                pulse_id,
                value: roi.reduce(frame),
            });
        }

        if let Some(histogram) = &mut self.histogram {
            histogram.record_all(frame.valid_values().map(f64::from));
        }

        self.frames += 1;
        Ok(())
    }

    /// Number of frames folded in.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Combines another accumulator covering a disjoint sample set into
    /// this one, using the parallel variance merge rule. The result
    /// matches sequential accumulation of the concatenated stream within
    /// floating tolerance.
    ///
    /// # Errors
    ///
    /// [`Error::MergeMismatch`] unless shapes, ROI sets and histogram
    /// edges all agree.
    pub fn merge(&mut self, other: &RunningStatistics) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::MergeMismatch(format!(
                "image shapes differ: {:?} vs {:?}",
                self.shape, other.shape
            )));
        }
        if self.rois != other.rois {
            return Err(Error::MergeMismatch("ROI definitions differ".into()));
        }

        match (&mut self.histogram, &other.histogram) {
            (None, None) => {}
            (Some(mine), Some(theirs)) => mine.merge(theirs)?,
            _ => {
                return Err(Error::MergeMismatch(
                    "histogram present on one side only".into(),
                ))
            }
        }

        Zip::from(&mut self.count)
            .and(&mut self.mean)
            .and(&mut self.m2)
            .and(&other.count)
            .and(&other.mean)
            .and(&other.m2)
            .for_each(|count_a, mean_a, m2_a, &count_b, &mean_b, &m2_b| {
                if count_b == 0 {
                    return;
                }
                if *count_a == 0 {
                    *count_a = count_b;
                    *mean_a = mean_b;
                    *m2_a = m2_b;
                    return;
                }
                let na = f64::from(*count_a);
                let nb = f64::from(count_b);
                let n = na + nb;
                let delta = mean_b - *mean_a;
                *mean_a += delta * nb / n;
                *m2_a += m2_b + delta * delta * na * nb / n;
                *count_a += count_b;
            });

        for (mine, theirs) in self.roi_series.iter_mut().zip(&other.roi_series) {
            mine.extend_from_slice(theirs);
            mine.sort_unstable_by_key(|sample| sample.pulse_id);
        }

        self.frames += other.frames;
        Ok(())
    }

    /// Immutable copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let mean = Zip::from(&self.mean)
            .and(&self.count)
            .map_collect(|&mean, &count| if count == 0 { f64::NAN } else { mean });
        let variance = Zip::from(&self.m2)
            .and(&self.count)
            .map_collect(|&m2, &count| {
                if count < 2 {
                    f64::NAN
                } else {
                    m2 / f64::from(count - 1)
                }
            });

        StatisticsSnapshot {
            frames: self.frames,
            count: self.count.clone(),
            mean,
            variance,
            rois: self
                .rois
                .iter()
                .zip(&self.roi_series)
                .map(|(roi, series)| RoiSeriesSnapshot {
                    label: roi.label.clone(),
                    samples: series.clone(),
                })
                .collect(),
            histogram: self.histogram.clone(),
        }
    }
}

/// ROI scalar series for one region.
#[derive(Debug, Clone)]
pub struct RoiSeriesSnapshot {
    /// Region label from the definition.
    pub label: String,
    /// Per-pulse samples in accumulation order.
    pub samples: Vec<RoiSample>,
}

/// Immutable statistics snapshot handed to the presentation layer.
///
/// `mean` is NaN where no sample landed, `variance` additionally where
/// fewer than two samples landed; both mirror the image sentinel
/// convention. `variance` is the sample variance (n - 1 denominator).
#[derive(Debug, Clone)]
pub struct StatisticsSnapshot {
    /// Frames folded in.
    pub frames: u64,
    /// Per-pixel valid-sample count.
    pub count: Array2<u32>,
    /// Per-pixel running mean.
    pub mean: Array2<f64>,
    /// Per-pixel sample variance.
    pub variance: Array2<f64>,
    /// One series per configured region.
    pub rois: Vec<RoiSeriesSnapshot>,
    /// Histogram state, if configured.
    pub histogram: Option<Histogram>,
}

/// Pump-probe accumulator pair: tagged pulses go to independent on/off
/// accumulators and the streams are only ever combined at query time.
#[derive(Debug, Clone)]
pub struct PumpProbeAccumulator {
    on: RunningStatistics,
    off: RunningStatistics,
}

impl PumpProbeAccumulator {
    /// Creates both accumulators from a shared configuration.
    pub fn new(shape: (usize, usize), config: &StatisticsConfig) -> Result<Self> {
        Ok(Self {
            on: RunningStatistics::new(shape, config)?,
            off: RunningStatistics::new(shape, config)?,
        })
    }

    /// Routes one frame to the accumulator matching its tag.
    pub fn update(&mut self, frame: &AssembledImage, pulse_id: u64, tag: PulseTag) -> Result<()> {
        match tag {
            PulseTag::On => self.on.update(frame, pulse_id),
            PulseTag::Off => self.off.update(frame, pulse_id),
        }
    }

    /// Merges another pair shard-wise.
    pub fn merge(&mut self, other: &PumpProbeAccumulator) -> Result<()> {
        self.on.merge(&other.on)?;
        self.off.merge(&other.off)
    }

    /// Immutable snapshot of both streams.
    #[must_use]
    pub fn snapshot(&self) -> PumpProbeSnapshot {
        PumpProbeSnapshot {
            on: self.on.snapshot(),
            off: self.off.snapshot(),
        }
    }
}

/// Snapshot pair for pump-probe queries.
#[derive(Debug, Clone)]
pub struct PumpProbeSnapshot {
    /// Pumped stream.
    pub on: StatisticsSnapshot,
    /// Unpumped stream.
    pub off: StatisticsSnapshot,
}

impl PumpProbeSnapshot {
    /// On-minus-off mean difference image, valid only where both streams
    /// collected samples.
    #[must_use]
    pub fn difference(&self) -> Array2<f64> {
        Zip::from(&self.on.mean)
            .and(&self.on.count)
            .and(&self.off.mean)
            .and(&self.off.count)
            .map_collect(|&mean_on, &count_on, &mean_off, &count_off| {
                if count_on == 0 || count_off == 0 {
                    f64::NAN
                } else {
                    mean_on - mean_off
                }
            })
    }
}

/// Shared accumulator slot with atomic reset.
///
/// `reset` replaces the accumulator wholesale with a fresh clone of the
/// empty prototype built at construction; a concurrent `snapshot`
/// observes either the fully-old or the fully-new accumulator, never a
/// mixture. An in-flight `update` serialized behind the same lock either
/// completes against the old state or runs entirely after the swap.
#[derive(Debug)]
pub struct AccumulatorCell {
    prototype: PumpProbeAccumulator,
    slot: Mutex<PumpProbeAccumulator>,
}

impl AccumulatorCell {
    /// Creates the cell and its empty prototype.
    pub fn new(shape: (usize, usize), config: &StatisticsConfig) -> Result<Self> {
        let prototype = PumpProbeAccumulator::new(shape, config)?;
        Ok(Self {
            slot: Mutex::new(prototype.clone()),
            prototype,
        })
    }

    /// Folds one frame into the current accumulator.
    pub fn update(&self, frame: &AssembledImage, pulse_id: u64, tag: PulseTag) -> Result<()> {
        self.lock().update(frame, pulse_id, tag)
    }

    /// Snapshot of the current accumulator.
    #[must_use]
    pub fn snapshot(&self) -> PumpProbeSnapshot {
        self.lock().snapshot()
    }

    /// Atomically replaces the accumulator with a fresh one.
    pub fn reset(&self) {
        *self.lock() = self.prototype.clone();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PumpProbeAccumulator> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
