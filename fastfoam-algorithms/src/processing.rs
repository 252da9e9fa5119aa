//! Per-train pipeline: correction, assembly and statistics folding.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rayon::prelude::*;

use fastfoam_core::{
    AssembledImage, CalibrationSet, Error, GeometryDescriptor, Pulse, PulseTag, Result, Train,
};

use crate::assembler::ImageAssembler;
use crate::correction::correct_stack;
use crate::statistics::{AccumulatorCell, PumpProbeSnapshot, StatisticsConfig};

/// Pipeline configuration beyond geometry and calibration.
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfig {
    /// Statistics layout (ROIs, histogram).
    pub statistics: StatisticsConfig,
    /// Optional inclusive pulse-index window; pulses outside it are
    /// neither corrected nor counted.
    pub pulse_range: Option<(usize, usize)>,
}

/// Bookkeeping counters for one processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStatistics {
    /// Trains handed to `process_train`.
    pub trains: u64,
    /// Pulses that produced an assembled frame.
    pub pulses: u64,
    /// Frames dropped for per-frame errors.
    pub dropped_frames: u64,
}

/// Holder for the active calibration epoch.
///
/// Replacement is a whole-object swap behind an `RwLock<Arc<..>>`, so
/// workers never observe a torn set. A shape-invalid update is rejected,
/// the last-known-good constants stay active and the rejection is
/// reported once per epoch.
#[derive(Debug)]
pub struct CalibrationStore {
    geometry: Arc<GeometryDescriptor>,
    current: RwLock<Arc<CalibrationSet>>,
    last_rejected_epoch: Mutex<Option<u64>>,
}

impl CalibrationStore {
    /// Creates a store with validated initial constants.
    pub fn new(geometry: Arc<GeometryDescriptor>, initial: CalibrationSet) -> Result<Self> {
        check_against_geometry(&initial, &geometry)?;
        Ok(Self {
            geometry,
            current: RwLock::new(Arc::new(initial)),
            last_rejected_epoch: Mutex::new(None),
        })
    }

    /// The active calibration set.
    #[must_use]
    pub fn current(&self) -> Arc<CalibrationSet> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in a new epoch wholesale.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCalibration`] if the new set does not match the
    /// geometry; the previous constants remain active.
    pub fn replace(&self, next: CalibrationSet) -> Result<()> {
        if let Err(err) = check_against_geometry(&next, &self.geometry) {
            let mut last = self
                .last_rejected_epoch
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *last != Some(next.epoch()) {
                log::warn!(
                    "rejecting calibration epoch {}, keeping epoch {}: {err}",
                    next.epoch(),
                    self.current().epoch()
                );
                *last = Some(next.epoch());
            }
            return Err(err);
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(())
    }
}

fn check_against_geometry(set: &CalibrationSet, geometry: &GeometryDescriptor) -> Result<()> {
    if set.module_count() != geometry.module_count() {
        return Err(Error::InvalidCalibration(format!(
            "constants cover {} modules, geometry expects {}",
            set.module_count(),
            geometry.module_count()
        )));
    }
    let expected = geometry.module_shape();
    for module in 0..set.module_count() {
        let constants = set.module(module).ok_or_else(|| {
            Error::InvalidCalibration(format!("missing constants for module {module}"))
        })?;
        let actual = constants.dark.dim();
        if actual != expected {
            return Err(Error::InvalidCalibration(format!(
                "module {module} maps have shape {actual:?}, expected {expected:?}"
            )));
        }
    }
    Ok(())
}

/// Drives one detector's trains through correction, assembly and the
/// statistics accumulator.
///
/// Per-frame errors drop the offending frame and the run continues;
/// structural errors surface at construction. Assembled frames come back
/// in pulse arrival order even though per-pulse work is parallel.
pub struct TrainProcessor {
    assembler: ImageAssembler,
    calibration: CalibrationStore,
    accumulator: AccumulatorCell,
    pulse_range: Option<(usize, usize)>,
    counters: PipelineStatistics,
}

impl TrainProcessor {
    /// Builds the pipeline for one geometry and initial calibration.
    ///
    /// # Errors
    ///
    /// Structural configuration errors: invalid calibration shapes, ROI
    /// or histogram definitions.
    pub fn new(
        geometry: Arc<GeometryDescriptor>,
        calibration: CalibrationSet,
        config: ProcessorConfig,
    ) -> Result<Self> {
        let assembler = ImageAssembler::new(geometry.clone());
        let accumulator = AccumulatorCell::new(geometry.canvas_shape(), &config.statistics)?;
        let calibration = CalibrationStore::new(geometry, calibration)?;
        Ok(Self {
            assembler,
            calibration,
            accumulator,
            pulse_range: config.pulse_range,
            counters: PipelineStatistics::default(),
        })
    }

    /// Corrects, assembles and folds one train.
    ///
    /// Returns the assembled frames in pulse arrival order. Frames that
    /// fail with a per-frame error are skipped and counted in
    /// [`PipelineStatistics::dropped_frames`].
    pub fn process_train(&mut self, train: Train) -> Vec<AssembledImage> {
        let train_id = train.train_id;
        let calibration = self.calibration.current();

        let pulses: Vec<Pulse> = train
            .into_pulses()
            .into_iter()
            .enumerate()
            .filter(|(index, _)| match self.pulse_range {
                Some((first, last)) => *index >= first && *index <= last,
                None => true,
            })
            .map(|(_, pulse)| pulse)
            .collect();

        // parallel across pulses; indexed collect preserves arrival order
        let assembler = &self.assembler;
        let assembled: Vec<(u64, PulseTag, Result<AssembledImage>)> = pulses
            .into_par_iter()
            .map(|pulse| {
                let result = correct_stack(&pulse.modules, &calibration)
                    .and_then(|corrected| assembler.assemble(&corrected));
                (pulse.pulse_id, pulse.tag, result)
            })
            .collect();

        let mut frames = Vec::with_capacity(assembled.len());
        for (pulse_id, tag, result) in assembled {
            match result {
                Ok(frame) => {
                    // accumulator shape always matches the assembler canvas
                    if self.accumulator.update(&frame, pulse_id, tag).is_ok() {
                        self.counters.pulses += 1;
                        frames.push(frame);
                    }
                }
                Err(err) if err.is_frame_error() => {
                    self.counters.dropped_frames += 1;
                    log::warn!("dropping pulse {pulse_id} of train {train_id}: {err}");
                }
                Err(err) => {
                    // calibration/geometry faults also drop the frame but
                    // point at operator-level configuration
                    self.counters.dropped_frames += 1;
                    log::error!("pulse {pulse_id} of train {train_id} failed: {err}");
                }
            }
        }

        self.counters.trains += 1;
        frames
    }

    /// Immutable statistics snapshot.
    #[must_use]
    pub fn snapshot(&self) -> PumpProbeSnapshot {
        self.accumulator.snapshot()
    }

    /// Atomically discards accumulated statistics, e.g. on a run boundary
    /// or geometry change.
    pub fn reset(&self) {
        self.accumulator.reset();
    }

    /// Swaps in a new calibration epoch.
    pub fn replace_calibration(&self, next: CalibrationSet) -> Result<()> {
        self.calibration.replace(next)
    }

    /// Bookkeeping counters.
    #[must_use]
    pub fn statistics(&self) -> PipelineStatistics {
        self.counters
    }

    /// The assembler's canvas shape.
    #[must_use]
    pub fn canvas_shape(&self) -> (usize, usize) {
        self.assembler.canvas_shape()
    }
}
