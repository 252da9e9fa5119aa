//! Train and pulse containers.

use crate::ModulePanel;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pump-probe tag carried by every pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PulseTag {
    /// Pumped (laser on) pulse.
    On,
    /// Unpumped (laser off) pulse.
    Off,
}

/// One frame within a train: a full stack of module panels plus metadata.
#[derive(Debug, Clone)]
pub struct Pulse {
    /// Pulse identifier, unique within the run.
    pub pulse_id: u64,
    /// Pump-probe tag.
    pub tag: PulseTag,
    /// One panel per detector module, ordered by module index.
    pub modules: Vec<ModulePanel>,
}

impl Pulse {
    /// Creates a pulse from a module stack.
    #[must_use]
    pub fn new(pulse_id: u64, tag: PulseTag, modules: Vec<ModulePanel>) -> Self {
        Self {
            pulse_id,
            tag,
            modules,
        }
    }
}

/// One burst of pulses delivered together from the detector.
///
/// Created fresh when a burst arrives and dropped once its pulses have
/// been corrected, assembled and folded into statistics, which bounds the
/// pipeline's memory footprint independent of run length.
#[derive(Debug, Clone, Default)]
pub struct Train {
    /// Train identifier from the timing system.
    pub train_id: u64,
    pulses: Vec<Pulse>,
}

impl Train {
    /// Creates an empty train.
    #[must_use]
    pub fn new(train_id: u64) -> Self {
        Self {
            train_id,
            pulses: Vec::new(),
        }
    }

    /// Creates a train from pulses already in arrival order.
    #[must_use]
    pub fn with_pulses(train_id: u64, pulses: Vec<Pulse>) -> Self {
        Self { train_id, pulses }
    }

    /// Appends a pulse; arrival order is the append order.
    pub fn push(&mut self, pulse: Pulse) {
        self.pulses.push(pulse);
    }

    /// Number of pulses in the train.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    /// True if the train carries no pulses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    /// Iterates over pulses in arrival order.
    pub fn pulses(&self) -> impl Iterator<Item = &Pulse> {
        self.pulses.iter()
    }

    /// Consumes the train, yielding pulses in arrival order.
    #[must_use]
    pub fn into_pulses(self) -> Vec<Pulse> {
        self.pulses
    }
}
