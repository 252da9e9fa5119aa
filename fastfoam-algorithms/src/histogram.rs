//! Fixed-edge streaming histograms.
//!
//! Bin edges are set at construction and never change during
//! accumulation. Bins are right-open `[e_i, e_i+1)` with the final edge
//! inclusive. Samples outside the configured range are dropped, never
//! clipped into the boundary bins; the drop is deterministic and tallied
//! in [`Histogram::rejected`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use fastfoam_core::{Error, Result};

/// Histogram definition supplied once per run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistogramConfig {
    /// Ordered bin edges; `n` edges define `n - 1` bins.
    pub edges: Vec<f64>,
}

/// Streaming histogram with fixed edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    edges: Vec<f64>,
    counts: Vec<u64>,
    rejected: u64,
}

impl Histogram {
    /// Builds a histogram from its edge sequence.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHistogram`] unless there are at least two finite,
    /// strictly increasing edges.
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::InvalidHistogram(format!(
                "need at least 2 edges, got {}",
                edges.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(Error::InvalidHistogram("edges must be finite".into()));
        }
        if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::InvalidHistogram(
                "edges must be strictly increasing".into(),
            ));
        }
        let bins = edges.len() - 1;
        Ok(Self {
            edges,
            counts: vec![0; bins],
            rejected: 0,
        })
    }

    /// Builds from a configuration value.
    pub fn from_config(config: &HistogramConfig) -> Result<Self> {
        Self::new(config.edges.clone())
    }

    /// Records one sample. Non-finite samples are ignored entirely;
    /// finite samples outside the edge range are counted as rejected.
    pub fn record(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let last = self.edges[self.edges.len() - 1];
        if value < self.edges[0] || value > last {
            self.rejected += 1;
            return;
        }
        // index of the right-open bin; the final edge falls into the last bin
        let mut index = self.edges.partition_point(|&e| e <= value) - 1;
        if index == self.counts.len() {
            index -= 1;
        }
        self.counts[index] += 1;
    }

    /// Records every sample of an iterator.
    pub fn record_all<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        for value in values {
            self.record(value);
        }
    }

    /// Bin edges.
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Per-bin counts.
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Number of finite samples dropped for falling outside the edges.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Total number of binned samples.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Folds another histogram into this one.
    ///
    /// # Errors
    ///
    /// [`Error::MergeMismatch`] unless both histograms share identical
    /// edges.
    pub fn merge(&mut self, other: &Histogram) -> Result<()> {
        if self.edges != other.edges {
            return Err(Error::MergeMismatch(
                "histogram edges differ".into(),
            ));
        }
        for (mine, theirs) in self.counts.iter_mut().zip(&other.counts) {
            *mine += theirs;
        }
        self.rejected += other.rejected;
        Ok(())
    }
}
