//! Error types for fastfoam-core.

use thiserror::Error;

/// Result type alias for fastfoam operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for fastfoam operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Module pixel array has an unexpected shape.
    #[error("shape mismatch for module {module}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        module: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Wrong number of modules handed to the assembler.
    #[error("module count mismatch: expected {expected}, got {actual}")]
    ModuleCountMismatch { expected: usize, actual: usize },

    /// Geometry descriptor is internally inconsistent.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Calibration constants rejected.
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    /// Region-of-interest definition rejected.
    #[error("invalid ROI `{label}`: {reason}")]
    InvalidRoi { label: String, reason: String },

    /// Histogram edge configuration rejected.
    #[error("invalid histogram edges: {0}")]
    InvalidHistogram(String),

    /// Two accumulators cannot be merged.
    #[error("accumulator merge mismatch: {0}")]
    MergeMismatch(String),
}

impl Error {
    /// True for per-frame errors that drop the offending frame while the
    /// run continues; false for structural errors that require operator
    /// intervention.
    #[must_use]
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Error::ShapeMismatch { .. } | Error::ModuleCountMismatch { .. }
        )
    }
}
