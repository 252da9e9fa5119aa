//! Raw and corrected per-module pixel panels.

use ndarray::Array2;

/// Pixel array for one detector module, tagged with its module index.
///
/// Raw panels are owned by the train data model for the duration of one
/// train and are immutable once ingested; correction produces a fresh
/// panel rather than mutating the raw one. Values are f32 throughout —
/// upstream decoding casts integer counts before handing data over.
#[derive(Debug, Clone, PartialEq)]
pub struct ModulePanel {
    module: usize,
    data: Array2<f32>,
}

impl ModulePanel {
    /// Creates a panel for the given module index.
    #[must_use]
    pub fn new(module: usize, data: Array2<f32>) -> Self {
        Self { module, data }
    }

    /// Module index within the detector.
    #[must_use]
    pub fn module(&self) -> usize {
        self.module
    }

    /// Panel shape as (rows, columns).
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Read access to the pixel data.
    #[must_use]
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Consumes the panel, returning the pixel data.
    #[must_use]
    pub fn into_data(self) -> Array2<f32> {
        self.data
    }
}
