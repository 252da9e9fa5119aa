//! Per-module correction constants.

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::geometry::GeometryDescriptor;

/// Dark offset, gain map and pixel mask for one module.
///
/// All three maps share the module shape; `mask` is `true` for pixels
/// that must be excluded regardless of their corrected value. Constants
/// are never mutated in place — a new calibration epoch replaces the
/// whole [`CalibrationSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionConstants {
    /// Dark offset map, subtracted from raw counts.
    pub dark: Array2<f32>,
    /// Gain map, divides the dark-subtracted value.
    pub gain: Array2<f32>,
    /// Pixel mask; `true` marks a pixel invalid.
    pub mask: Array2<bool>,
}

impl CorrectionConstants {
    /// Constants that leave data untouched: zero dark, unit gain, empty mask.
    #[must_use]
    pub fn identity(shape: (usize, usize)) -> Self {
        Self {
            dark: Array2::zeros(shape),
            gain: Array2::ones(shape),
            mask: Array2::from_elem(shape, false),
        }
    }

    fn check_shape(&self, module: usize, expected: (usize, usize)) -> Result<()> {
        for (name, actual) in [
            ("dark", self.dark.dim()),
            ("gain", self.gain.dim()),
            ("mask", self.mask.dim()),
        ] {
            if actual != expected {
                return Err(Error::InvalidCalibration(format!(
                    "{name} map for module {module} has shape {actual:?}, expected {expected:?}"
                )));
            }
        }
        Ok(())
    }
}

/// One calibration epoch: constants for every module plus the detector
/// saturation threshold.
///
/// Shared read-only across all worker threads for the lifetime of the
/// epoch; replaced wholesale, never field-by-field.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSet {
    epoch: u64,
    saturation: f32,
    modules: Vec<CorrectionConstants>,
}

impl CalibrationSet {
    /// Builds a set, checking every module's maps against the geometry's
    /// module shape and count.
    pub fn new(
        epoch: u64,
        saturation: f32,
        modules: Vec<CorrectionConstants>,
        geometry: &GeometryDescriptor,
    ) -> Result<Self> {
        if modules.len() != geometry.module_count() {
            return Err(Error::InvalidCalibration(format!(
                "constants for {} modules, geometry expects {}",
                modules.len(),
                geometry.module_count()
            )));
        }
        if saturation.is_nan() {
            return Err(Error::InvalidCalibration(
                "saturation threshold is NaN".into(),
            ));
        }
        for (module, constants) in modules.iter().enumerate() {
            constants.check_shape(module, geometry.module_shape())?;
        }
        Ok(Self {
            epoch,
            saturation,
            modules,
        })
    }

    /// Identity constants for every module, no saturation cut-off.
    #[must_use]
    pub fn identity(epoch: u64, geometry: &GeometryDescriptor) -> Self {
        Self {
            epoch,
            saturation: f32::INFINITY,
            modules: (0..geometry.module_count())
                .map(|_| CorrectionConstants::identity(geometry.module_shape()))
                .collect(),
        }
    }

    /// Calibration epoch counter.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Raw values at or above this threshold are flagged invalid before
    /// any correction math.
    #[must_use]
    pub fn saturation(&self) -> f32 {
        self.saturation
    }

    /// Number of modules covered.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Constants for one module.
    #[must_use]
    pub fn module(&self, module: usize) -> Option<&CorrectionConstants> {
        self.modules.get(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryDescriptor;

    fn geometry() -> GeometryDescriptor {
        GeometryDescriptor::single_module((4, 6), 0.5e-3).unwrap()
    }

    #[test]
    fn test_identity_constants_match_geometry() {
        let geom = geometry();
        let set = CalibrationSet::identity(1, &geom);
        assert_eq!(set.module_count(), 1);
        assert_eq!(set.module(0).unwrap().dark.dim(), (4, 6));
        assert!(set.saturation().is_infinite());
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let geom = geometry();
        let constants = CorrectionConstants::identity((4, 5));
        let err = CalibrationSet::new(2, 1e4, vec![constants], &geom).unwrap_err();
        assert!(matches!(err, Error::InvalidCalibration(_)));
    }

    #[test]
    fn test_wrong_module_count_is_rejected() {
        let geom = geometry();
        let err = CalibrationSet::new(2, 1e4, Vec::new(), &geom).unwrap_err();
        assert!(matches!(err, Error::InvalidCalibration(_)));
    }
}
