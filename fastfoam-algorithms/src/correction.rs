//! Per-pixel dark/gain/mask correction kernels.
//!
//! The per-pixel order of operations is fixed: saturated raw values are
//! flagged invalid before any arithmetic, then the dark offset is
//! subtracted, then the result is divided by the gain (pixels with gain
//! at or below [`GAIN_EPSILON`] become invalid instead), and finally the
//! mask is applied unconditionally. Every invalid outcome is the shared
//! sentinel from `fastfoam-core`, so downstream aggregation needs a
//! single validity predicate.

use ndarray::Zip;
use rayon::prelude::*;

use fastfoam_core::{CalibrationSet, CorrectionConstants, Error, ModulePanel, Result, INVALID};

/// Gains at or below this value are treated as zero; the pixel is
/// flagged invalid rather than divided.
pub const GAIN_EPSILON: f32 = 1e-6;

/// Corrects one module panel, producing a fresh floating-point panel.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the panel shape differs from the
/// constants' shape. The raw panel is never mutated.
pub fn correct_panel(
    raw: &ModulePanel,
    constants: &CorrectionConstants,
    saturation: f32,
) -> Result<ModulePanel> {
    let expected = constants.dark.dim();
    if raw.shape() != expected {
        return Err(Error::ShapeMismatch {
            module: raw.module(),
            expected,
            actual: raw.shape(),
        });
    }

    let corrected = Zip::from(raw.data())
        .and(&constants.dark)
        .and(&constants.gain)
        .and(&constants.mask)
        .map_collect(|&value, &dark, &gain, &masked| {
            if masked || value >= saturation {
                INVALID
            } else if gain <= GAIN_EPSILON {
                INVALID
            } else {
                (value - dark) / gain
            }
        });

    Ok(ModulePanel::new(raw.module(), corrected))
}

/// Corrects a full module stack in parallel.
///
/// Modules are independent, so the work is fanned out across the rayon
/// pool; the returned stack preserves input order and is complete before
/// this function returns, which is the join barrier assembly relies on.
///
/// # Errors
///
/// Fails if any module fails. A panel whose module index is not covered
/// by the calibration set yields [`Error::ModuleCountMismatch`].
pub fn correct_stack(raw: &[ModulePanel], calibration: &CalibrationSet) -> Result<Vec<ModulePanel>> {
    raw.par_iter()
        .map(|panel| {
            let constants = calibration.module(panel.module()).ok_or_else(|| {
                Error::ModuleCountMismatch {
                    expected: calibration.module_count(),
                    actual: panel.module() + 1,
                }
            })?;
            correct_panel(panel, constants, calibration.saturation())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastfoam_core::{AssembledImage, GeometryDescriptor};
    use ndarray::array;

    #[test]
    fn test_identity_correction_is_exact() {
        let raw = ModulePanel::new(0, array![[1.5, -2.0], [0.0, 1234.0]]);
        let constants = CorrectionConstants::identity((2, 2));
        let corrected = correct_panel(&raw, &constants, f32::INFINITY).unwrap();
        assert_eq!(corrected.data(), raw.data());
    }

    #[test]
    fn test_dark_and_gain_order() {
        let raw = ModulePanel::new(0, array![[10.0]]);
        let constants = CorrectionConstants {
            dark: array![[4.0]],
            gain: array![[2.0]],
            mask: array![[false]],
        };
        let corrected = correct_panel(&raw, &constants, f32::INFINITY).unwrap();
        // (10 - 4) / 2, not 10 / 2 - 4
        assert_eq!(corrected.data()[[0, 0]], 3.0);
    }

    #[test]
    fn test_zero_gain_flags_invalid() {
        let raw = ModulePanel::new(0, array![[10.0, 10.0]]);
        let constants = CorrectionConstants {
            dark: array![[0.0, 0.0]],
            gain: array![[0.0, 1.0]],
            mask: array![[false, false]],
        };
        let corrected = correct_panel(&raw, &constants, f32::INFINITY).unwrap();
        assert!(!AssembledImage::is_valid_value(corrected.data()[[0, 0]]));
        assert_eq!(corrected.data()[[0, 1]], 10.0);
    }

    #[test]
    fn test_saturation_is_checked_before_correction() {
        let raw = ModulePanel::new(0, array![[100.0, 99.0]]);
        let constants = CorrectionConstants {
            // dark subtraction would pull the saturated value below threshold
            dark: array![[50.0, 50.0]],
            gain: array![[1.0, 1.0]],
            mask: array![[false, false]],
        };
        let corrected = correct_panel(&raw, &constants, 100.0).unwrap();
        assert!(!AssembledImage::is_valid_value(corrected.data()[[0, 0]]));
        assert_eq!(corrected.data()[[0, 1]], 49.0);
    }

    #[test]
    fn test_mask_overrides_computed_value() {
        let raw = ModulePanel::new(0, array![[7.0]]);
        let constants = CorrectionConstants {
            dark: array![[0.0]],
            gain: array![[1.0]],
            mask: array![[true]],
        };
        let corrected = correct_panel(&raw, &constants, f32::INFINITY).unwrap();
        assert!(!AssembledImage::is_valid_value(corrected.data()[[0, 0]]));
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let raw = ModulePanel::new(5, array![[1.0, 2.0]]);
        let constants = CorrectionConstants::identity((2, 2));
        let err = correct_panel(&raw, &constants, f32::INFINITY).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { module: 5, .. }));
    }

    #[test]
    fn test_stack_correction_preserves_order() {
        let geom = GeometryDescriptor::new(
            (1, 1),
            0.5e-3,
            vec![
                fastfoam_core::ModulePlacement::new(
                    fastfoam_core::QuadPosition::new(0.0, 0.0),
                    fastfoam_core::Orientation::R0,
                ),
                fastfoam_core::ModulePlacement::new(
                    fastfoam_core::QuadPosition::new(1.0, 0.0),
                    fastfoam_core::Orientation::R0,
                ),
            ],
        )
        .unwrap();
        let calibration = CalibrationSet::identity(0, &geom);
        let raw = vec![
            ModulePanel::new(0, array![[1.0]]),
            ModulePanel::new(1, array![[2.0]]),
        ];
        let corrected = correct_stack(&raw, &calibration).unwrap();
        assert_eq!(corrected[0].module(), 0);
        assert_eq!(corrected[1].module(), 1);
        assert_eq!(corrected[1].data()[[0, 0]], 2.0);
    }
}
