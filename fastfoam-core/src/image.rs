//! Assembled full-detector images and the invalid-pixel sentinel.

use ndarray::Array2;

/// Sentinel marking pixels that carry no data: gaps between modules,
/// masked pixels, saturated input and zero-gain pixels.
///
/// The sentinel is a quiet NaN, but consumers must never rely on NaN
/// arithmetic propagation: every aggregation path gates on
/// [`AssembledImage::is_valid_value`] so that an upstream Inf is excluded
/// just like a masked pixel.
pub const INVALID: f32 = f32::NAN;

/// Full-detector 2D image produced by geometry assembly.
///
/// The shape is a deterministic function of the geometry descriptor and
/// is identical for every frame of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledImage {
    data: Array2<f32>,
}

impl AssembledImage {
    /// Wraps an already-assembled canvas.
    #[must_use]
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Creates a canvas of the given shape filled with the invalid sentinel.
    #[must_use]
    pub fn filled_invalid(shape: (usize, usize)) -> Self {
        Self {
            data: Array2::from_elem(shape, INVALID),
        }
    }

    /// True if the value carries data; false for the sentinel and any
    /// other non-finite value.
    #[inline]
    #[must_use]
    pub fn is_valid_value(value: f32) -> bool {
        value.is_finite()
    }

    /// Image shape as (rows, columns).
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Read access to the pixel canvas.
    #[must_use]
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Mutable access to the pixel canvas.
    pub fn data_mut(&mut self) -> &mut Array2<f32> {
        &mut self.data
    }

    /// Iterates over valid pixel values only.
    pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().copied().filter(|v| Self::is_valid_value(*v))
    }

    /// Number of valid pixels.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.valid_values().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sentinel_is_not_valid() {
        assert!(!AssembledImage::is_valid_value(INVALID));
        assert!(!AssembledImage::is_valid_value(f32::INFINITY));
        assert!(!AssembledImage::is_valid_value(f32::NEG_INFINITY));
        assert!(AssembledImage::is_valid_value(0.0));
        assert!(AssembledImage::is_valid_value(-3.5));
    }

    #[test]
    fn test_valid_iteration_skips_sentinel() {
        let image = AssembledImage::new(array![[1.0, INVALID], [INVALID, 4.0]]);
        let values: Vec<f32> = image.valid_values().collect();
        assert_eq!(values, vec![1.0, 4.0]);
        assert_eq!(image.valid_count(), 2);
    }

    #[test]
    fn test_filled_invalid_has_no_valid_pixels() {
        let image = AssembledImage::filled_invalid((4, 6));
        assert_eq!(image.shape(), (4, 6));
        assert_eq!(image.valid_count(), 0);
    }
}
