//! Radial intensity profiles.
//!
//! Reduces an assembled image to mean intensity binned by integer radius
//! about a configured centre, the classic isotropic-scattering summary.
//! Invalid pixels are excluded per bin; bins that collect no valid pixel
//! report a zero count rather than a fabricated mean.

use fastfoam_core::AssembledImage;

/// Mean intensity per integer radius ring.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialProfile {
    sums: Vec<f64>,
    counts: Vec<u64>,
}

impl RadialProfile {
    /// Number of rings covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True if no ring was covered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of valid pixels in ring `radius`.
    #[must_use]
    pub fn count(&self, radius: usize) -> u64 {
        self.counts.get(radius).copied().unwrap_or(0)
    }

    /// Mean intensity of ring `radius`, `None` when the ring collected
    /// no valid pixel.
    #[must_use]
    pub fn mean(&self, radius: usize) -> Option<f64> {
        let count = self.count(radius);
        if count == 0 {
            None
        } else {
            Some(self.sums[radius] / count as f64)
        }
    }

    /// Means for all rings, in radius order.
    #[must_use]
    pub fn means(&self) -> Vec<Option<f64>> {
        (0..self.len()).map(|r| self.mean(r)).collect()
    }
}

/// Computes the radial profile of one frame about `centre` = (x, y) in
/// pixel units.
#[must_use]
pub fn radial_profile(image: &AssembledImage, centre: (f64, f64)) -> RadialProfile {
    let (rows, cols) = image.shape();
    let (cx, cy) = centre;

    // largest possible integer radius bounds the bin vectors
    let corners = [
        (0.0, 0.0),
        (cols as f64, 0.0),
        (0.0, rows as f64),
        (cols as f64, rows as f64),
    ];
    let max_radius = corners
        .iter()
        .map(|(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
        .fold(0.0f64, f64::max)
        .ceil() as usize;

    let mut sums = vec![0.0f64; max_radius + 1];
    let mut counts = vec![0u64; max_radius + 1];

    for ((row, col), &value) in image.data().indexed_iter() {
        if !AssembledImage::is_valid_value(value) {
            continue;
        }
        let dx = col as f64 + 0.5 - cx;
        let dy = row as f64 + 0.5 - cy;
        let radius = (dx * dx + dy * dy).sqrt() as usize;
        sums[radius] += f64::from(value);
        counts[radius] += 1;
    }

    RadialProfile { sums, counts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fastfoam_core::INVALID;
    use ndarray::Array2;

    #[test]
    fn test_uniform_image_has_flat_profile() {
        let image = AssembledImage::new(Array2::from_elem((8, 8), 3.0));
        let profile = radial_profile(&image, (4.0, 4.0));
        for radius in 0..profile.len() {
            if let Some(mean) = profile.mean(radius) {
                assert_relative_eq!(mean, 3.0, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_ring_signal_lands_in_its_bin() {
        let mut data = Array2::zeros((16, 16));
        let centre = (8.0, 8.0);
        // paint a ring of radius ~5 with a strong signal
        for ((row, col), value) in data.indexed_iter_mut() {
            let dx = col as f64 + 0.5 - centre.0;
            let dy = row as f64 + 0.5 - centre.1;
            let r = (dx * dx + dy * dy).sqrt();
            if (r as usize) == 5 {
                *value = 100.0;
            }
        }
        let image = AssembledImage::new(data);
        let profile = radial_profile(&image, centre);
        assert_relative_eq!(profile.mean(5).unwrap(), 100.0, max_relative = 1e-12);
        assert_relative_eq!(profile.mean(2).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_pixels_do_not_dilute_rings() {
        let mut data = Array2::from_elem((4, 4), 2.0);
        data[[0, 0]] = INVALID;
        let image = AssembledImage::new(data);
        let profile = radial_profile(&image, (2.0, 2.0));
        for radius in 0..profile.len() {
            if let Some(mean) = profile.mean(radius) {
                assert_relative_eq!(mean, 2.0, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_empty_ring_reports_no_data() {
        let image = AssembledImage::new(Array2::from_elem((2, 2), 1.0));
        let profile = radial_profile(&image, (1.0, 1.0));
        // rings past the image corners collect nothing
        let last = profile.len() - 1;
        assert_eq!(profile.count(last), 0);
        assert!(profile.mean(last).is_none());
    }
}
