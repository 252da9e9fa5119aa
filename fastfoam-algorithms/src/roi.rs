//! Region-of-interest definitions and reductions.
//!
//! ROI definitions are structured configuration values with enumerated
//! recognized fields, validated when constructed — not when first used
//! against an image. Reductions run over valid pixels only; a region
//! with no valid pixels yields an explicit "no data" result rather than
//! zero.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use fastfoam_core::{AssembledImage, Error, Result};

/// Geometric shape of a region of interest, in image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "shape", rename_all = "lowercase"))]
pub enum RoiShape {
    /// Axis-aligned rectangle; `x`/`y` are the top-left corner.
    Rectangle {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    /// Simple polygon given by its vertices as (x, y) pairs; containment
    /// uses even-odd ray crossing against pixel centres.
    Polygon { vertices: Vec<(f64, f64)> },
}

/// A labelled, validated region of interest.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoiDefinition {
    /// Identifier used in statistics output.
    pub label: String,
    /// Region geometry.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub shape: RoiShape,
}

/// Scalar reduction of one region over one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiReduction {
    /// Sum over valid pixels.
    pub sum: f64,
    /// Mean over valid pixels.
    pub mean: f64,
    /// Number of valid pixels that contributed.
    pub count: usize,
}

impl RoiDefinition {
    /// Builds and validates a definition.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRoi`] for zero-area rectangles, polygons with
    /// fewer than three vertices, or non-finite vertex coordinates.
    pub fn new(label: impl Into<String>, shape: RoiShape) -> Result<Self> {
        let definition = Self {
            label: label.into(),
            shape,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Re-validates a definition, e.g. after deserialization.
    pub fn validate(&self) -> Result<()> {
        match &self.shape {
            RoiShape::Rectangle { width, height, .. } => {
                if *width == 0 || *height == 0 {
                    return Err(Error::InvalidRoi {
                        label: self.label.clone(),
                        reason: "rectangle has zero area".into(),
                    });
                }
            }
            RoiShape::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(Error::InvalidRoi {
                        label: self.label.clone(),
                        reason: format!("polygon needs >= 3 vertices, got {}", vertices.len()),
                    });
                }
                if vertices
                    .iter()
                    .any(|(x, y)| !(x.is_finite() && y.is_finite()))
                {
                    return Err(Error::InvalidRoi {
                        label: self.label.clone(),
                        reason: "polygon vertex is not finite".into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Reduces the region over one frame, returning `None` when no valid
    /// pixel lies inside it.
    #[must_use]
    pub fn reduce(&self, image: &AssembledImage) -> Option<RoiReduction> {
        let (rows, cols) = image.shape();
        let mut sum = 0.0f64;
        let mut count = 0usize;

        let mut fold = |row: usize, col: usize| {
            let value = image.data()[[row, col]];
            if AssembledImage::is_valid_value(value) {
                sum += f64::from(value);
                count += 1;
            }
        };

        match &self.shape {
            RoiShape::Rectangle {
                x,
                y,
                width,
                height,
            } => {
                let row_end = (y + height).min(rows);
                let col_end = (x + width).min(cols);
                for row in (*y).min(rows)..row_end {
                    for col in (*x).min(cols)..col_end {
                        fold(row, col);
                    }
                }
            }
            RoiShape::Polygon { vertices } => {
                let (row_range, col_range) = polygon_bounds(vertices, rows, cols);
                for row in row_range {
                    for col in col_range.clone() {
                        // test the pixel centre
                        let px = col as f64 + 0.5;
                        let py = row as f64 + 0.5;
                        if point_in_polygon(px, py, vertices) {
                            fold(row, col);
                        }
                    }
                }
            }
        }

        if count == 0 {
            None
        } else {
            Some(RoiReduction {
                sum,
                mean: sum / count as f64,
                count,
            })
        }
    }
}

fn polygon_bounds(
    vertices: &[(f64, f64)],
    rows: usize,
    cols: usize,
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let min_x = vertices.iter().map(|v| v.0).fold(f64::INFINITY, f64::min);
    let max_x = vertices.iter().map(|v| v.0).fold(f64::NEG_INFINITY, f64::max);
    let min_y = vertices.iter().map(|v| v.1).fold(f64::INFINITY, f64::min);
    let max_y = vertices.iter().map(|v| v.1).fold(f64::NEG_INFINITY, f64::max);

    let row_start = min_y.floor().max(0.0) as usize;
    let row_end = (max_y.ceil().max(0.0) as usize).min(rows);
    let col_start = min_x.floor().max(0.0) as usize;
    let col_end = (max_x.ceil().max(0.0) as usize).min(cols);
    (row_start..row_end, col_start..col_end)
}

/// Even-odd ray crossing test.
fn point_in_polygon(px: f64, py: f64, vertices: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let n = vertices.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        if (yi > py) != (yj > py) {
            let x_cross = xj + (py - yj) / (yi - yj) * (xi - xj);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
