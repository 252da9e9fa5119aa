//! Detector geometry descriptors.
//!
//! A [`GeometryDescriptor`] captures how independent module panels
//! compose into one full-detector image: per-module placement offsets in
//! pixel units (derived from quadrant positions), an orientation applied
//! before placement, and the pixel pitch. Descriptors are validated and
//! their integer placement map precomputed once at construction — the
//! expensive step happens per calibration epoch, never per frame — and
//! are then shared read-only across all worker threads of a run.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Placement offset of one module in pixel units.
///
/// `x` grows along columns, `y` along rows. Fractional offsets are
/// allowed; they are rounded to the pixel grid once when the placement
/// map is built.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuadPosition {
    /// Column offset in pixels.
    pub x: f64,
    /// Row offset in pixels.
    pub y: f64,
}

impl QuadPosition {
    /// Creates a position from column/row offsets.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rotation applied to a module panel before placement.
///
/// Rotations are clockwise. Quadrant layouts of 1M-class detectors place
/// half the modules rotated by 180 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Orientation {
    /// No rotation.
    R0,
    /// 90 degrees clockwise.
    R90,
    /// 180 degrees.
    R180,
    /// 270 degrees clockwise.
    R270,
}

impl Orientation {
    /// Shape of a panel after applying this rotation.
    #[must_use]
    pub fn transformed_shape(self, shape: (usize, usize)) -> (usize, usize) {
        match self {
            Orientation::R0 | Orientation::R180 => shape,
            Orientation::R90 | Orientation::R270 => (shape.1, shape.0),
        }
    }
}

/// Placement of one module: offset plus orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModulePlacement {
    /// Offset in pixel units.
    pub position: QuadPosition,
    /// Rotation applied before placement.
    pub orientation: Orientation,
}

impl ModulePlacement {
    /// Creates a placement.
    #[must_use]
    pub fn new(position: QuadPosition, orientation: Orientation) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

/// Integer placement of one module on the assembled canvas, normalized so
/// the canvas origin is (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasPlacement {
    /// Target row of the module's top-left corner.
    pub row: usize,
    /// Target column of the module's top-left corner.
    pub col: usize,
    /// Rotation applied before the copy.
    pub orientation: Orientation,
}

/// Validated geometry for one detector configuration.
///
/// Construction fails with [`Error::InvalidGeometry`] on non-finite
/// offsets or overlapping module placements; nothing downstream ever
/// observes an invalid geometry. Instances are immutable — a new
/// calibration epoch replaces the descriptor wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryDescriptor {
    module_shape: (usize, usize),
    pixel_size: f64,
    placements: Vec<ModulePlacement>,
    canvas_shape: (usize, usize),
    canvas_placements: Vec<CanvasPlacement>,
}

impl GeometryDescriptor {
    /// Builds and validates a descriptor.
    ///
    /// `module_shape` is the per-module (rows, columns) shape fixed by the
    /// detector type; `pixel_size` is the pixel pitch in metres.
    pub fn new(
        module_shape: (usize, usize),
        pixel_size: f64,
        placements: Vec<ModulePlacement>,
    ) -> Result<Self> {
        if placements.is_empty() {
            return Err(Error::InvalidGeometry("no module placements".into()));
        }
        if module_shape.0 == 0 || module_shape.1 == 0 {
            return Err(Error::InvalidGeometry(format!(
                "degenerate module shape {module_shape:?}"
            )));
        }
        if !(pixel_size.is_finite() && pixel_size > 0.0) {
            return Err(Error::InvalidGeometry(format!(
                "pixel size must be finite and positive, got {pixel_size}"
            )));
        }

        let rects = placement_rects(module_shape, &placements)?;
        check_overlaps(&rects)?;

        let min_row = rects.iter().map(|r| r.row).min().unwrap_or(0);
        let min_col = rects.iter().map(|r| r.col).min().unwrap_or(0);
        let max_row = rects
            .iter()
            .map(|r| r.row + r.height as i64)
            .max()
            .unwrap_or(0);
        let max_col = rects
            .iter()
            .map(|r| r.col + r.width as i64)
            .max()
            .unwrap_or(0);

        let canvas_shape = ((max_row - min_row) as usize, (max_col - min_col) as usize);
        let canvas_placements = rects
            .iter()
            .zip(&placements)
            .map(|(rect, placement)| CanvasPlacement {
                row: (rect.row - min_row) as usize,
                col: (rect.col - min_col) as usize,
                orientation: placement.orientation,
            })
            .collect();

        Ok(Self {
            module_shape,
            pixel_size,
            placements,
            canvas_shape,
            canvas_placements,
        })
    }

    /// A single module placed at the origin. Useful for single-panel
    /// detectors and tests.
    pub fn single_module(module_shape: (usize, usize), pixel_size: f64) -> Result<Self> {
        Self::new(
            module_shape,
            pixel_size,
            vec![ModulePlacement::new(QuadPosition::new(0.0, 0.0), Orientation::R0)],
        )
    }

    /// Number of modules this geometry expects.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.placements.len()
    }

    /// Per-module (rows, columns) shape.
    #[must_use]
    pub fn module_shape(&self) -> (usize, usize) {
        self.module_shape
    }

    /// Pixel pitch in metres.
    #[must_use]
    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    /// Placements as supplied at construction.
    #[must_use]
    pub fn placements(&self) -> &[ModulePlacement] {
        &self.placements
    }

    /// Shape of the assembled canvas. Identical for every frame of a run.
    #[must_use]
    pub fn canvas_shape(&self) -> (usize, usize) {
        self.canvas_shape
    }

    /// Precomputed integer placement map, indexed by module.
    #[must_use]
    pub fn canvas_placements(&self) -> &[CanvasPlacement] {
        &self.canvas_placements
    }
}

/// Integer bounding rectangle of one placed module.
struct PlacedRect {
    row: i64,
    col: i64,
    height: usize,
    width: usize,
}

fn placement_rects(
    module_shape: (usize, usize),
    placements: &[ModulePlacement],
) -> Result<Vec<PlacedRect>> {
    placements
        .iter()
        .enumerate()
        .map(|(module, placement)| {
            let pos = placement.position;
            if !(pos.x.is_finite() && pos.y.is_finite()) {
                return Err(Error::InvalidGeometry(format!(
                    "non-finite offset for module {module}: ({}, {})",
                    pos.x, pos.y
                )));
            }
            let (height, width) = placement.orientation.transformed_shape(module_shape);
            Ok(PlacedRect {
                row: pos.y.round() as i64,
                col: pos.x.round() as i64,
                height,
                width,
            })
        })
        .collect()
}

fn check_overlaps(rects: &[PlacedRect]) -> Result<()> {
    for (a_idx, a) in rects.iter().enumerate() {
        for (b_idx, b) in rects.iter().enumerate().skip(a_idx + 1) {
            let rows_overlap =
                a.row < b.row + b.height as i64 && b.row < a.row + a.height as i64;
            let cols_overlap =
                a.col < b.col + b.width as i64 && b.col < a.col + a.width as i64;
            if rows_overlap && cols_overlap {
                return Err(Error::InvalidGeometry(format!(
                    "modules {a_idx} and {b_idx} overlap"
                )));
            }
        }
    }
    Ok(())
}
