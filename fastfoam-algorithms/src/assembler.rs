//! Geometry-based assembly of module panels into one image.

use std::sync::Arc;

use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;

use fastfoam_core::{
    AssembledImage, Error, GeometryDescriptor, ModulePanel, Orientation, Result, INVALID,
};

/// Projects corrected module panels onto the assembled canvas.
///
/// The expensive placement computation lives in the geometry descriptor
/// and happens once per calibration epoch; `assemble` only rotates and
/// copies pixel data, O(total pixels) per frame. Gaps between modules
/// keep the invalid sentinel so they never contribute to area-based
/// statistics. Assembly is deterministic: identical panels and geometry
/// yield a bit-identical image.
#[derive(Debug, Clone)]
pub struct ImageAssembler {
    geometry: Arc<GeometryDescriptor>,
}

impl ImageAssembler {
    /// Creates an assembler over a validated geometry.
    #[must_use]
    pub fn new(geometry: Arc<GeometryDescriptor>) -> Self {
        Self { geometry }
    }

    /// The geometry this assembler projects with.
    #[must_use]
    pub fn geometry(&self) -> &Arc<GeometryDescriptor> {
        &self.geometry
    }

    /// Shape of every image this assembler produces.
    #[must_use]
    pub fn canvas_shape(&self) -> (usize, usize) {
        self.geometry.canvas_shape()
    }

    /// Assembles one frame from a full module stack.
    ///
    /// # Errors
    ///
    /// [`Error::ModuleCountMismatch`] if the stack size differs from the
    /// geometry's module count, [`Error::ShapeMismatch`] if any panel has
    /// the wrong shape or an out-of-range module index. Both are
    /// per-frame errors: the caller skips the frame and the run continues.
    pub fn assemble(&self, modules: &[ModulePanel]) -> Result<AssembledImage> {
        let expected_count = self.geometry.module_count();
        if modules.len() != expected_count {
            return Err(Error::ModuleCountMismatch {
                expected: expected_count,
                actual: modules.len(),
            });
        }

        let module_shape = self.geometry.module_shape();
        let mut canvas = Array2::from_elem(self.geometry.canvas_shape(), INVALID);

        for panel in modules {
            if panel.shape() != module_shape {
                return Err(Error::ShapeMismatch {
                    module: panel.module(),
                    expected: module_shape,
                    actual: panel.shape(),
                });
            }
            let placement = self
                .geometry
                .canvas_placements()
                .get(panel.module())
                .ok_or(Error::ModuleCountMismatch {
                    expected: expected_count,
                    actual: panel.module() + 1,
                })?;

            let view = oriented_view(panel.data(), placement.orientation);
            let (height, width) = view.dim();
            canvas
                .slice_mut(s![
                    placement.row..placement.row + height,
                    placement.col..placement.col + width
                ])
                .assign(&view);
        }

        Ok(AssembledImage::new(canvas))
    }

    /// Assembles many frames in parallel, preserving input order.
    ///
    /// Each element of the result corresponds to the stack at the same
    /// index; per-frame failures stay local to their slot.
    #[must_use]
    pub fn assemble_batch(&self, stacks: &[Vec<ModulePanel>]) -> Vec<Result<AssembledImage>> {
        stacks.par_iter().map(|stack| self.assemble(stack)).collect()
    }
}

/// Rotated read-only view of a panel, from the cached orientation.
fn oriented_view(data: &Array2<f32>, orientation: Orientation) -> ArrayView2<'_, f32> {
    let view = data.view();
    match orientation {
        Orientation::R0 => view,
        Orientation::R90 => view.reversed_axes().slice_move(s![.., ..;-1]),
        Orientation::R180 => view.slice_move(s![..;-1, ..;-1]),
        Orientation::R270 => view.reversed_axes().slice_move(s![..;-1, ..]),
    }
}
