//! fastfoam-core: Core types for detector train processing.
//!
//! This crate provides the shared data model for the on-line analysis
//! pipeline: per-module pixel panels, train/pulse containers, geometry
//! descriptors, calibration constant sets and the assembled full-detector
//! image with its invalid-pixel sentinel.
//!

pub mod calib;
pub mod error;
pub mod geometry;
pub mod image;
pub mod module;
pub mod train;

pub use calib::{CalibrationSet, CorrectionConstants};
pub use error::{Error, Result};
pub use geometry::{CanvasPlacement, GeometryDescriptor, ModulePlacement, Orientation, QuadPosition};
pub use image::{AssembledImage, INVALID};
pub use module::ModulePanel;
pub use train::{Pulse, PulseTag, Train};
