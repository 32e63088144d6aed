//! Hyspec Core: calibration and display pipeline for hyperspectral scans.
//!
//! Black/white reference correction, a pluggable preprocessing chain and
//! per-channel normalization for RGB previews. No viewer or file-format
//! dependencies; cube readers plug in through [`CubeLoader`].

pub mod annotation;
pub mod config;
pub mod cube;
pub mod display;
pub mod error;
pub mod loader;
pub mod locator;
pub mod manager;
pub mod normalize;
pub mod outcome;
pub mod preprocess;
pub mod reference;

// Re-exports for convenience.
pub use annotation::{ContourSet, Rect};
pub use config::PipelineConfig;
pub use cube::SpectralCube;
pub use error::{HyspecError, Result};
pub use loader::{CubeLoader, JsonCubeLoader};
pub use locator::ReferenceLocator;
pub use manager::{CalibrationManager, ManagerState};
pub use outcome::{CalibrationOutcome, Stage};
pub use reference::{Algorithm, ReferenceKind, ReferenceMethod};
