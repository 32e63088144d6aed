#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use hyspec_core::{CalibrationManager, CubeLoader, HyspecError, SpectralCube};
use ndarray::Array3;

/// Loader serving cubes registered under fixed paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    cubes: HashMap<PathBuf, SpectralCube>,
}

impl MemoryLoader {
    pub fn with(mut self, path: &str, cube: SpectralCube) -> Self {
        self.cubes.insert(PathBuf::from(path), cube);
        self
    }
}

impl CubeLoader for MemoryLoader {
    fn load(&self, path: &Path) -> hyspec_core::Result<SpectralCube> {
        self.cubes.get(path).cloned().ok_or_else(|| HyspecError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "not registered"),
        })
    }
}

pub const SCAN: &str = "/scans/leaf.json";

/// Manager with `scan` loaded from [`SCAN`] and every cube of `loader` available.
pub fn manager_with_scan(scan: SpectralCube, loader: MemoryLoader) -> CalibrationManager {
    let mut manager = CalibrationManager::new(Box::new(loader.with(SCAN, scan)));
    assert_eq!(manager.load_scan(SCAN), None);
    manager
}

/// `(h, w, b)` cube whose sample at `[y, x, b]` is `f(y, x, b)`.
pub fn cube_from_fn(shape: (usize, usize, usize), f: impl Fn(usize, usize, usize) -> f32) -> SpectralCube {
    SpectralCube::from_data(Array3::from_shape_fn(shape, |(y, x, b)| f(y, x, b)))
}

pub fn assert_all_close(cube: &SpectralCube, expected: f32) {
    for v in cube.data.iter() {
        assert!((v - expected).abs() < 1e-5, "got {v}, expected {expected}");
    }
}
