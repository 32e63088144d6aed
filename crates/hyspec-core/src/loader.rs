//! Cube loading contract and the bundled JSON cube format.
//!
//! Format readers for ENVI, Matlab and directory layouts live outside this
//! crate; they plug in through [`CubeLoader`].

use std::fs;
use std::path::Path;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::cube::SpectralCube;
use crate::error::{HyspecError, Result};

/// Reads a cube (samples plus wavelength table) from a path.
pub trait CubeLoader {
    fn load(&self, path: &Path) -> Result<SpectralCube>;
}

/// On-disk layout of a JSON cube. `data` is row-major over
/// `(height, width, bands)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CubeDocument {
    shape: [usize; 3],
    #[serde(default)]
    wavelengths: Vec<f32>,
    data: Vec<f32>,
}

/// Loader for `{ "shape": [h, w, b], "wavelengths": [...], "data": [...] }` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCubeLoader;

impl JsonCubeLoader {
    /// Write `cube` in the format [`JsonCubeLoader::load`] reads.
    pub fn save(path: &Path, cube: &SpectralCube) -> Result<()> {
        let doc = CubeDocument {
            shape: cube.shape(),
            wavelengths: cube.wavelengths.clone(),
            data: cube.data.iter().copied().collect(),
        };
        let text = serde_json::to_string(&doc).map_err(|source| HyspecError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|e| HyspecError::io(path, e))
    }
}

impl CubeLoader for JsonCubeLoader {
    fn load(&self, path: &Path) -> Result<SpectralCube> {
        let text = fs::read_to_string(path).map_err(|e| HyspecError::io(path, e))?;
        let doc: CubeDocument =
            serde_json::from_str(&text).map_err(|source| HyspecError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        let [h, w, b] = doc.shape;
        let data = Array3::from_shape_vec((h, w, b), doc.data).map_err(|e| {
            HyspecError::InvalidCube {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        tracing::debug!("loaded cube {} with shape {:?}", path.display(), doc.shape);
        Ok(SpectralCube::new(data, doc.wavelengths))
    }
}
