//! Spectral cube representation for the calibration pipeline.

use ndarray::{Array3, ArrayView2, Axis};

/// A hyperspectral capture: `(height, width, bands)` samples plus the
/// wavelength of every band.
///
/// The same type is handed to preprocessing steps, which may change any of
/// the three dimensions and must keep `wavelengths` in sync with the band axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralCube {
    /// Samples indexed as `[row, column, band]`.
    pub data: Array3<f32>,
    /// Wavelength (nm) of band `i` at index `i`. Loaders may deliver a list
    /// whose length disagrees with the band count.
    pub wavelengths: Vec<f32>,
}

impl SpectralCube {
    pub fn new(data: Array3<f32>, wavelengths: Vec<f32>) -> Self {
        Self { data, wavelengths }
    }

    /// Cube with evenly numbered wavelengths `0, 1, 2, ...`.
    pub fn from_data(data: Array3<f32>) -> Self {
        let bands = data.len_of(Axis(2));
        Self {
            data,
            wavelengths: (0..bands).map(|b| b as f32).collect(),
        }
    }

    /// Cube of the given shape with every sample set to `value`.
    pub fn filled(height: usize, width: usize, bands: usize, value: f32) -> Self {
        Self::from_data(Array3::from_elem((height, width, bands), value))
    }

    /// `[height, width, bands]`.
    pub fn shape(&self) -> [usize; 3] {
        let (h, w, b) = self.data.dim();
        [h, w, b]
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn bands(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// View of a single band. Panics if `index >= bands()`.
    pub fn band(&self, index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(2), index)
    }

    /// Whether the stored wavelength table matches the band axis.
    pub fn wavelengths_consistent(&self) -> bool {
        self.wavelengths.len() == self.bands()
    }

    /// Smallest and largest finite sample, or `None` for an empty/all-NaN cube.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        min_max(self.data.iter())
    }
}

/// Finite min/max over a sequence of samples.
pub(crate) fn min_max<'a>(values: impl IntoIterator<Item = &'a f32>) -> Option<(f32, f32)> {
    values
        .into_iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
