//! Black/white reference correction.
//!
//! A black reference is subtracted from the scan, a white reference divides
//! it. The [`Algorithm`] decides what statistic of the reference is used:
//!
//! | algorithm            | statistic                             | shape rule             |
//! |----------------------|---------------------------------------|------------------------|
//! | `same_size`          | the reference itself                  | identical shapes       |
//! | `average`            | one mean per band                     | equal band counts      |
//! | `column_average`     | one mean per band and column          | equal widths and bands |
//! | `annotation_average` | one mean per band inside a rectangle  | equal band counts      |
//! | `none`               | nothing, the scan passes through      |                        |
//!
//! Statistics are derived lazily on the first [`ReferenceMethod::apply`]
//! after the reference or annotation was (re)bound, then reused.

use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, ArrayView3, Axis, s};
use serde::{Deserialize, Serialize};

use crate::annotation::Rect;
use crate::cube::SpectralCube;
use crate::error::{HyspecError, Result};

/// Which side of the radiometric range a reference pins down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Dark current; subtracted.
    Black,
    /// Full response; divides.
    White,
}

impl ReferenceKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::White => "white",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    SameSize,
    Average,
    ColumnAverage,
    AnnotationAverage,
    None,
}

/// Reference statistic derived on first use.
#[derive(Debug, Clone, PartialEq)]
enum Derived {
    /// The bound reference is used as-is.
    Full,
    PerBand(Array1<f32>),
    PerColumn(Array2<f32>),
}

#[derive(Debug, Clone, PartialEq)]
enum MethodState {
    Uninitialized,
    Initialized(Derived),
}

/// A configured black or white correction step.
#[derive(Debug, Clone)]
pub struct ReferenceMethod {
    kind: ReferenceKind,
    algorithm: Algorithm,
    reference: Option<Arc<SpectralCube>>,
    annotation: Option<Rect>,
    state: MethodState,
}

impl ReferenceMethod {
    pub fn new(kind: ReferenceKind, algorithm: Algorithm) -> Self {
        let state = match algorithm {
            Algorithm::None => MethodState::Initialized(Derived::Full),
            _ => MethodState::Uninitialized,
        };
        Self {
            kind,
            algorithm,
            reference: None,
            annotation: None,
            state,
        }
    }

    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Whether the method reads its statistic from an annotation rectangle.
    pub fn is_annotation_based(&self) -> bool {
        self.algorithm == Algorithm::AnnotationAverage
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, MethodState::Initialized(_))
    }

    pub fn set_reference(&mut self, reference: Arc<SpectralCube>) {
        self.reference = Some(reference);
        self.reset();
    }

    pub fn set_annotation(&mut self, annotation: Rect) {
        self.annotation = Some(annotation);
        self.reset();
    }

    /// Per-band averages once derived (average and annotation-average only).
    pub fn band_averages(&self) -> Option<&Array1<f32>> {
        match &self.state {
            MethodState::Initialized(Derived::PerBand(avg)) => Some(avg),
            _ => None,
        }
    }

    /// Per-column, per-band averages once derived (column-average only).
    pub fn column_averages(&self) -> Option<&Array2<f32>> {
        match &self.state {
            MethodState::Initialized(Derived::PerColumn(avg)) => Some(avg),
            _ => None,
        }
    }

    /// Correct `scan` with the bound reference.
    pub fn apply(&mut self, scan: &Array3<f32>) -> Result<Array3<f32>> {
        if self.algorithm == Algorithm::None {
            return Ok(scan.to_owned());
        }

        if !self.is_initialized() {
            let derived = self.derive()?;
            tracing::debug!(
                "{} reference ({:?}) statistics derived",
                self.kind.label(),
                self.algorithm
            );
            self.state = MethodState::Initialized(derived);
        }

        let MethodState::Initialized(derived) = &self.state else {
            return Err(HyspecError::config("reference statistics unavailable"));
        };
        match derived {
            Derived::Full => self.apply_full(scan),
            Derived::PerBand(avg) => self.apply_per_band(scan, avg),
            Derived::PerColumn(avg) => self.apply_per_column(scan, avg),
        }
    }

    fn reset(&mut self) {
        if self.algorithm != Algorithm::None {
            self.state = MethodState::Uninitialized;
        }
    }

    fn bound_reference(&self) -> Result<&SpectralCube> {
        self.reference.as_deref().ok_or_else(|| {
            HyspecError::config(format!(
                "{} reference method applied before a reference was bound",
                self.kind.label()
            ))
        })
    }

    fn derive(&self) -> Result<Derived> {
        match self.algorithm {
            Algorithm::SameSize => {
                self.bound_reference()?;
                Ok(Derived::Full)
            }
            Algorithm::Average => {
                let reference = self.bound_reference()?;
                band_means(reference.data.view()).map(Derived::PerBand)
            }
            Algorithm::ColumnAverage => {
                let reference = self.bound_reference()?;
                reference
                    .data
                    .mean_axis(Axis(0))
                    .map(Derived::PerColumn)
                    .ok_or_else(|| HyspecError::config("column average of an empty reference"))
            }
            Algorithm::AnnotationAverage => {
                let rect = self.annotation.ok_or_else(|| {
                    HyspecError::config(format!(
                        "{} annotation-average method requires an annotation",
                        self.kind.label()
                    ))
                })?;
                let reference = self.bound_reference()?;
                rect.check_within(reference.height(), reference.width())?;
                let region = reference
                    .data
                    .slice(s![rect.top..rect.bottom, rect.left..rect.right, ..]);
                band_means(region).map(Derived::PerBand)
            }
            Algorithm::None => Ok(Derived::Full),
        }
    }

    fn apply_full(&self, scan: &Array3<f32>) -> Result<Array3<f32>> {
        let reference = self.bound_reference()?;
        if scan.shape() != reference.data.shape() {
            return Err(HyspecError::shape(
                "same-size reference",
                reference.data.shape(),
                scan.shape(),
            ));
        }
        Ok(match self.kind {
            ReferenceKind::Black => scan - &reference.data,
            ReferenceKind::White => scan / &reference.data,
        })
    }

    fn apply_per_band(&self, scan: &Array3<f32>, avg: &Array1<f32>) -> Result<Array3<f32>> {
        let bands = scan.len_of(Axis(2));
        if bands != avg.len() {
            return Err(HyspecError::shape("band average", &[avg.len()], &[bands]));
        }

        let mut out = scan.to_owned();
        for (mut band, &mean) in out.axis_iter_mut(Axis(2)).zip(avg.iter()) {
            match self.kind {
                ReferenceKind::Black => band.mapv_inplace(|v| v - mean),
                // A band averaging exactly 1.0 is left untouched.
                ReferenceKind::White if mean == 1.0 => {}
                ReferenceKind::White => band.mapv_inplace(|v| v / mean),
            }
        }
        Ok(out)
    }

    fn apply_per_column(&self, scan: &Array3<f32>, avg: &Array2<f32>) -> Result<Array3<f32>> {
        let (_, width, bands) = scan.dim();
        if (width, bands) != avg.dim() {
            return Err(HyspecError::shape(
                "column average",
                avg.shape(),
                &[width, bands],
            ));
        }

        let mut out = scan.to_owned();
        for mut row in out.axis_iter_mut(Axis(0)) {
            match self.kind {
                ReferenceKind::Black => row -= avg,
                ReferenceKind::White => row /= avg,
            }
        }
        Ok(out)
    }
}

/// Mean of every band over the spatial axes.
fn band_means(region: ArrayView3<'_, f32>) -> Result<Array1<f32>> {
    let (h, w, bands) = region.dim();
    if h == 0 || w == 0 {
        return Err(HyspecError::config("cannot average an empty reference region"));
    }
    let sums = region.fold_axis(Axis(0), 0.0_f64, |acc, &v| acc + v as f64);
    let count = (h * w) as f64;
    Ok((0..bands)
        .map(|b| (sums.column(b).sum() / count) as f32)
        .collect())
}
