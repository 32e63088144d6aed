//! Preprocessing chain: reusable cube transforms applied after calibration.
//!
//! A chain is fit once on the calibrated cube (each member fit on the first
//! output of the member before it) and then applied in order. Members may
//! emit several cubes; the chain applies the next member to each of them.

use std::fmt;

use ndarray::{Array1, Array3, Axis, s};

use crate::annotation::{ContourSet, REFERENCE_LABELS, Rect};
use crate::cube::SpectralCube;
use crate::error::{HyspecError, Result};

pub trait Preprocessor: fmt::Debug {
    fn name(&self) -> &'static str;

    /// Learn parameters from `cube`. Stateless members ignore it.
    fn fit(&mut self, _cube: &SpectralCube) -> Result<()> {
        Ok(())
    }

    fn apply(&self, cube: &SpectralCube) -> Result<Vec<SpectralCube>>;

    /// Whether the member consumes the scan's contour annotations.
    fn is_annotation_aware(&self) -> bool {
        false
    }

    /// Replace the member's annotations; `None` clears them.
    fn set_annotations(&mut self, _annotations: Option<&ContourSet>) {}
}

#[derive(Debug, Default)]
pub struct PreprocessingChain {
    steps: Vec<Box<dyn Preprocessor>>,
}

impl PreprocessingChain {
    pub fn new(steps: Vec<Box<dyn Preprocessor>>) -> Self {
        Self { steps }
    }

    pub fn push(&mut self, step: Box<dyn Preprocessor>) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Hand the contour set to every annotation-aware member, or clear
    /// theirs with `None`.
    pub fn attach_annotations(&mut self, annotations: Option<&ContourSet>) {
        for step in self.steps.iter_mut().filter(|s| s.is_annotation_aware()) {
            step.set_annotations(annotations);
        }
    }

    pub fn fit(&mut self, cube: &SpectralCube) -> Result<()> {
        let mut current = cube.clone();
        let last = self.steps.len().saturating_sub(1);
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.fit(&current)?;
            if i == last {
                break;
            }
            current = step.apply(&current)?.into_iter().next().ok_or_else(|| {
                HyspecError::Preprocessing(format!("{} produced no output while fitting", step.name()))
            })?;
        }
        Ok(())
    }

    pub fn apply(&self, cube: &SpectralCube) -> Result<Vec<SpectralCube>> {
        let mut current = vec![cube.clone()];
        for step in &self.steps {
            let mut next = Vec::with_capacity(current.len());
            for c in &current {
                next.extend(step.apply(c)?);
            }
            current = next;
        }
        Ok(current)
    }
}

fn crop(cube: &SpectralCube, region: Rect) -> Result<SpectralCube> {
    region.check_within(cube.height(), cube.width())?;
    let data = cube
        .data
        .slice(s![region.top..region.bottom, region.left..region.right, ..])
        .to_owned();
    Ok(SpectralCube::new(data, cube.wavelengths.clone()))
}

fn require_wavelengths(cube: &SpectralCube, step: &str) -> Result<()> {
    if cube.wavelengths_consistent() {
        Ok(())
    } else {
        Err(HyspecError::Preprocessing(format!(
            "{step} needs one wavelength per band ({} wavelengths, {} bands)",
            cube.wavelengths.len(),
            cube.bands()
        )))
    }
}

/// Spatial crop to a fixed rectangle.
#[derive(Debug, Clone)]
pub struct Crop {
    pub region: Rect,
}

impl Preprocessor for Crop {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn apply(&self, cube: &SpectralCube) -> Result<Vec<SpectralCube>> {
        Ok(vec![crop(cube, self.region)?])
    }
}

/// Spatial padding with a constant value.
#[derive(Debug, Clone)]
pub struct Pad {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
    pub value: f32,
}

impl Preprocessor for Pad {
    fn name(&self) -> &'static str {
        "pad"
    }

    fn apply(&self, cube: &SpectralCube) -> Result<Vec<SpectralCube>> {
        let [h, w, b] = cube.shape();
        let mut data = Array3::from_elem(
            (h + self.top + self.bottom, w + self.left + self.right, b),
            self.value,
        );
        data.slice_mut(s![self.top..self.top + h, self.left..self.left + w, ..])
            .assign(&cube.data);
        Ok(vec![SpectralCube::new(data, cube.wavelengths.clone())])
    }
}

/// Keeps the bands whose wavelength lies in `[min_wavelength, max_wavelength]`.
#[derive(Debug, Clone)]
pub struct BandRange {
    pub min_wavelength: f32,
    pub max_wavelength: f32,
}

impl Preprocessor for BandRange {
    fn name(&self) -> &'static str {
        "band_range"
    }

    fn apply(&self, cube: &SpectralCube) -> Result<Vec<SpectralCube>> {
        require_wavelengths(cube, self.name())?;
        let keep: Vec<usize> = cube
            .wavelengths
            .iter()
            .enumerate()
            .filter(|(_, wl)| (self.min_wavelength..=self.max_wavelength).contains(*wl))
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            return Err(HyspecError::Preprocessing(format!(
                "no band between {} and {} nm",
                self.min_wavelength, self.max_wavelength
            )));
        }
        let data = cube.data.select(Axis(2), &keep);
        let wavelengths = keep.iter().map(|&i| cube.wavelengths[i]).collect();
        Ok(vec![SpectralCube::new(data, wavelengths)])
    }
}

/// Spectral binning: averages runs of `factor` adjacent bands. A shorter
/// trailing run forms its own bin.
#[derive(Debug, Clone)]
pub struct Binning {
    pub factor: usize,
}

impl Preprocessor for Binning {
    fn name(&self) -> &'static str {
        "binning"
    }

    fn apply(&self, cube: &SpectralCube) -> Result<Vec<SpectralCube>> {
        if self.factor == 0 {
            return Err(HyspecError::Preprocessing("binning factor must be at least 1".into()));
        }
        require_wavelengths(cube, self.name())?;
        let [h, w, b] = cube.shape();
        let bins = b.div_ceil(self.factor);
        let mut data = Array3::zeros((h, w, bins));
        let mut wavelengths = Vec::with_capacity(bins);
        for bin in 0..bins {
            let start = bin * self.factor;
            let end = (start + self.factor).min(b);
            let run = cube.data.slice(s![.., .., start..end]);
            if let Some(mean) = run.mean_axis(Axis(2)) {
                data.index_axis_mut(Axis(2), bin).assign(&mean);
            }
            let wl = &cube.wavelengths[start..end];
            wavelengths.push(wl.iter().sum::<f32>() / wl.len() as f32);
        }
        Ok(vec![SpectralCube::new(data, wavelengths)])
    }
}

/// First spectral difference. Band `i` of the output is `x[i + 1] - x[i]`,
/// placed at the midpoint wavelength.
#[derive(Debug, Clone, Copy, Default)]
pub struct Derivative;

impl Preprocessor for Derivative {
    fn name(&self) -> &'static str {
        "derivative"
    }

    fn apply(&self, cube: &SpectralCube) -> Result<Vec<SpectralCube>> {
        require_wavelengths(cube, self.name())?;
        let b = cube.bands();
        if b < 2 {
            return Err(HyspecError::Preprocessing(
                "derivative needs at least two bands".into(),
            ));
        }
        let data = &cube.data.slice(s![.., .., 1..]) - &cube.data.slice(s![.., .., ..b - 1]);
        let wavelengths = cube
            .wavelengths
            .windows(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect();
        Ok(vec![SpectralCube::new(data, wavelengths)])
    }
}

/// Per-band standardization with statistics learned in `fit`.
#[derive(Debug, Clone, Default)]
pub struct Standardize {
    stats: Option<(Array1<f32>, Array1<f32>)>,
}

impl Standardize {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(mean, std)` per band once fitted.
    pub fn stats(&self) -> Option<(&Array1<f32>, &Array1<f32>)> {
        self.stats.as_ref().map(|(m, s)| (m, s))
    }
}

impl Preprocessor for Standardize {
    fn name(&self) -> &'static str {
        "standardize"
    }

    fn fit(&mut self, cube: &SpectralCube) -> Result<()> {
        let [h, w, b] = cube.shape();
        let pixels = cube.data.to_shape((h * w, b))?;
        let mean = pixels
            .mean_axis(Axis(0))
            .ok_or_else(|| HyspecError::Preprocessing("cannot fit on an empty cube".into()))?;
        let std = pixels.std_axis(Axis(0), 0.0);
        self.stats = Some((mean, std));
        Ok(())
    }

    fn apply(&self, cube: &SpectralCube) -> Result<Vec<SpectralCube>> {
        let Some((mean, std)) = &self.stats else {
            return Err(HyspecError::Preprocessing("standardize applied before fit".into()));
        };
        if mean.len() != cube.bands() {
            return Err(HyspecError::shape("standardize", &[mean.len()], &[cube.bands()]));
        }
        let mut data = cube.data.clone();
        for ((mut band, &m), &s) in data.axis_iter_mut(Axis(2)).zip(mean).zip(std) {
            let scale = if s > 0.0 { s } else { 1.0 };
            band.mapv_inplace(|v| (v - m) / scale);
        }
        Ok(vec![SpectralCube::new(data, cube.wavelengths.clone())])
    }
}

/// Crops to the bounding box of the annotated objects, grown by `margin`.
/// Reference-marker contours are ignored.
#[derive(Debug, Clone, Default)]
pub struct AnnotationCrop {
    pub margin: usize,
    annotations: Option<ContourSet>,
}

impl AnnotationCrop {
    pub fn new(margin: usize) -> Self {
        Self {
            margin,
            annotations: None,
        }
    }

    fn region(&self, height: usize, width: usize) -> Option<Rect> {
        let objects = self
            .annotations
            .as_ref()?
            .contours
            .iter()
            .filter(|c| !REFERENCE_LABELS.contains(&c.label.as_str()))
            .filter_map(|c| Rect::bounding(&c.points, height, width));
        objects
            .reduce(|a, b| Rect {
                top: a.top.min(b.top),
                left: a.left.min(b.left),
                bottom: a.bottom.max(b.bottom),
                right: a.right.max(b.right),
            })
            .map(|r| Rect {
                top: r.top.saturating_sub(self.margin),
                left: r.left.saturating_sub(self.margin),
                bottom: (r.bottom + self.margin).min(height),
                right: (r.right + self.margin).min(width),
            })
    }
}

impl Preprocessor for AnnotationCrop {
    fn name(&self) -> &'static str {
        "annotation_crop"
    }

    fn apply(&self, cube: &SpectralCube) -> Result<Vec<SpectralCube>> {
        let region = self.region(cube.height(), cube.width()).ok_or_else(|| {
            HyspecError::Preprocessing("annotation crop has no annotated objects".into())
        })?;
        Ok(vec![crop(cube, region)?])
    }

    fn is_annotation_aware(&self) -> bool {
        true
    }

    fn set_annotations(&mut self, annotations: Option<&ContourSet>) {
        self.annotations = annotations.cloned();
    }
}

/// Splits the cube into a `rows × cols` grid. Edge tiles absorb the
/// remainder.
#[derive(Debug, Clone)]
pub struct Tiles {
    pub rows: usize,
    pub cols: usize,
}

impl Preprocessor for Tiles {
    fn name(&self) -> &'static str {
        "tiles"
    }

    fn apply(&self, cube: &SpectralCube) -> Result<Vec<SpectralCube>> {
        let (h, w) = (cube.height(), cube.width());
        if self.rows == 0 || self.cols == 0 || self.rows > h || self.cols > w {
            return Err(HyspecError::Preprocessing(format!(
                "cannot split a {h}x{w} cube into {}x{} tiles",
                self.rows, self.cols
            )));
        }
        let (th, tw) = (h / self.rows, w / self.cols);
        let mut tiles = Vec::with_capacity(self.rows * self.cols);
        for r in 0..self.rows {
            for c in 0..self.cols {
                let bottom = if r + 1 == self.rows { h } else { (r + 1) * th };
                let right = if c + 1 == self.cols { w } else { (c + 1) * tw };
                tiles.push(crop(cube, Rect::new(r * th, c * tw, bottom, right))?);
            }
        }
        Ok(tiles)
    }
}
