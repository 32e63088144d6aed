//! The calibration manager: owns the scan, its references and the pipeline
//! configuration, and turns them into a normalized cube and a display image.
//!
//! # Pipeline
//! ```text
//! resolve black ref ─► resolve white ref ─► seed from scan
//!        ─► black method ─► white method ─► preprocessing chain ─► cache
//! ```
//! Every stage returns a `Result`; the first error is logged, its stage is
//! recorded as failed and the remaining stages are skipped. Outcomes of the
//! stages that already ran are kept. The normalized cube is cached until any
//! setter touches an input.
//!
//! The manager is single-threaded; callers serialize access themselves.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use ndarray::{Array2, Array3};

use crate::annotation::{ContourSet, Rect};
use crate::cube::SpectralCube;
use crate::display;
use crate::error::{HyspecError, Result};
use crate::loader::CubeLoader;
use crate::locator::{LocatorOutput, ReferenceLocator};
use crate::normalize::{
    Channel, NormalizationContext, NormalizationScheme, SimpleNormalization,
};
use crate::outcome::{CalibrationOutcome, Stage};
use crate::preprocess::PreprocessingChain;
use crate::reference::{Algorithm, ReferenceKind, ReferenceMethod};

/// Coarse lifecycle of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Empty,
    Uncalibrated,
    Calibrated,
}

/// Everything known about one reference (black or white).
#[derive(Debug, Default)]
struct ReferenceSlot {
    locator: Option<ReferenceLocator>,
    method: Option<ReferenceMethod>,
    file: Option<PathBuf>,
    data: Option<Arc<SpectralCube>>,
    annotation: Option<Rect>,
    annotation_in_scan: bool,
    /// Data/annotation came from the locator and is re-resolved for a new
    /// scan or locator.
    located: bool,
}

impl ReferenceSlot {
    fn is_resolved(&self) -> bool {
        self.data.is_some() || self.annotation.is_some()
    }

    fn forget_located(&mut self) {
        if self.located {
            self.file = None;
            self.data = None;
            self.annotation = None;
            self.annotation_in_scan = false;
            self.located = false;
        }
    }
}

/// What a locator produced, before it is stored.
enum Located {
    Nothing,
    File(PathBuf, SpectralCube),
    Annotation(Rect),
}

pub struct CalibrationManager {
    loader: Box<dyn CubeLoader>,
    scan_path: Option<PathBuf>,
    scan: Option<Arc<SpectralCube>>,
    black: ReferenceSlot,
    white: ReferenceSlot,
    contours: ContourSet,
    preprocessing: Option<PreprocessingChain>,
    normalization: Box<dyn NormalizationScheme>,
    normalized: Option<SpectralCube>,
    display: Option<RgbImage>,
}

impl CalibrationManager {
    /// A manager with simple normalization and nothing else configured.
    pub fn new(loader: Box<dyn CubeLoader>) -> Self {
        Self {
            loader,
            scan_path: None,
            scan: None,
            black: ReferenceSlot::default(),
            white: ReferenceSlot::default(),
            contours: ContourSet::default(),
            preprocessing: None,
            normalization: Box::new(SimpleNormalization),
            normalized: None,
            display: None,
        }
    }

    // -----------------------------------------------------------------------
    // State access
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ManagerState {
        match (&self.scan, &self.normalized) {
            (None, _) => ManagerState::Empty,
            (Some(_), None) => ManagerState::Uncalibrated,
            (Some(_), Some(_)) => ManagerState::Calibrated,
        }
    }

    pub fn scan(&self) -> Option<&SpectralCube> {
        self.scan.as_deref()
    }

    pub fn scan_path(&self) -> Option<&Path> {
        self.scan_path.as_deref()
    }

    /// The cached normalized cube, if the pipeline has run since the last
    /// invalidation.
    pub fn normalized(&self) -> Option<&SpectralCube> {
        self.normalized.as_ref()
    }

    /// The image rendered by the last [`Self::update_image`].
    pub fn display_image(&self) -> Option<&RgbImage> {
        self.display.as_ref()
    }

    pub fn contours(&self) -> &ContourSet {
        &self.contours
    }

    pub fn reference_data(&self, kind: ReferenceKind) -> Option<&SpectralCube> {
        self.slot(kind).data.as_deref()
    }

    pub fn reference_file(&self, kind: ReferenceKind) -> Option<&Path> {
        self.slot(kind).file.as_deref()
    }

    /// The bound annotation rectangle and whether it lies inside the scan.
    pub fn reference_annotation(&self, kind: ReferenceKind) -> Option<(Rect, bool)> {
        let slot = self.slot(kind);
        slot.annotation.map(|r| (r, slot.annotation_in_scan))
    }

    pub fn method(&self, kind: ReferenceKind) -> Option<&ReferenceMethod> {
        self.slot(kind).method.as_ref()
    }

    fn slot(&self, kind: ReferenceKind) -> &ReferenceSlot {
        match kind {
            ReferenceKind::Black => &self.black,
            ReferenceKind::White => &self.white,
        }
    }

    fn slot_mut(&mut self, kind: ReferenceKind) -> &mut ReferenceSlot {
        match kind {
            ReferenceKind::Black => &mut self.black,
            ReferenceKind::White => &mut self.white,
        }
    }

    fn invalidate(&mut self) {
        if self.normalized.take().is_some() {
            tracing::debug!("normalized cube invalidated");
        }
        self.display = None;
    }

    // -----------------------------------------------------------------------
    // Setters
    // -----------------------------------------------------------------------

    /// Load a scan, replacing the previous one.
    ///
    /// Returns a warning instead of failing: when the file cannot be read
    /// (the manager keeps its previous state) or when the wavelength table
    /// does not match the band count (the scan is still loaded).
    pub fn load_scan(&mut self, path: impl AsRef<Path>) -> Option<String> {
        let path = path.as_ref();
        let cube = match self.loader.load(path) {
            Ok(cube) => cube,
            Err(e) => {
                let warning = format!("could not load scan {}: {e}", path.display());
                tracing::warn!("{warning}");
                return Some(warning);
            }
        };

        let warning = (!cube.wavelengths_consistent()).then(|| {
            format!(
                "{} stores {} wavelengths for {} bands",
                path.display(),
                cube.wavelengths.len(),
                cube.bands()
            )
        });
        if let Some(w) = &warning {
            tracing::warn!("{w}");
        }

        tracing::info!("loaded scan {} with shape {:?}", path.display(), cube.shape());
        self.scan = Some(Arc::new(cube));
        self.scan_path = Some(path.to_path_buf());
        self.black.forget_located();
        self.white.forget_located();
        self.invalidate();
        warning
    }

    pub fn set_locator(&mut self, kind: ReferenceKind, locator: Option<ReferenceLocator>) {
        let slot = self.slot_mut(kind);
        slot.forget_located();
        slot.locator = locator;
        self.invalidate();
    }

    pub fn set_method(&mut self, kind: ReferenceKind, algorithm: Option<Algorithm>) {
        self.slot_mut(kind).method = algorithm.map(|a| ReferenceMethod::new(kind, a));
        self.invalidate();
    }

    /// Load a reference cube from a file through the manager's loader.
    pub fn set_reference_file(&mut self, kind: ReferenceKind, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let cube = self.loader.load(path)?;
        let slot = self.slot_mut(kind);
        slot.file = Some(path.to_path_buf());
        slot.data = Some(Arc::new(cube));
        slot.located = false;
        self.invalidate();
        Ok(())
    }

    /// Supply reference data directly (`None` clears it).
    pub fn set_reference_data(&mut self, kind: ReferenceKind, data: Option<SpectralCube>) {
        let slot = self.slot_mut(kind);
        slot.file = None;
        slot.data = data.map(Arc::new);
        slot.located = false;
        self.invalidate();
    }

    /// Bind a reference rectangle. With `in_scan` the rectangle refers into
    /// the scan itself, otherwise into the separately loaded reference data.
    pub fn set_annotation(&mut self, kind: ReferenceKind, annotation: Option<Rect>, in_scan: bool) {
        let slot = self.slot_mut(kind);
        slot.annotation = annotation;
        slot.annotation_in_scan = in_scan;
        slot.located = false;
        self.invalidate();
    }

    pub fn set_contours(&mut self, contours: ContourSet) {
        self.contours = contours;
        self.black.forget_located();
        self.white.forget_located();
        self.invalidate();
    }

    pub fn set_preprocessing(&mut self, chain: Option<PreprocessingChain>) {
        self.preprocessing = chain;
        self.invalidate();
    }

    pub fn set_normalization(&mut self, scheme: Box<dyn NormalizationScheme>) {
        self.normalization = scheme;
        self.invalidate();
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    /// Run the calibration pipeline unless its result is cached.
    ///
    /// Never fails: errors end the run early and show up as `false` entries
    /// in the outcome plus an error log. A cached result yields an empty
    /// outcome.
    pub fn calc_norm_data(&mut self) -> CalibrationOutcome {
        let mut outcome = CalibrationOutcome::default();
        if self.normalized.is_some() {
            tracing::debug!("normalized cube cached, skipping calibration");
            return outcome;
        }

        match self.run_pipeline(&mut outcome) {
            Ok(cube) => {
                tracing::info!("calibration finished with shape {:?}", cube.shape());
                self.normalized = Some(cube);
            }
            Err(e) => tracing::error!("calibration aborted: {e}"),
        }
        outcome
    }

    fn run_pipeline(&mut self, outcome: &mut CalibrationOutcome) -> Result<SpectralCube> {
        self.resolve_reference(ReferenceKind::Black, outcome)?;
        self.resolve_reference(ReferenceKind::White, outcome)?;

        let scan = self.scan.clone().ok_or(HyspecError::NoScan)?;
        let working = scan.data.clone();
        let working = self.apply_reference(ReferenceKind::Black, &scan, working, outcome)?;
        let working = self.apply_reference(ReferenceKind::White, &scan, working, outcome)?;

        let mut cube = SpectralCube::new(working, scan.wavelengths.clone());
        if let Some(chain) = self.preprocessing.as_mut() {
            cube = record(
                outcome,
                Stage::PreprocessorsApplied,
                run_chain(chain, cube, &self.contours),
            )?;
        }

        outcome.record(Stage::DimensionsDiffer, cube.shape() != scan.shape());
        Ok(cube)
    }

    /// Stages 1 and 2: dispatch the locator when no reference is resolved yet.
    fn resolve_reference(&mut self, kind: ReferenceKind, outcome: &mut CalibrationOutcome) -> Result<()> {
        let slot = self.slot(kind);
        if slot.locator.is_none() || slot.is_resolved() {
            return Ok(());
        }

        let located = record_with(outcome, Stage::reference_data(kind), self.locate(kind), |l| {
            !matches!(l, Located::Nothing)
        })?;

        let slot = self.slot_mut(kind);
        match located {
            Located::Nothing => {
                tracing::warn!("{} reference locator found nothing", kind.label());
            }
            Located::File(path, cube) => {
                tracing::info!("{} reference located at {}", kind.label(), path.display());
                slot.file = Some(path);
                slot.data = Some(Arc::new(cube));
                slot.located = true;
            }
            Located::Annotation(rect) => {
                tracing::info!("{} reference located in scan at {rect:?}", kind.label());
                slot.annotation = Some(rect);
                slot.annotation_in_scan = true;
                slot.located = true;
            }
        }
        Ok(())
    }

    fn locate(&self, kind: ReferenceKind) -> Result<Located> {
        let Some(locator) = &self.slot(kind).locator else {
            return Ok(Located::Nothing);
        };

        let path = match locator {
            ReferenceLocator::File(locator) => {
                let scan_path = self.scan_path.as_deref().ok_or(HyspecError::NoScan)?;
                locator.locate(scan_path)?
            }
            ReferenceLocator::Annotation(locator) => {
                let scan = self.scan.as_deref().ok_or(HyspecError::NoScan)?;
                let document = self.contours.export(scan.width(), scan.height());
                return Ok(match locator.locate(&document)? {
                    Some(object) => Located::Annotation(object.bbox),
                    None => Located::Nothing,
                });
            }
            ReferenceLocator::Generic(locator) => match locator.locate()? {
                Some(LocatorOutput::Path(path)) => Some(path),
                Some(LocatorOutput::Object(object)) => {
                    return Err(HyspecError::UnsupportedLocatorOutput(format!(
                        "annotation object '{}' from a generic locator",
                        object.label
                    )));
                }
                None => None,
            },
        };

        match path {
            Some(path) => {
                let cube = self.loader.load(&path)?;
                Ok(Located::File(path, cube))
            }
            None => Ok(Located::Nothing),
        }
    }

    /// Stages 4 and 5: bind whatever reference is available and correct the
    /// working cube.
    fn apply_reference(
        &mut self,
        kind: ReferenceKind,
        scan: &Arc<SpectralCube>,
        working: Array3<f32>,
        outcome: &mut CalibrationOutcome,
    ) -> Result<Array3<f32>> {
        let ReferenceSlot {
            method,
            data,
            annotation,
            annotation_in_scan,
            ..
        } = self.slot_mut(kind);
        let Some(method) = method.as_mut() else {
            return Ok(working);
        };

        let binding = match (*annotation, method.is_annotation_based()) {
            (Some(rect), true) => {
                let source = if *annotation_in_scan {
                    Some(Arc::clone(scan))
                } else {
                    data.clone()
                };
                Some(source.map(|reference| (reference, Some(rect))))
            }
            _ => data.clone().map(|reference| Some((reference, None))),
        };

        let Some(binding) = binding else {
            tracing::warn!(
                "{} reference method configured without reference data or annotation",
                kind.label()
            );
            return Ok(working);
        };

        let result = binding
            .ok_or_else(|| {
                HyspecError::config(format!(
                    "{} annotation refers to reference data that is not loaded",
                    kind.label()
                ))
            })
            .and_then(|(reference, rect)| {
                method.set_reference(reference);
                if let Some(rect) = rect {
                    method.set_annotation(rect);
                }
                method.apply(&working)
            });

        let corrected = record(outcome, Stage::reference_applied(kind), result)?;
        tracing::info!("{} reference applied", kind.label());
        Ok(corrected)
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Render bands `r`, `g`, `b` of the normalized cube into the display
    /// image. Indices past the last band clamp to it. A band whose
    /// normalization fails is shown raw.
    pub fn update_image(&mut self, r: usize, g: usize, b: usize) -> CalibrationOutcome {
        let outcome = self.calc_norm_data();
        self.display = None;

        let Some(cube) = self.normalized.as_ref() else {
            tracing::warn!("no normalized cube to render");
            return outcome;
        };
        let Some(last) = cube.bands().checked_sub(1) else {
            tracing::warn!("normalized cube has no bands to render");
            return outcome;
        };

        let ctx = NormalizationContext {
            annotations: self.contours.has_annotations().then_some(&self.contours),
        };
        let channels: [Array2<f32>; 3] = [(Channel::Red, r), (Channel::Green, g), (Channel::Blue, b)]
            .map(|(channel, index)| {
                let band = cube.band(index.min(last));
                match self.normalization.normalize(band, channel, &ctx) {
                    Ok(normalized) => normalized,
                    Err(e) => {
                        tracing::warn!(
                            "{} normalization of {channel:?} failed, showing raw band: {e}",
                            self.normalization.name()
                        );
                        band.to_owned()
                    }
                }
            });

        match display::stack_channels(&channels) {
            Ok(rgb) => self.display = Some(display::to_rgb8(&rgb)),
            Err(e) => tracing::error!("could not assemble display image: {e}"),
        }
        outcome
    }

    /// Render, resize to `width × height` and write the display image.
    pub fn output_image(
        &mut self,
        r: usize,
        g: usize,
        b: usize,
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
    ) -> Result<CalibrationOutcome> {
        let outcome = self.update_image(r, g, b);
        let image = match (&self.display, &self.scan) {
            (Some(image), _) => image,
            (None, None) => return Err(HyspecError::NoScan),
            (None, Some(_)) => {
                return Err(HyspecError::config("calibration failed, nothing to render"));
            }
        };
        display::save_resized(image, path.as_ref(), width, height)?;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Human-readable summary of scan, references and wavelengths.
    pub fn state_dump(&self) -> String {
        let mut out = String::new();
        describe_cube(&mut out, "scan", self.scan_path.as_deref(), self.scan.as_deref());
        for kind in [ReferenceKind::Black, ReferenceKind::White] {
            let slot = self.slot(kind);
            describe_cube(&mut out, kind.label(), slot.file.as_deref(), slot.data.as_deref());
            if let Some(rect) = slot.annotation {
                let place = if slot.annotation_in_scan { "scan" } else { "reference" };
                let _ = writeln!(out, "{} annotation: {rect:?} in {place}", kind.label());
            }
            if let Some(method) = &slot.method {
                let _ = writeln!(out, "{} method: {:?}", kind.label(), method.algorithm());
            }
        }
        if let Some(cube) = &self.normalized {
            describe_cube(&mut out, "normalized", None, Some(cube));
        }
        let _ = writeln!(out, "normalization: {}", self.normalization.name());
        if let Some(chain) = &self.preprocessing {
            let _ = writeln!(out, "preprocessing: {}", chain.names().join(" -> "));
        }
        if let Some(scan) = &self.scan {
            let _ = writeln!(out, "wavelengths:");
            for (band, wl) in scan.wavelengths.iter().enumerate() {
                let _ = writeln!(out, "  {band:>4}: {wl:.2} nm");
            }
        }
        out
    }
}

fn describe_cube(out: &mut String, name: &str, file: Option<&Path>, cube: Option<&SpectralCube>) {
    let file = file
        .and_then(|f| f.file_name())
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "-".to_string());
    match cube {
        Some(cube) => {
            let (lo, hi) = cube.min_max().unwrap_or((f32::NAN, f32::NAN));
            let _ = writeln!(
                out,
                "{name}: {file} shape {:?} min {lo} max {hi}",
                cube.shape()
            );
        }
        None => {
            let _ = writeln!(out, "{name}: {file} (not loaded)");
        }
    }
}

fn run_chain(
    chain: &mut PreprocessingChain,
    cube: SpectralCube,
    contours: &ContourSet,
) -> Result<SpectralCube> {
    chain.attach_annotations(contours.has_annotations().then_some(contours));
    chain.fit(&cube)?;
    let mut outputs = chain.apply(&cube)?;
    if outputs.len() > 1 {
        tracing::warn!(
            "preprocessing produced {} cubes, expected one; keeping the first",
            outputs.len()
        );
    }
    if outputs.is_empty() {
        return Err(HyspecError::Preprocessing("chain produced no output".into()));
    }
    tracing::info!("preprocessing applied: {}", chain.names().join(" -> "));
    Ok(outputs.swap_remove(0))
}

/// Record whether a stage succeeded and pass its result on.
fn record<T>(outcome: &mut CalibrationOutcome, stage: Stage, result: Result<T>) -> Result<T> {
    record_with(outcome, stage, result, |_| true)
}

fn record_with<T>(
    outcome: &mut CalibrationOutcome,
    stage: Stage,
    result: Result<T>,
    succeeded: impl FnOnce(&T) -> bool,
) -> Result<T> {
    match &result {
        Ok(value) => outcome.record(stage, succeeded(value)),
        Err(e) => {
            tracing::error!("{stage} failed: {e}");
            outcome.record(stage, false);
        }
    }
    result
}
