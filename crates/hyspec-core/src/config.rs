//! Serializable pipeline configuration.
//!
//! Strategies are selected by name through internally tagged enums
//! (`"kind": "..."`). A config is validated while it is built, so a broken
//! file never leaves a [`CalibrationManager`] half configured.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::annotation::{BLACK_REFERENCE_LABEL, Rect, WHITE_REFERENCE_LABEL};
use crate::error::{HyspecError, Result};
use crate::locator::ReferenceLocator;
use crate::manager::CalibrationManager;
use crate::normalize::{
    Channel, FixedNormalization, NoNormalization, NormalizationScheme, ObjectNormalization,
    RegionNormalization, SimpleNormalization, ValueRange,
};
use crate::preprocess::{
    AnnotationCrop, BandRange, Binning, Crop, Derivative, Pad, PreprocessingChain, Preprocessor,
    Standardize, Tiles,
};
use crate::reference::{Algorithm, ReferenceKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocatorConfig {
    FilePattern {
        #[serde(default)]
        pattern: Option<String>,
    },
    /// Defaults to the reference-marker label of the side it serves.
    Annotation {
        #[serde(default)]
        label: Option<String>,
    },
    Fixed {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    Manual,
}

impl LocatorConfig {
    pub fn build(&self, kind: ReferenceKind) -> Result<ReferenceLocator> {
        match self {
            Self::FilePattern { pattern } => {
                let pattern = pattern
                    .as_deref()
                    .ok_or_else(|| HyspecError::config("file_pattern locator requires 'pattern'"))?;
                ReferenceLocator::file_pattern(pattern)
            }
            Self::Annotation { label } => {
                let default = match kind {
                    ReferenceKind::Black => BLACK_REFERENCE_LABEL,
                    ReferenceKind::White => WHITE_REFERENCE_LABEL,
                };
                ReferenceLocator::annotation_label(label.as_deref().unwrap_or(default))
            }
            Self::Fixed { path } => {
                let path = path
                    .clone()
                    .ok_or_else(|| HyspecError::config("fixed locator requires 'path'"))?;
                ReferenceLocator::fixed(path)
            }
            Self::Manual => Ok(ReferenceLocator::manual()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default)]
    pub locator: Option<LocatorConfig>,
    #[serde(default)]
    pub method: Option<Algorithm>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationConfig {
    #[default]
    Simple,
    Fixed {
        min: f32,
        max: f32,
        #[serde(default)]
        red: Option<ValueRange>,
        #[serde(default)]
        green: Option<ValueRange>,
        #[serde(default)]
        blue: Option<ValueRange>,
    },
    Region {
        region: Rect,
    },
    ObjectAnnotations {
        #[serde(default)]
        excluded_labels: Option<Vec<String>>,
    },
    None,
}

impl NormalizationConfig {
    pub fn build(&self) -> Result<Box<dyn NormalizationScheme>> {
        Ok(match self {
            Self::Simple => Box::new(SimpleNormalization),
            Self::Fixed {
                min,
                max,
                red,
                green,
                blue,
            } => {
                if min > max {
                    return Err(HyspecError::config(format!(
                        "fixed normalization range is inverted ({min} > {max})"
                    )));
                }
                let mut scheme = FixedNormalization::new(*min, *max);
                for (channel, range) in Channel::ALL.into_iter().zip([red, green, blue]) {
                    if let Some(range) = range {
                        scheme = scheme.with_channel(channel, range.min, range.max);
                    }
                }
                Box::new(scheme)
            }
            Self::Region { region } => {
                if region.is_empty() {
                    return Err(HyspecError::config("region normalization needs a non-empty region"));
                }
                Box::new(RegionNormalization { region: *region })
            }
            Self::ObjectAnnotations { excluded_labels } => match excluded_labels {
                Some(labels) => Box::new(ObjectNormalization::with_excluded_labels(labels.clone())),
                None => Box::new(ObjectNormalization::default()),
            },
            Self::None => Box::new(NoNormalization),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreprocessorConfig {
    Crop {
        region: Rect,
    },
    Pad {
        #[serde(default)]
        top: usize,
        #[serde(default)]
        bottom: usize,
        #[serde(default)]
        left: usize,
        #[serde(default)]
        right: usize,
        #[serde(default)]
        value: f32,
    },
    BandRange {
        min_wavelength: f32,
        max_wavelength: f32,
    },
    Binning {
        factor: usize,
    },
    Derivative,
    Standardize,
    AnnotationCrop {
        #[serde(default)]
        margin: usize,
    },
    Tiles {
        rows: usize,
        cols: usize,
    },
}

impl PreprocessorConfig {
    pub fn build(&self) -> Result<Box<dyn Preprocessor>> {
        Ok(match *self {
            Self::Crop { region } => Box::new(Crop { region }),
            Self::Pad {
                top,
                bottom,
                left,
                right,
                value,
            } => Box::new(Pad {
                top,
                bottom,
                left,
                right,
                value,
            }),
            Self::BandRange {
                min_wavelength,
                max_wavelength,
            } => {
                if min_wavelength > max_wavelength {
                    return Err(HyspecError::config("band_range minimum exceeds maximum"));
                }
                Box::new(BandRange {
                    min_wavelength,
                    max_wavelength,
                })
            }
            Self::Binning { factor } => {
                if factor == 0 {
                    return Err(HyspecError::config("binning factor must be at least 1"));
                }
                Box::new(Binning { factor })
            }
            Self::Derivative => Box::new(Derivative),
            Self::Standardize => Box::new(Standardize::new()),
            Self::AnnotationCrop { margin } => Box::new(AnnotationCrop::new(margin)),
            Self::Tiles { rows, cols } => {
                if rows == 0 || cols == 0 {
                    return Err(HyspecError::config("tiles needs at least one row and column"));
                }
                Box::new(Tiles { rows, cols })
            }
        })
    }
}

/// Everything needed to set up a [`CalibrationManager`] apart from the scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub black: ReferenceConfig,
    #[serde(default)]
    pub white: ReferenceConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub preprocessing: Vec<PreprocessorConfig>,
}

/// Validated strategy values ready to hand to a manager.
#[derive(Debug)]
pub struct BuiltPipeline {
    pub black_locator: Option<ReferenceLocator>,
    pub white_locator: Option<ReferenceLocator>,
    pub black_method: Option<Algorithm>,
    pub white_method: Option<Algorithm>,
    pub normalization: Box<dyn NormalizationScheme>,
    pub preprocessing: Option<PreprocessingChain>,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| HyspecError::config(format!("invalid pipeline config: {e}")))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| HyspecError::io(path, e))?;
        serde_json::from_str(&text).map_err(|source| HyspecError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn build(&self) -> Result<BuiltPipeline> {
        let locator = |config: &ReferenceConfig, kind| {
            config.locator.as_ref().map(|l| l.build(kind)).transpose()
        };

        let steps = self
            .preprocessing
            .iter()
            .map(PreprocessorConfig::build)
            .collect::<Result<Vec<_>>>()?;

        Ok(BuiltPipeline {
            black_locator: locator(&self.black, ReferenceKind::Black)?,
            white_locator: locator(&self.white, ReferenceKind::White)?,
            black_method: self.black.method,
            white_method: self.white.method,
            normalization: self.normalization.build()?,
            preprocessing: (!steps.is_empty()).then(|| PreprocessingChain::new(steps)),
        })
    }

    /// Build, then install every strategy on `manager` through its setters.
    pub fn apply(&self, manager: &mut CalibrationManager) -> Result<()> {
        let built = self.build()?;
        manager.set_locator(ReferenceKind::Black, built.black_locator);
        manager.set_locator(ReferenceKind::White, built.white_locator);
        manager.set_method(ReferenceKind::Black, built.black_method);
        manager.set_method(ReferenceKind::White, built.white_method);
        manager.set_normalization(built.normalization);
        manager.set_preprocessing(built.preprocessing);
        tracing::debug!("pipeline configuration applied");
        Ok(())
    }
}
