//! Reference locators: strategies that propose where a black or white
//! reference lives for a given scan.
//!
//! A locator's capability is fixed when it is constructed:
//! - **file-based** locators derive a reference path from the scan path,
//! - **annotation-based** locators pick a labeled object out of the scan's
//!   exported annotations,
//! - **generic** locators need no context and may return anything; the
//!   orchestrator only accepts file paths from them.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::annotation::{AnnotatedObject, AnnotationDocument};
use crate::error::{HyspecError, Result};

/// Something a generic locator can hand back.
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorOutput {
    Path(PathBuf),
    Object(AnnotatedObject),
}

pub trait FileLocator: fmt::Debug {
    /// Propose a reference file for the scan at `scan_path`.
    fn locate(&self, scan_path: &Path) -> Result<Option<PathBuf>>;
}

pub trait AnnotationLocator: fmt::Debug {
    /// Pick the reference object out of `document`.
    fn locate<'a>(&self, document: &'a AnnotationDocument) -> Result<Option<&'a AnnotatedObject>>;
}

pub trait GenericLocator: fmt::Debug {
    fn locate(&self) -> Result<Option<LocatorOutput>>;
}

/// Which context a locator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorCapability {
    FileBased,
    AnnotationBased,
    Generic,
}

/// A locator tagged with its capability.
#[derive(Debug)]
pub enum ReferenceLocator {
    File(Box<dyn FileLocator>),
    Annotation(Box<dyn AnnotationLocator>),
    Generic(Box<dyn GenericLocator>),
}

impl ReferenceLocator {
    /// Sibling-file locator; see [`FilePatternLocator`] for placeholders.
    pub fn file_pattern(pattern: &str) -> Result<Self> {
        Ok(Self::File(Box::new(FilePatternLocator::new(pattern)?)))
    }

    pub fn annotation_label(label: &str) -> Result<Self> {
        Ok(Self::Annotation(Box::new(LabelLocator::new(label)?)))
    }

    pub fn fixed(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::Generic(Box::new(FixedLocator::new(path)?)))
    }

    pub fn manual() -> Self {
        Self::Generic(Box::new(ManualLocator))
    }

    pub fn capability(&self) -> LocatorCapability {
        match self {
            Self::File(_) => LocatorCapability::FileBased,
            Self::Annotation(_) => LocatorCapability::AnnotationBased,
            Self::Generic(_) => LocatorCapability::Generic,
        }
    }
}

/// Derives a reference path by substituting parts of the scan path into a
/// template.
///
/// Placeholders: `{dir}` (parent directory, `.` when absent), `{name}`
/// (file stem) and `{ext}` (extension without the dot). With the pattern
/// `{dir}/{name}_white.{ext}`, `/data/leaf.hdr` maps to
/// `/data/leaf_white.hdr`.
#[derive(Debug, Clone)]
pub struct FilePatternLocator {
    pattern: String,
}

impl FilePatternLocator {
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty() {
            return Err(HyspecError::config("file-pattern locator requires a pattern"));
        }
        Ok(Self {
            pattern: pattern.to_string(),
        })
    }
}

impl FileLocator for FilePatternLocator {
    fn locate(&self, scan_path: &Path) -> Result<Option<PathBuf>> {
        let Some(stem) = scan_path.file_stem() else {
            return Err(HyspecError::config(format!(
                "scan path {} has no file name",
                scan_path.display()
            )));
        };
        let dir = match scan_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy(),
            _ => ".".into(),
        };
        let ext = scan_path
            .extension()
            .map(|e| e.to_string_lossy())
            .unwrap_or_default();

        let located = self
            .pattern
            .replace("{dir}", &dir)
            .replace("{name}", &stem.to_string_lossy())
            .replace("{ext}", &ext);
        Ok(Some(PathBuf::from(located)))
    }
}

/// Returns the first annotated object carrying a given label.
#[derive(Debug, Clone)]
pub struct LabelLocator {
    label: String,
}

impl LabelLocator {
    pub fn new(label: &str) -> Result<Self> {
        if label.trim().is_empty() {
            return Err(HyspecError::config("annotation locator requires a label"));
        }
        Ok(Self {
            label: label.to_string(),
        })
    }
}

impl AnnotationLocator for LabelLocator {
    fn locate<'a>(&self, document: &'a AnnotationDocument) -> Result<Option<&'a AnnotatedObject>> {
        Ok(document.find(&self.label))
    }
}

/// Always proposes the same path.
#[derive(Debug, Clone)]
pub struct FixedLocator {
    path: PathBuf,
}

impl FixedLocator {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(HyspecError::config("fixed locator requires a path"));
        }
        Ok(Self { path })
    }
}

impl GenericLocator for FixedLocator {
    fn locate(&self) -> Result<Option<LocatorOutput>> {
        Ok(Some(LocatorOutput::Path(self.path.clone())))
    }
}

/// Never proposes anything; the reference is supplied by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualLocator;

impl GenericLocator for ManualLocator {
    fn locate(&self) -> Result<Option<LocatorOutput>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Contour, ContourSet, Rect};

    #[test]
    fn test_file_pattern_substitutes_placeholders() {
        let locator = FilePatternLocator::new("{dir}/{name}_white.{ext}").unwrap();
        let found = locator.locate(Path::new("/data/leaf.json")).unwrap();
        assert_eq!(found, Some(PathBuf::from("/data/leaf_white.json")));
    }

    #[test]
    fn test_file_pattern_relative_scan_uses_current_dir() {
        let locator = FilePatternLocator::new("{dir}/dark_{name}.{ext}").unwrap();
        let found = locator.locate(Path::new("scan.json")).unwrap();
        assert_eq!(found, Some(PathBuf::from("./dark_scan.json")));
    }

    #[test]
    fn test_missing_settings_are_configuration_errors() {
        assert!(matches!(
            ReferenceLocator::file_pattern("  "),
            Err(HyspecError::Configuration(_))
        ));
        assert!(matches!(
            ReferenceLocator::annotation_label(""),
            Err(HyspecError::Configuration(_))
        ));
        assert!(ReferenceLocator::fixed("").is_err());
    }

    #[test]
    fn test_label_locator_picks_labeled_object() {
        let set = ContourSet::new(vec![
            Contour::from_rect("leaf", Rect::new(0, 0, 2, 2)),
            Contour::from_rect("white_reference", Rect::new(1, 3, 4, 6)),
        ]);
        let doc = set.export(8, 8);
        let locator = LabelLocator::new("white_reference").unwrap();
        let found = locator.locate(&doc).unwrap().unwrap();
        assert_eq!(found.bbox, Rect::new(1, 3, 4, 6));

        let absent = LabelLocator::new("black_reference").unwrap();
        assert!(absent.locate(&doc).unwrap().is_none());
    }

    #[test]
    fn test_generic_locators() {
        let fixed = FixedLocator::new("/refs/white.json").unwrap();
        assert_eq!(
            fixed.locate().unwrap(),
            Some(LocatorOutput::Path(PathBuf::from("/refs/white.json")))
        );
        assert_eq!(ManualLocator.locate().unwrap(), None);
        assert_eq!(ReferenceLocator::manual().capability(), LocatorCapability::Generic);
    }
}
