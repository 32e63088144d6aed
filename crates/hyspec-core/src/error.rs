//! Error types shared by every calibration component.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HyspecError>;

#[derive(Debug, thiserror::Error)]
pub enum HyspecError {
    /// A required setting (reference, annotation, pattern, label) is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid cube file {}: {reason}", path.display())]
    InvalidCube { path: PathBuf, reason: String },

    /// A generic locator produced something other than a file path.
    #[error("unsupported locator output: {0}")]
    UnsupportedLocatorOutput(String),

    #[error("normalization failed: {0}")]
    Normalization(String),

    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("array shape error: {0}")]
    Array(#[from] ndarray::ShapeError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("no scan loaded")]
    NoScan,
}

impl HyspecError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn shape(context: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
