//! Per-stage success flags of one calibration run.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::reference::ReferenceKind;

/// A pipeline stage that reports success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BlackReferenceDataInitialized,
    WhiteReferenceDataInitialized,
    BlackReferenceApplied,
    WhiteReferenceApplied,
    PreprocessorsApplied,
    DimensionsDiffer,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BlackReferenceDataInitialized => "black_reference_data_initialized",
            Self::WhiteReferenceDataInitialized => "white_reference_data_initialized",
            Self::BlackReferenceApplied => "black_reference_applied",
            Self::WhiteReferenceApplied => "white_reference_applied",
            Self::PreprocessorsApplied => "preprocessors_applied",
            Self::DimensionsDiffer => "dimensions_differ",
        }
    }

    pub const fn reference_data(kind: ReferenceKind) -> Self {
        match kind {
            ReferenceKind::Black => Self::BlackReferenceDataInitialized,
            ReferenceKind::White => Self::WhiteReferenceDataInitialized,
        }
    }

    pub const fn reference_applied(kind: ReferenceKind) -> Self {
        match kind {
            ReferenceKind::Black => Self::BlackReferenceApplied,
            ReferenceKind::White => Self::WhiteReferenceApplied,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage → success map, rebuilt on every run. An empty outcome means the
/// cached result was reused and nothing ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CalibrationOutcome(BTreeMap<Stage, bool>);

impl CalibrationOutcome {
    pub fn get(&self, stage: Stage) -> Option<bool> {
        self.0.get(&stage).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, bool)> + '_ {
        self.0.iter().map(|(s, ok)| (*s, *ok))
    }

    pub(crate) fn record(&mut self, stage: Stage, ok: bool) {
        self.0.insert(stage, ok);
    }
}
