//! Batch job: calibrate a list of scans and write one RGB preview each.

use std::path::{Path, PathBuf};

use hyspec_core::{
    CalibrationManager, ContourSet, HyspecError, JsonCubeLoader, PipelineConfig, ReferenceKind,
};
use serde::Deserialize;

const DEFAULT_BANDS: [usize; 3] = [0, 1, 2];
const DEFAULT_SIZE: u32 = 512;

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertJob {
    pub scans: Vec<ScanEntry>,
    pub output_dir: PathBuf,
    /// Band indices rendered into red, green and blue.
    #[serde(default = "default_bands")]
    pub bands: [usize; 3],
    #[serde(default = "default_size")]
    pub width: u32,
    #[serde(default = "default_size")]
    pub height: u32,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_bands() -> [usize; 3] {
    DEFAULT_BANDS
}

fn default_size() -> u32 {
    DEFAULT_SIZE
}

/// One scan plus whatever is known about its references up front.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub black: Option<PathBuf>,
    #[serde(default)]
    pub white: Option<PathBuf>,
    #[serde(default)]
    pub annotations: Option<ContourSet>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("failed to read job file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse job file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Calibration(#[from] HyspecError),
}

/// Summary of a finished batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobReport {
    pub written: usize,
    pub skipped: usize,
}

impl ConvertJob {
    pub fn load(path: &Path) -> Result<Self, JobError> {
        let text = std::fs::read_to_string(path).map_err(|source| JobError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| JobError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Output path of the preview for `scan`.
    pub fn output_path(&self, scan: &Path) -> PathBuf {
        let stem = scan.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        self.output_dir.join(format!("{stem}.png"))
    }

    /// Run every scan through one manager. A scan that cannot be loaded or
    /// rendered is skipped; pipeline configuration errors end the batch.
    pub fn run(&self) -> Result<JobReport, JobError> {
        let mut manager = CalibrationManager::new(Box::new(JsonCubeLoader));
        self.pipeline.apply(&mut manager)?;
        std::fs::create_dir_all(&self.output_dir).map_err(|source| JobError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })?;

        let mut report = JobReport::default();
        for entry in &self.scans {
            match self.convert(&mut manager, entry) {
                Ok(true) => report.written += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::error!("{}: {e}", entry.path.display());
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }

    fn convert(&self, manager: &mut CalibrationManager, entry: &ScanEntry) -> Result<bool, HyspecError> {
        // A failed load keeps the previous scan in place.
        if manager.load_scan(&entry.path).is_some() && manager.scan_path() != Some(entry.path.as_path()) {
            tracing::warn!("skipping {}", entry.path.display());
            return Ok(false);
        }

        manager.set_contours(entry.annotations.clone().unwrap_or_default());
        for (kind, file) in [
            (ReferenceKind::Black, &entry.black),
            (ReferenceKind::White, &entry.white),
        ] {
            match file {
                Some(file) => manager.set_reference_file(kind, file)?,
                None => manager.set_reference_data(kind, None),
            }
        }

        let [r, g, b] = self.bands;
        let output = self.output_path(&entry.path);
        let outcome = manager.output_image(r, g, b, &output, self.width, self.height)?;
        match serde_json::to_string(&outcome) {
            Ok(json) => tracing::info!("{} -> {}: {json}", entry.path.display(), output.display()),
            Err(e) => tracing::warn!("could not serialize outcome: {e}"),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_defaults() {
        let job: ConvertJob = serde_json::from_str(
            r#"{ "scans": [ { "path": "a/leaf.json" } ], "output_dir": "out" }"#,
        )
        .unwrap();
        assert_eq!(job.bands, DEFAULT_BANDS);
        assert_eq!((job.width, job.height), (DEFAULT_SIZE, DEFAULT_SIZE));
        assert_eq!(job.pipeline, PipelineConfig::default());
        assert_eq!(job.output_path(&job.scans[0].path), PathBuf::from("out/leaf.png"));
    }

    #[test]
    fn test_job_with_pipeline() {
        let job: ConvertJob = serde_json::from_str(
            r#"{
                "scans": [ { "path": "leaf.json", "white": "leaf_white.json" } ],
                "output_dir": "out",
                "bands": [30, 20, 10],
                "pipeline": { "white": { "method": "average" },
                              "normalization": { "kind": "none" } }
            }"#,
        )
        .unwrap();
        assert_eq!(job.bands, [30, 20, 10]);
        assert_eq!(job.scans[0].white, Some(PathBuf::from("leaf_white.json")));
        assert!(job.pipeline.build().is_ok());
    }
}
