//! Runtime configuration for the converter.

use std::path::PathBuf;

/// Default log filter when `HYSPEC_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";
/// Default job file when neither an argument nor `HYSPEC_JOB` names one.
const DEFAULT_JOB_FILE: &str = "hyspec-job.json";

/// Process-level settings, read from the environment and command line.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `tracing-subscriber` filter directive.
    pub log_filter: String,
    /// Job description to run.
    pub job_file: PathBuf,
}

impl AppConfig {
    /// The first command-line argument overrides `HYSPEC_JOB`.
    pub fn from_env(arg: Option<String>) -> Self {
        Self {
            log_filter: std::env::var("HYSPEC_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            job_file: arg
                .or_else(|| std::env::var("HYSPEC_JOB").ok())
                .unwrap_or_else(|| DEFAULT_JOB_FILE.to_string())
                .into(),
        }
    }
}
