//! Hyspec Convert: batch calibration of hyperspectral scans into RGB
//! previews.
//!
//! Reads a JSON job (first argument, `HYSPEC_JOB`, or `hyspec-job.json`),
//! runs every scan through one calibration manager and writes a PNG per
//! scan. Log verbosity follows `HYSPEC_LOG`.

mod config;
mod job;

use std::process::ExitCode;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::job::ConvertJob;

fn init_logging(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
        eprintln!("invalid HYSPEC_LOG filter '{filter}': {e}");
        EnvFilter::new(config::DEFAULT_LOG_FILTER)
    });
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn main() -> ExitCode {
    let config = AppConfig::from_env(std::env::args().nth(1));
    init_logging(&config.log_filter);

    let result = ConvertJob::load(&config.job_file).and_then(|job| {
        tracing::info!(
            "converting {} scans into {}",
            job.scans.len(),
            job.output_dir.display()
        );
        job.run()
    });

    match result {
        Ok(report) => {
            tracing::info!("{} written, {} skipped", report.written, report.skipped);
            if report.skipped == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
