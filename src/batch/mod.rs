//! Batch conversion of several independent source/destination pairs.
//!
//! Jobs run one after another. A job that fails is recorded in the summary
//! and the next job still runs.

mod config;

pub use config::{BatchConfig, JobConfig, JobKind, WriterSettings};

use std::fmt;
use std::path::Path;

use crate::converter::{convert_geoip_file, convert_geosite_file, ConvertOptions};
use crate::error::{Error, Result};
use crate::mmdb::WriterOptions;
use crate::report::{GeoIpReport, GeoSiteReport};

/// Report of a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    GeoSite(GeoSiteReport),
    GeoIp(GeoIpReport),
}

impl JobReport {
    /// Where the job wrote its output.
    pub fn output(&self) -> Option<&Path> {
        match self {
            JobReport::GeoSite(r) => r.output.as_deref(),
            JobReport::GeoIp(r) => r.output.as_deref(),
        }
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobReport::GeoSite(r) => fmt::Display::fmt(r, f),
            JobReport::GeoIp(r) => fmt::Display::fmt(r, f),
        }
    }
}

/// Outcome of one job.
#[derive(Debug)]
pub struct JobResult {
    pub label: String,
    pub kind: JobKind,
    pub outcome: Result<JobReport>,
}

/// Outcomes of all jobs, in config order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    /// Number of jobs that completed.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    /// Jobs that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.label.as_str(), e)))
    }

    /// Whether every job completed.
    pub fn is_success(&self) -> bool {
        self.succeeded() == self.results.len()
    }
}

/// Run one job.
pub fn run_job(job: &JobConfig, writer: &WriterOptions) -> Result<JobReport> {
    let output = job.output_path();
    match job.kind {
        JobKind::GeoSite => convert_geosite_file(&job.input, &output).map(JobReport::GeoSite),
        JobKind::GeoIp => {
            let options = ConvertOptions {
                strict: job.strict,
                writer: writer.clone(),
            };
            convert_geoip_file(&job.input, &output, &options).map(JobReport::GeoIp)
        }
    }
}

/// Run every job of a batch, isolating failures.
pub fn run(config: &BatchConfig) -> BatchSummary {
    let writer: WriterOptions = config.writer.clone().into();
    let mut summary = BatchSummary::default();

    for job in &config.jobs {
        let label = job.label();
        log::info!("Running {} job {}", job.kind, label);

        let outcome = run_job(job, &writer);
        if let Err(e) = &outcome {
            log::error!("Job {} failed: {}", label, e);
        }

        summary.results.push(JobResult {
            label,
            kind: job.kind,
            outcome,
        });
    }

    summary
}
