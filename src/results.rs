use crate::equivalence::{SampleEquivalence, SignificanceLevel, Threshold};
use crate::histogram::HistogramFeed;
use crate::metrics::{Metrics, Quartiles, Sample};
use crate::sampler::{Endpoint, RequestAttempt};
use crate::utils::uri_slug;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Everything collected for one endpoint
#[derive(Debug, Clone)]
pub struct EndpointResult {
    pub endpoint: Endpoint,
    /// Ordered by attempt index
    pub attempts: Vec<RequestAttempt>,
    pub sample: Option<Sample>,
    pub metrics: Option<Metrics>,
}

impl EndpointResult {
    /// Build the result from recorded attempts; the sample is made of the
    /// successful durations in attempt order.
    pub fn from_attempts(endpoint: Endpoint, attempts: Vec<RequestAttempt>) -> Self {
        let durations = attempts
            .iter()
            .filter(|a| a.is_success())
            .map(RequestAttempt::duration_ms)
            .collect();
        let sample = Sample::new(durations);
        let metrics = sample.as_ref().map(Metrics::of);
        Self {
            endpoint,
            attempts,
            sample,
            metrics,
        }
    }

    /// Result for an endpoint whose sampling could not run at all.
    pub fn empty(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            attempts: Vec::new(),
            sample: None,
            metrics: None,
        }
    }

    pub fn has_sample(&self) -> bool {
        self.sample.is_some()
    }

    pub fn success_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.attempts.len() - self.success_count()
    }
}

/// Ranked outcome of a whole run
#[derive(Debug, Clone)]
pub struct ProjectResult {
    /// In benchmark order, fastest first
    pub results: Vec<EndpointResult>,
    /// `ranks[i]` belongs to `results[i]`
    pub ranks: Vec<usize>,
    pub cancelled: bool,
}

impl ProjectResult {
    pub fn ranked(&self) -> impl Iterator<Item = (usize, &EndpointResult)> {
        self.ranks.iter().copied().zip(self.results.iter())
    }
}

/// System information for reproducibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub benchmark_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub cancelled: bool,
    /// Settings of the predicate that decided shared ranks
    pub equivalence_threshold: Threshold,
    pub equivalence_significance: SignificanceLevel,
}

/// Descriptive statistics as written to the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub count: usize,
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub std_err: f64,
    /// Q0 through Q4
    pub quartiles: Quartiles,
    pub iqr: f64,
}

impl From<&Metrics> for StatisticsReport {
    fn from(metrics: &Metrics) -> Self {
        Self {
            count: metrics.count,
            mean: metrics.mean,
            variance: metrics.variance,
            std_dev: metrics.std_dev,
            std_err: metrics.std_err,
            quartiles: metrics.quartiles,
            iqr: metrics.iqr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointReport {
    pub index: usize,
    pub uri: String,
    pub rank: usize,
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub statistics: Option<StatisticsReport>,
}

/// The report artifact of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub metadata: ReportMetadata,
    /// In benchmark order
    pub endpoints: Vec<EndpointReport>,
    pub ranks: Vec<usize>,
}

impl ProjectReport {
    pub fn new(project: &ProjectResult, equivalence: &SampleEquivalence) -> Self {
        let endpoints = project
            .ranked()
            .map(|(rank, result)| EndpointReport {
                index: result.endpoint.index,
                uri: result.endpoint.uri.to_string(),
                rank,
                attempts: result.attempts.len(),
                successes: result.success_count(),
                failures: result.failure_count(),
                statistics: result.metrics.as_ref().map(StatisticsReport::from),
            })
            .collect();

        Self {
            metadata: ReportMetadata {
                run_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                system_info: SystemInfo::collect(),
                cancelled: project.cancelled,
                equivalence_threshold: equivalence.threshold,
                equivalence_significance: equivalence.significance,
            },
            endpoints,
            ranks: project.ranks.clone(),
        }
    }
}

/// Per-run output directory name: `<day of year>_<HH-MM-SS>`.
pub fn dated_output_dir(root: &Path, at: DateTime<Local>) -> PathBuf {
    root.join(format!("{}_{}", at.ordinal(), at.format("%H-%M-%S")))
}

/// Writes run artifacts into one output directory
pub struct ResultsManager {
    output_dir: PathBuf,
}

impl ResultsManager {
    /// Create the manager, creating `output_dir` if needed.
    pub fn new(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;
        debug!("Output directory: {:?}", output_dir);
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn write_report(&self, report: &ProjectReport) -> Result<PathBuf> {
        let path = self.output_dir.join(crate::defaults::REPORT_FILE);
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
        info!("Report written to: {:?}", path);
        Ok(path)
    }

    /// Write one histogram feed per endpoint that has a sample.
    pub fn write_histograms(&self, project: &ProjectResult) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for result in &project.results {
            let Some(sample) = &result.sample else {
                continue;
            };
            let uri = result.endpoint.uri.as_str();
            let feed = HistogramFeed::new(result.endpoint.index, uri, sample);
            let path = self.output_dir.join(format!(
                "{}-{}.histogram.json",
                result.endpoint.index,
                uri_slug(uri)
            ));
            let json = serde_json::to_string_pretty(&feed)?;
            fs::write(&path, json)
                .with_context(|| format!("Failed to write histogram to {:?}", path))?;
            debug!("Histogram written to: {:?}", path);
            written.push(path);
        }
        Ok(written)
    }
}
