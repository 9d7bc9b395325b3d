//! # Benchmark Engine Module
//!
//! Orchestrates a complete run over a list of URLs: validation of the input,
//! sequential sampling of each endpoint, isolation of per-endpoint failures,
//! and the final ranking.
//!
//! ## Key Components
//!
//! - **BenchmarkConfig**: Parameters shared by every endpoint of a run
//! - **BenchmarkRunner**: Drives the [`RequestSampler`] for each endpoint and
//!   ranks the results
//!
//! ## Run Lifecycle
//!
//! 1. **Input filtering**: Strings that are not absolute URLs are dropped
//! 2. **Validation**: Invalid configuration is the only fatal error
//! 3. **Sampling**: Endpoints are measured one after another, each sampler in
//!    its own task so a panic cannot take the run down
//! 4. **Ranking**: All collected results are sorted and ranked, including
//!    after a cancellation
//!
//! ## Progress
//!
//! The runner owns the notion of "total work": the number of valid endpoints
//! times the attempt count. [`BenchmarkRunner::progress_channel`] creates a
//! channel sized accordingly.

use crate::{
    cancel::CancelToken,
    cli::Args,
    equivalence::SampleEquivalence,
    progress::{progress_channel, Notice, ProgressReceiver, ProgressReporter},
    ranking::rank_results,
    results::{EndpointResult, ProjectResult},
    sampler::{Endpoint, RequestSampler, SamplerConfig},
    transport::{HttpTransportConfig, Transport},
    utils::{format_duration, validate_attempt_count, validate_concurrency, validate_warmup},
};
use anyhow::{Context, Result};
use reqwest::Url;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A helper struct to display the run configuration in one consistent block.
struct BenchmarkConfigDisplay<'a> {
    config: &'a BenchmarkConfig,
    endpoint_count: usize,
    transport_name: &'static str,
}

impl<'a> std::fmt::Display for BenchmarkConfigDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting Benchmark ({} transport)", self.transport_name)?;
        writeln!(f, "  Endpoints:          {}", self.endpoint_count)?;
        writeln!(f, "  Attempts per URL:   {}", self.config.attempt_count)?;
        writeln!(f, "  Concurrency:        {}", self.config.concurrency)?;
        writeln!(
            f,
            "  Warmup:             {}..{} requests",
            self.config.warmup_min, self.config.warmup_max
        )?;
        writeln!(
            f,
            "  Request Timeout:    {}",
            format_duration(self.config.request_timeout)
        )?;
        let status_policy = if self.config.fail_on_error_status {
            "4xx/5xx count as failures"
        } else {
            "Any status counts as success (default)"
        };
        writeln!(f, "  HTTP Status:        {}", status_policy)?;
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Configuration for benchmark execution
///
/// ## Key Configuration Categories
///
/// - **Sampling**: Attempts, concurrency bound and warmup bounds
/// - **Transport**: Request timeout and HTTP status policy
/// - **Ranking**: The equivalence predicate deciding shared ranks
#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    /// Measured requests per endpoint
    pub attempt_count: usize,

    /// Maximum simultaneous requests per endpoint
    ///
    /// Applies to both warmup and measurement. Endpoints are never measured
    /// concurrently with each other.
    pub concurrency: usize,

    /// Upper bound on warmup requests
    pub warmup_max: usize,

    /// Warmup requests that must complete before warmup may stop early
    pub warmup_min: usize,

    /// Whole-request timeout handed to the transport
    pub request_timeout: Duration,

    /// Count 4xx/5xx responses as failures
    pub fail_on_error_status: bool,

    /// Predicate used to decide whether neighbours share a rank
    pub equivalence: SampleEquivalence,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            attempt_count: crate::defaults::ATTEMPT_COUNT,
            concurrency: crate::defaults::CONCURRENCY,
            warmup_max: crate::defaults::WARMUP_MAX,
            warmup_min: crate::defaults::WARMUP_MIN,
            request_timeout: crate::defaults::REQUEST_TIMEOUT,
            fail_on_error_status: false,
            equivalence: SampleEquivalence::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Create benchmark configuration from CLI arguments
    ///
    /// ## Returns
    /// - `Ok(BenchmarkConfig)`: Valid configuration ready for use
    /// - `Err(anyhow::Error)`: Configuration validation failure
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Self {
            attempt_count: args.attempts,
            concurrency: args.concurrency,
            warmup_max: args.warmup_max,
            warmup_min: args.warmup_min,
            request_timeout: args.timeout,
            fail_on_error_status: args.fail_on_error_status,
            equivalence: SampleEquivalence::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_attempt_count(self.attempt_count)?;
        validate_concurrency(self.concurrency)?;
        validate_warmup(self.warmup_min, self.warmup_max)?;
        if self.request_timeout.is_zero() {
            anyhow::bail!("Request timeout must be greater than 0");
        }
        Ok(())
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            attempt_count: self.attempt_count,
            concurrency: self.concurrency,
            warmup_max: self.warmup_max,
            warmup_min: self.warmup_min,
        }
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            timeout: self.request_timeout,
            fail_on_error_status: self.fail_on_error_status,
            ..HttpTransportConfig::default()
        }
    }
}

/// Parse and keep only absolute URLs with a host, numbering the survivors.
pub fn parse_endpoints<I, S>(urls: I) -> Vec<Endpoint>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    urls.into_iter()
        .filter_map(|raw| {
            let raw = raw.as_ref().trim();
            match Url::parse(raw) {
                Ok(uri) if uri.has_host() => Some(uri),
                Ok(_) => {
                    debug!("Skipping '{}': URL has no host", raw);
                    None
                }
                Err(e) => {
                    debug!("Skipping '{}': {}", raw, e);
                    None
                }
            }
        })
        .enumerate()
        .map(|(index, uri)| Endpoint { index, uri })
        .collect()
}

/// Benchmark runner that measures and ranks a list of endpoints
///
/// ## Usage Pattern
///
/// ```rust,no_run
/// # use http_latency_bench::benchmark::{BenchmarkConfig, BenchmarkRunner};
/// # use http_latency_bench::cancel::CancelToken;
/// # use http_latency_bench::transport::HttpTransport;
/// # use std::sync::Arc;
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = BenchmarkConfig::default();
/// let transport = Arc::new(HttpTransport::new(&config.transport_config())?);
/// let runner = BenchmarkRunner::new(["https://example.com/"], transport, config);
/// let (progress, _receiver) = runner.progress_channel();
/// let project = runner.run(&progress, &CancelToken::new()).await?;
/// println!("ranks: {:?}", project.ranks);
/// # Ok(())
/// # }
/// ```
pub struct BenchmarkRunner {
    endpoints: Vec<Endpoint>,
    transport: Arc<dyn Transport>,
    config: BenchmarkConfig,
}

impl BenchmarkRunner {
    pub fn new<I, S>(urls: I, transport: Arc<dyn Transport>, config: BenchmarkConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            endpoints: parse_endpoints(urls),
            transport,
            config,
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Measured attempts the run performs when not cancelled.
    pub fn total_attempts(&self) -> u64 {
        (self.endpoints.len() * self.config.attempt_count) as u64
    }

    pub fn progress_channel(&self) -> (ProgressReporter, ProgressReceiver) {
        progress_channel(self.total_attempts())
    }

    /// Measure every endpoint in order, then rank.
    ///
    /// Per-endpoint problems become warning notices and an empty result;
    /// cancellation stops before the next endpoint and still ranks what was
    /// collected. Only an invalid configuration is an error.
    pub async fn run(&self, progress: &ProgressReporter, cancel: &CancelToken) -> Result<ProjectResult> {
        self.config
            .validate()
            .context("Invalid benchmark configuration")?;

        info!(
            "\n{}",
            BenchmarkConfigDisplay {
                config: &self.config,
                endpoint_count: self.endpoints.len(),
                transport_name: self.transport.name(),
            }
        );

        let started = Instant::now();
        let count = self.endpoints.len();
        let mut results = Vec::with_capacity(count);

        for (position, endpoint) in self.endpoints.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "Run cancelled, skipping {} remaining endpoint(s)",
                    count - position
                );
                break;
            }
            info!("Processing '{}' ({}/{})...", endpoint.uri, position + 1, count);

            let result = self.sample_endpoint(endpoint, progress, cancel).await;
            info!(
                "Processed '{}' ({}/{}): {} succeeded, {} failed",
                endpoint.uri,
                position + 1,
                count,
                result.success_count(),
                result.failure_count()
            );
            if let Some(metrics) = &result.metrics {
                debug!("'{}': {}", endpoint.uri, metrics);
            } else if !result.attempts.is_empty() {
                self.warn(
                    endpoint,
                    "No successful attempts; endpoint ranked last".to_string(),
                    progress,
                );
            }
            results.push(result);
        }

        let project = rank_results(results, &self.config.equivalence, cancel.is_cancelled());
        info!(
            "Benchmark finished in {} ({} endpoint(s) measured{})",
            format_duration(started.elapsed()),
            project.results.len(),
            if project.cancelled { ", cancelled" } else { "" }
        );
        Ok(project)
    }

    /// Run one sampler in its own task, turning errors and panics into an
    /// empty result.
    async fn sample_endpoint(
        &self,
        endpoint: &Endpoint,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> EndpointResult {
        let sampler = RequestSampler::new(
            endpoint.clone(),
            self.transport.clone(),
            self.config.sampler_config(),
            progress.clone(),
        );
        let token = cancel.clone();
        let handle = tokio::spawn(async move { sampler.run(&token).await });

        let message = match handle.await {
            Ok(Ok(result)) => return result,
            Ok(Err(e)) => format!("Sampling failed: {}", e),
            Err(e) if e.is_panic() => format!("Sampling panicked: {}", e),
            Err(e) => format!("Sampling task aborted: {}", e),
        };
        self.warn(endpoint, message, progress);
        EndpointResult::empty(endpoint.clone())
    }

    fn warn(&self, endpoint: &Endpoint, message: String, progress: &ProgressReporter) {
        warn!("'{}': {}", endpoint.uri, message);
        let notice = Notice::Warning {
            endpoint_index: endpoint.index,
            uri: endpoint.uri.to_string(),
            message,
        };
        progress.notify(notice);
    }
}
