//! # HTTP Latency Bench Library
//!
//! Measures the response time of a list of HTTP endpoints and ranks them from
//! fastest to slowest, letting endpoints share a rank when their latency
//! samples cannot be told apart statistically.
//!
//! ## Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - `benchmark`: Run orchestration over all endpoints
//! - `sampler`: Warmup and bounded-concurrency measurement of one endpoint
//! - `transport`: The request capability and its reqwest implementation
//! - `metrics`: Descriptive statistics over latency samples
//! - `equivalence`: Mann–Whitney based comparison of two samples
//! - `ranking`: Sorting and competition ranking of endpoint results
//! - `results`: Report model and artifact output
//! - `histogram`: Count and density histogram feeds for plotting
//! - `progress`: Progress fraction and failure notices
//! - `cancel`: Hierarchical cancellation
//! - `cli`: Command-line interface and project files
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use http_latency_bench::{BenchmarkConfig, BenchmarkRunner, CancelToken, HttpTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BenchmarkConfig {
//!         attempt_count: 50,
//!         concurrency: 5,
//!         ..BenchmarkConfig::default()
//!     };
//!     let transport = Arc::new(HttpTransport::new(&config.transport_config())?);
//!     let runner = BenchmarkRunner::new(
//!         ["https://example.com/", "https://example.org/"],
//!         transport,
//!         config,
//!     );
//!
//!     let (progress, _receiver) = runner.progress_channel();
//!     let project = runner.run(&progress, &CancelToken::new()).await?;
//!
//!     for (rank, result) in project.ranked() {
//!         println!("{} {}", rank + 1, result.endpoint.uri);
//!     }
//!     Ok(())
//! }
//! ```

/// Run orchestration
///
/// Filters the input URLs, measures each endpoint in order, isolates
/// per-endpoint failures and ranks the collected results.
pub mod benchmark;

pub mod cancel;

/// Command-line interface and project files
pub mod cli;

/// Sample comparison
///
/// Implements the one-sided Mann–Whitney U test (exact for small samples
/// without ties, normal approximation otherwise) and the shifted equivalence
/// test built on it.
pub mod equivalence;

pub mod histogram;

/// Console formatting for log output
pub mod logging;

/// Descriptive statistics
///
/// Mean, variance, standard deviation, standard error, quartiles and IQR of a
/// latency sample in milliseconds.
pub mod metrics;

pub mod progress;

pub mod ranking;

/// Result collection and output
///
/// Manages the collection and presentation of results with support for:
/// - Structured JSON reports with run metadata
/// - Histogram feeds per endpoint
/// - Dated per-run output directories
pub mod results;

/// Per-endpoint measurement
///
/// Warmup with early stop, bounded-concurrency measurement, attempt
/// recording and failure deduplication.
pub mod sampler;

/// Request transports
///
/// The `Transport` trait is the seam between measurement and the network;
/// tests substitute scripted transports for it.
pub mod transport;

pub mod utils;

// Re-export key types for convenient library usage

pub use benchmark::{BenchmarkConfig, BenchmarkRunner};
pub use cancel::CancelToken;
pub use cli::Args;
pub use equivalence::{ComparisonResult, EquivalenceTester, SampleEquivalence, SignificanceLevel, Threshold};
pub use metrics::{Metrics, Sample};
pub use progress::{progress_channel, Notice, ProgressReceiver, ProgressReporter};
pub use results::{EndpointResult, ProjectReport, ProjectResult, ResultsManager};
pub use transport::{HttpTransport, Transport};

/// URL type used for endpoints
pub use reqwest::Url;

/// The current version of the benchmark
///
/// Populated from Cargo.toml and written into every report.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Default number of measured requests per endpoint
    ///
    /// Large enough for the normal approximation of the rank test to be
    /// reasonable while keeping one endpoint's run short.
    pub const ATTEMPT_COUNT: usize = 100;

    /// Default number of simultaneous requests per endpoint
    pub const CONCURRENCY: usize = 20;

    /// Default upper bound on warmup requests
    pub const WARMUP_MAX: usize = 20;

    /// Default number of warmup requests before the early stop may trigger
    ///
    /// After this many completed warmup requests, the first success slower
    /// than its predecessor ends the warmup.
    pub const WARMUP_MIN: usize = 10;

    /// Default whole-request timeout
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

    /// Buffered notices; further notices are dropped until the consumer
    /// catches up
    pub const NOTICE_CHANNEL_CAPACITY: usize = 32;

    /// Root directory for run outputs when neither the CLI nor the project
    /// file names one
    pub const OUTPUT_ROOT: &str = "latency-bench-output";

    /// File name of the JSON report inside a run's output directory
    pub const REPORT_FILE: &str = "report.json";
}
