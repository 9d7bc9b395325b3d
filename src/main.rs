//! # HTTP Latency Bench - Main Entry Point
//!
//! Measures a list of HTTP endpoints and prints them ranked by latency.
//!
//! ## Architecture Overview
//!
//! The main function performs these key operations:
//! 1. **Parse arguments**: Processes command-line configuration
//! 2. **Initialize logging**: Console formatter plus an optional log file
//! 3. **Resolve the project**: Merges the project file with CLI URLs
//! 4. **Run the benchmark**: Samples every endpoint and ranks the results,
//!    while a background task reports progress and failures
//! 5. **Write results**: Summary table, JSON report and histogram feeds in
//!    a dated output directory
//!
//! ## Cancellation
//!
//! Ctrl-C cancels the run. In-flight requests are aborted, the data collected
//! so far is ranked, and the report is written with `cancelled: true`.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use http_latency_bench::{
    benchmark::{BenchmarkConfig, BenchmarkRunner},
    cancel::CancelToken,
    cli::{Args, ProjectFile, ResolvedProject},
    logging::{env_filter, ConsoleFormatter},
    metrics::format_ms,
    progress::{Notice, ProgressReceiver},
    results::{dated_output_dir, ProjectReport, ProjectResult, ResultsManager},
    transport::HttpTransport,
    utils::{create_progress_indicator, print_table_row, print_table_separator, truncate},
    VERSION,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

/// Width of the URL column in the summary table
const URL_COLUMN_WIDTH: usize = 48;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Held until exit so the file writer flushes.
    let _log_guard = init_logging(&args)?;

    info!("HTTP Latency Bench v{}", VERSION);
    debug!("Configuration: {:?}", args);

    let project_file = args
        .project
        .as_deref()
        .map(ProjectFile::load)
        .transpose()?;
    let resolved = ResolvedProject::resolve(&args, project_file);

    let config = BenchmarkConfig::from_args(&args)?;
    let equivalence = config.equivalence;
    let transport = Arc::new(HttpTransport::new(&config.transport_config())?);
    let runner = BenchmarkRunner::new(&resolved.urls, transport, config);

    if runner.endpoints().is_empty() {
        warn!(
            "No valid URLs to benchmark ({} given)",
            resolved.urls.len()
        );
        return Ok(());
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping the run...");
                cancel.cancel();
            }
        });
    }

    let (progress, receiver) = runner.progress_channel();
    let consumer = tokio::spawn(consume_progress(receiver));

    let project = runner.run(&progress, &cancel).await?;
    drop(progress);
    if let Err(e) = consumer.await {
        debug!("Progress consumer ended abnormally: {}", e);
    }

    print_summary(&project);

    let run_dir = dated_output_dir(&resolved.output_root, Local::now());
    let manager = ResultsManager::new(&run_dir)?;
    let report = ProjectReport::new(&project, &equivalence);
    manager.write_report(&report)?;
    if !args.no_histograms {
        let written = manager.write_histograms(&project)?;
        info!("{} histogram file(s) written", written.len());
    }

    if project.cancelled {
        info!("Run was cancelled; partial results written to {:?}", run_dir);
    } else {
        info!("Results written to {:?}", run_dir);
    }
    Ok(())
}

/// Install the global subscriber: console output always, a plain-text file
/// layer when `--log-file` is given.
fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    let console = tracing_subscriber::fmt::layer()
        .event_format(ConsoleFormatter)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(args.log_level()))
        .with(console)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path {:?} has no file name", path))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {:?}", directory))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Log failure notices and the progress bar until every reporter is gone.
async fn consume_progress(mut receiver: ProgressReceiver) {
    let mut notices_open = true;
    let mut fraction_open = true;
    let mut last_step = 0u32;

    while notices_open || fraction_open {
        tokio::select! {
            notice = receiver.notices.recv(), if notices_open => match notice {
                Some(notice @ Notice::Failure { .. }) => warn!("{}", notice),
                // The runner logs warnings itself.
                Some(notice @ Notice::Warning { .. }) => debug!("{}", notice),
                None => notices_open = false,
            },
            changed = receiver.fraction.changed(), if fraction_open => {
                if changed.is_err() {
                    fraction_open = false;
                } else {
                    let fraction = *receiver.fraction.borrow_and_update();
                    let step = (fraction * 10.0) as u32;
                    if step > last_step {
                        last_step = step;
                        info!(
                            "Progress [{}] {:>3.0}%",
                            create_progress_indicator(fraction, 30),
                            fraction * 100.0
                        );
                    }
                }
            }
        }
    }
}

fn print_summary(project: &ProjectResult) {
    let widths = [5, URL_COLUMN_WIDTH, 10, 10, 10, 10, 9];
    println!();
    print_table_separator(&widths);
    print_table_row(
        &["Rank", "URL", "Mean", "Median", "StdDev", "P75", "OK/Fail"],
        &widths,
    );
    print_table_separator(&widths);

    for (rank, result) in project.ranked() {
        let rank = (rank + 1).to_string();
        let uri = truncate(result.endpoint.uri.as_str(), URL_COLUMN_WIDTH);
        let counts = format!("{}/{}", result.success_count(), result.failure_count());
        let (mean, median, std_dev, q3) = match &result.metrics {
            Some(m) => (
                format_ms(m.mean),
                format_ms(m.quartiles.median()),
                format_ms(m.std_dev),
                format_ms(m.quartiles.q3()),
            ),
            None => ("n/a".into(), "n/a".into(), "n/a".into(), "n/a".into()),
        };
        print_table_row(
            &[
                rank.as_str(),
                uri.as_str(),
                mean.as_str(),
                median.as_str(),
                std_dev.as_str(),
                q3.as_str(),
                counts.as_str(),
            ],
            &widths,
        );
    }
    print_table_separator(&widths);
    if project.cancelled {
        println!("(cancelled: results are partial)");
    }
}
