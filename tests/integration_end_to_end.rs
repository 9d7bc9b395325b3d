use anyhow::Result;
use async_trait::async_trait;
use http_latency_bench::{
    cli::Args,
    progress::Notice,
    transport::{ResponseInfo, TransportError},
    BenchmarkConfig, BenchmarkRunner, CancelToken, Transport, Url,
};
use std::sync::Arc;
use std::time::Duration;

/// Answers after a fixed per-host delay; hosts starting with `down` refuse.
struct DelayTransport;

impl DelayTransport {
    fn delay_for(uri: &Url) -> Duration {
        match uri.host_str() {
            Some("a.test") => Duration::from_millis(50),
            Some("b.test") => Duration::from_millis(200),
            _ => Duration::from_millis(5),
        }
    }
}

#[async_trait]
impl Transport for DelayTransport {
    async fn issue(&self, uri: &Url, cancel: &CancelToken) -> Result<ResponseInfo, TransportError> {
        if uri.host_str().map_or(false, |h| h.starts_with("down")) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            _ = tokio::time::sleep(Self::delay_for(uri)) => Ok(ResponseInfo { status: 200, body_bytes: 0 }),
        }
    }

    fn name(&self) -> &'static str {
        "delay"
    }
}

fn config(attempts: usize) -> Result<BenchmarkConfig> {
    let args = Args {
        attempts,
        concurrency: 5,
        warmup_max: 0,
        warmup_min: 0,
        ..Default::default()
    };
    BenchmarkConfig::from_args(&args)
}

/// The faster endpoint is ranked first even when listed second.
#[tokio::test]
async fn faster_endpoint_ranks_first() -> Result<()> {
    let runner = BenchmarkRunner::new(
        ["https://b.test/", "https://a.test/"],
        Arc::new(DelayTransport),
        config(10)?,
    );
    let (progress, receiver) = runner.progress_channel();
    let project = runner.run(&progress, &CancelToken::new()).await?;

    let hosts: Vec<_> = project
        .results
        .iter()
        .map(|r| r.endpoint.uri.host_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(hosts, vec!["a.test", "b.test"]);
    assert_eq!(project.ranks, vec![0, 1]);
    assert!(!project.cancelled);

    for result in &project.results {
        assert_eq!(result.attempts.len(), 10);
        assert_eq!(result.success_count(), 10);
        let indices: Vec<usize> = result.attempts.iter().map(|a| a.attempt_index).collect();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
    }

    let a = project.results[0].metrics.as_ref().expect("a.test has metrics");
    assert!(a.mean >= 50.0, "mean {}", a.mean);
    assert_eq!(*receiver.fraction.borrow(), 1.0);
    Ok(())
}

/// Invalid inputs are dropped and unreachable endpoints sort last with a
/// single failure notice and a warning.
#[tokio::test]
async fn invalid_and_failing_endpoints() -> Result<()> {
    let runner = BenchmarkRunner::new(
        ["https://down.test/", "::not-a-url::", "https://c.test/", "relative/path"],
        Arc::new(DelayTransport),
        config(6)?,
    );
    assert_eq!(runner.endpoints().len(), 2);
    assert_eq!(runner.total_attempts(), 12);

    let (progress, mut receiver) = runner.progress_channel();
    let project = runner.run(&progress, &CancelToken::new()).await?;

    assert_eq!(project.results[0].endpoint.uri.host_str(), Some("c.test"));
    assert_eq!(project.results[1].endpoint.uri.host_str(), Some("down.test"));
    assert!(project.results[1].metrics.is_none());
    assert_eq!(project.results[1].failure_count(), 6);
    assert_eq!(project.ranks, vec![0, 1]);

    let mut failures = 0;
    let mut warnings = 0;
    while let Ok(notice) = receiver.notices.try_recv() {
        match notice {
            Notice::Failure { endpoint_index, .. } => {
                assert_eq!(endpoint_index, 0);
                failures += 1;
            }
            Notice::Warning { endpoint_index, .. } => {
                assert_eq!(endpoint_index, 0);
                warnings += 1;
            }
        }
    }
    assert_eq!(failures, 1);
    assert_eq!(warnings, 1);
    assert_eq!(*receiver.fraction.borrow(), 1.0);
    Ok(())
}
