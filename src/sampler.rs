//! # Request Sampler
//!
//! Runs the measurement of a single endpoint:
//!
//! 1. **Warmup**: up to `warmup_max` unmeasured requests under the same
//!    concurrency bound. Once `warmup_min` of them have completed, the first
//!    successful duration that is slower than the previous successful one
//!    ends the warmup and cancels whatever is still in flight.
//! 2. **Measuring**: `attempt_count` requests, at most `concurrency` at a
//!    time. Every issued attempt is recorded exactly once, whether it
//!    succeeded, failed, or was aborted by cancellation.
//!
//! Failures never abort sibling attempts. The first failure of each
//! [`ErrorKind`] is forwarded as a [`Notice`]; later ones are only logged.

use crate::cancel::CancelToken;
use crate::progress::{Notice, ProgressReporter};
use crate::results::EndpointResult;
use crate::transport::{ErrorKind, Transport};
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, trace};

/// A validated benchmark target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Position among the valid input URLs
    pub index: usize,
    pub uri: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Success { status: u16 },
    Failure { kind: ErrorKind, message: String },
}

/// One measured request
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    pub endpoint_index: usize,
    pub attempt_index: usize,
    pub started_at: Instant,
    pub finished_at: Instant,
    pub outcome: AttemptOutcome,
}

impl RequestAttempt {
    pub fn duration(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration().as_secs_f64() * 1_000.0
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success { .. })
    }
}

/// Lock-free, append-only record of the attempts of one endpoint
#[derive(Debug, Default)]
pub struct AttemptLog {
    queue: SegQueue<RequestAttempt>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, attempt: RequestAttempt) {
        self.queue.push(attempt);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take every recorded attempt, ordered by attempt index.
    pub fn drain_sorted(&self) -> Vec<RequestAttempt> {
        let mut attempts = Vec::with_capacity(self.queue.len());
        while let Some(attempt) = self.queue.pop() {
            attempts.push(attempt);
        }
        attempts.sort_by_key(|a| a.attempt_index);
        attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplerPhase {
    Idle,
    Warmup,
    Measuring,
    Done,
}

/// Sampling parameters for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub attempt_count: usize,
    pub concurrency: usize,
    pub warmup_max: usize,
    pub warmup_min: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            attempt_count: crate::defaults::ATTEMPT_COUNT,
            concurrency: crate::defaults::CONCURRENCY,
            warmup_max: crate::defaults::WARMUP_MAX,
            warmup_min: crate::defaults::WARMUP_MIN,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), SamplerError> {
        if self.attempt_count == 0 {
            return Err(SamplerError::InvalidConfig(
                "attempt count must be greater than 0".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(SamplerError::InvalidConfig(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if self.warmup_min > self.warmup_max {
            return Err(SamplerError::InvalidConfig(format!(
                "warmup minimum ({}) exceeds warmup maximum ({})",
                self.warmup_min, self.warmup_max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("invalid sampler configuration: {0}")]
    InvalidConfig(String),

    #[error("sampler worker panicked: {0}")]
    WorkerPanicked(String),
}

impl From<JoinError> for SamplerError {
    fn from(err: JoinError) -> Self {
        SamplerError::WorkerPanicked(err.to_string())
    }
}

/// State shared by the measured-attempt workers of one endpoint
struct AttemptContext {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    log: AttemptLog,
    reported: Mutex<HashSet<ErrorKind>>,
    progress: ProgressReporter,
    cancel: CancelToken,
}

impl AttemptContext {
    async fn execute(self: Arc<Self>, attempt_index: usize, permit: OwnedSemaphorePermit) {
        let started_at = Instant::now();
        let result = self.transport.issue(&self.endpoint.uri, &self.cancel).await;
        let finished_at = Instant::now();
        drop(permit);

        let outcome = match result {
            Ok(info) => AttemptOutcome::Success {
                status: info.status,
            },
            Err(err) => AttemptOutcome::Failure {
                kind: err.kind(),
                message: err.to_string(),
            },
        };
        let failure = match &outcome {
            AttemptOutcome::Failure { kind, message } => Some((*kind, message.clone())),
            AttemptOutcome::Success { .. } => None,
        };

        self.log.push(RequestAttempt {
            endpoint_index: self.endpoint.index,
            attempt_index,
            started_at,
            finished_at,
            outcome,
        });

        if let Some((kind, message)) = failure {
            self.report_failure(kind, message);
        }
        self.progress.tick();
    }

    fn report_failure(&self, kind: ErrorKind, message: String) {
        if kind == ErrorKind::Cancelled {
            return;
        }
        let first = self.reported.lock().insert(kind);
        if !first {
            trace!(
                "Repeated {} failure for '{}': {}",
                kind,
                self.endpoint.uri,
                message
            );
            return;
        }
        let notice = Notice::Failure {
            endpoint_index: self.endpoint.index,
            uri: self.endpoint.uri.to_string(),
            kind,
            message,
        };
        self.progress.notify(notice);
    }
}

enum WarmupEvent {
    Permit(Option<OwnedSemaphorePermit>),
    Completed(Result<(Option<f64>, OwnedSemaphorePermit), JoinError>),
    Stopped,
    Idle,
}

/// Measures one endpoint
pub struct RequestSampler {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    config: SamplerConfig,
    progress: ProgressReporter,
    phase: watch::Sender<SamplerPhase>,
}

impl RequestSampler {
    pub fn new(
        endpoint: Endpoint,
        transport: Arc<dyn Transport>,
        config: SamplerConfig,
        progress: ProgressReporter,
    ) -> Self {
        let (phase, _rx) = watch::channel(SamplerPhase::Idle);
        Self {
            endpoint,
            transport,
            config,
            progress,
            phase,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn phase(&self) -> SamplerPhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions from another task.
    pub fn watch_phase(&self) -> watch::Receiver<SamplerPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: SamplerPhase) {
        debug!("'{}' entering {:?} phase", self.endpoint.uri, phase);
        self.phase.send_replace(phase);
    }

    /// Warm up, then measure. Cancellation is not an error: the result then
    /// holds whatever was recorded before the stop.
    pub async fn run(&self, cancel: &CancelToken) -> Result<EndpointResult, SamplerError> {
        self.config.validate()?;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        self.set_phase(SamplerPhase::Warmup);
        self.warmup(&semaphore, cancel).await?;

        self.set_phase(SamplerPhase::Measuring);
        let attempts = self.measure(&semaphore, cancel).await;
        self.set_phase(SamplerPhase::Done);

        Ok(EndpointResult::from_attempts(self.endpoint.clone(), attempts?))
    }

    async fn warmup(&self, semaphore: &Arc<Semaphore>, cancel: &CancelToken) -> Result<(), SamplerError> {
        let warmup_cancel = cancel.child();
        let mut tasks: JoinSet<(Option<f64>, OwnedSemaphorePermit)> = JoinSet::new();
        let mut issued = 0usize;
        let mut completed = 0usize;
        let mut previous: Option<f64> = None;
        let mut stopped = false;

        loop {
            let can_issue = !stopped && issued < self.config.warmup_max;
            if !can_issue && tasks.is_empty() {
                break;
            }

            // Completions first, so a stop decision is seen before the
            // next permit is taken.
            let event = tokio::select! {
                biased;
                Some(joined) = tasks.join_next() => WarmupEvent::Completed(joined),
                _ = warmup_cancel.cancelled(), if !stopped => WarmupEvent::Stopped,
                permit = semaphore.clone().acquire_owned(), if can_issue => WarmupEvent::Permit(permit.ok()),
                else => WarmupEvent::Idle,
            };

            match event {
                WarmupEvent::Permit(Some(permit)) if !warmup_cancel.is_cancelled() => {
                    let transport = self.transport.clone();
                    let uri = self.endpoint.uri.clone();
                    let token = warmup_cancel.clone();
                    tasks.spawn(async move {
                        let started_at = Instant::now();
                        let result = transport.issue(&uri, &token).await;
                        let elapsed = started_at.elapsed();
                        (result.ok().map(|_| elapsed.as_secs_f64() * 1_000.0), permit)
                    });
                    issued += 1;
                }
                WarmupEvent::Permit(_) | WarmupEvent::Stopped => stopped = true,
                WarmupEvent::Completed(joined) => {
                    completed += 1;
                    // The slot stays held until the completion is handled.
                    let (duration, _permit) = joined?;
                    match duration {
                        Some(current) => {
                            let slower = previous.map_or(false, |p| current > p);
                            if !stopped && completed >= self.config.warmup_min && slower {
                                debug!(
                                    "Warmup of '{}' settled after {} of {} request(s)",
                                    self.endpoint.uri, completed, issued
                                );
                                stopped = true;
                                warmup_cancel.cancel();
                            }
                            previous = Some(current);
                        }
                        None => trace!("Warmup request to '{}' failed", self.endpoint.uri),
                    }
                }
                WarmupEvent::Idle => break,
            }
        }

        debug!(
            "Warmup of '{}' finished: {} issued, {} completed",
            self.endpoint.uri, issued, completed
        );
        Ok(())
    }

    async fn measure(
        &self,
        semaphore: &Arc<Semaphore>,
        cancel: &CancelToken,
    ) -> Result<Vec<RequestAttempt>, SamplerError> {
        let context = Arc::new(AttemptContext {
            endpoint: self.endpoint.clone(),
            transport: self.transport.clone(),
            log: AttemptLog::new(),
            reported: Mutex::new(HashSet::new()),
            progress: self.progress.clone(),
            cancel: cancel.clone(),
        });
        let mut tasks = JoinSet::new();

        for attempt_index in 0..self.config.attempt_count {
            if cancel.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else { break };
            if cancel.is_cancelled() {
                break;
            }
            tasks.spawn(context.clone().execute(attempt_index, permit));
        }

        while let Some(joined) = tasks.join_next().await {
            joined?;
        }

        if cancel.is_cancelled() {
            debug!(
                "Measurement of '{}' cancelled after {} attempt(s)",
                self.endpoint.uri,
                context.log.len()
            );
        }
        Ok(context.log.drain_sorted())
    }
}
