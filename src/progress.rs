//! Progress reporting and the failure notice side-channel.
//!
//! Producers (sampler workers, the runner) hold a cloneable
//! [`ProgressReporter`]. A single consumer holds the [`ProgressReceiver`]:
//! a `watch` channel carrying the completed fraction and a bounded `mpsc`
//! queue of [`Notice`]s. Notices are never awaited; nothing here assumes notices arrive in any
//! particular order.

use crate::transport::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// A user-facing message raised during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notice {
    /// First occurrence of a failure kind for an endpoint
    Failure {
        endpoint_index: usize,
        uri: String,
        kind: ErrorKind,
        message: String,
    },
    /// Endpoint-level problem that did not stop the run
    Warning {
        endpoint_index: usize,
        uri: String,
        message: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Failure {
                uri, kind, message, ..
            } => write!(f, "Request to '{}' failed ({}): {}", uri, kind, message),
            Notice::Warning { uri, message, .. } => write!(f, "'{}': {}", uri, message),
        }
    }
}

struct Shared {
    completed: AtomicU64,
    total: u64,
    fraction: watch::Sender<f64>,
}

/// Producer side of the progress channel
#[derive(Clone)]
pub struct ProgressReporter {
    shared: Arc<Shared>,
    notices: mpsc::Sender<Notice>,
}

/// Consumer side of the progress channel
pub struct ProgressReceiver {
    /// Completed fraction in `[0, 1]`, never decreasing
    pub fraction: watch::Receiver<f64>,
    pub notices: mpsc::Receiver<Notice>,
}

/// Create a progress channel for `total` measured attempts.
pub fn progress_channel(total: u64) -> (ProgressReporter, ProgressReceiver) {
    progress_channel_with_capacity(total, crate::defaults::NOTICE_CHANNEL_CAPACITY)
}

pub fn progress_channel_with_capacity(
    total: u64,
    notice_capacity: usize,
) -> (ProgressReporter, ProgressReceiver) {
    let (fraction_tx, fraction_rx) = watch::channel(0.0);
    let (notice_tx, notice_rx) = mpsc::channel(notice_capacity.max(1));
    let reporter = ProgressReporter {
        shared: Arc::new(Shared {
            completed: AtomicU64::new(0),
            total,
            fraction: fraction_tx,
        }),
        notices: notice_tx,
    };
    let receiver = ProgressReceiver {
        fraction: fraction_rx,
        notices: notice_rx,
    };
    (reporter, receiver)
}

impl ProgressReporter {
    /// Record one finished measured attempt.
    pub fn tick(&self) {
        let completed = self.shared.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let fraction = if self.shared.total == 0 {
            1.0
        } else {
            (completed as f64 / self.shared.total as f64).min(1.0)
        };
        // Ticks race each other, so only ever move forward.
        self.shared.fraction.send_modify(|current| {
            if fraction > *current {
                *current = fraction;
            }
        });
    }

    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.shared.total
    }

    pub fn fraction(&self) -> f64 {
        *self.shared.fraction.borrow()
    }

    /// Queue a notice without waiting.
    ///
    /// Delivery is best effort: when the queue is full or the receiver is
    /// gone the notice is dropped, so an undrained receiver never stalls a
    /// run.
    pub fn notify(&self, notice: Notice) {
        match self.notices.try_send(notice) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(notice)) => {
                trace!("Notice queue full, dropping: {}", notice);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Notice receiver is gone, dropping notice");
            }
        }
    }
}
