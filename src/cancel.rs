//! Cooperative cancellation for benchmark runs.
//!
//! A [`CancelToken`] is cheap to clone and is handed to every component that
//! issues requests. Child tokens observe their parent's cancellation but can
//! also be cancelled on their own, which is how the warmup phase stops its
//! in-flight requests without touching the rest of the run.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared cancellation flag with optional parent.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tx: watch::Sender<bool>,
    parent: Option<CancelToken>,
}

impl CancelToken {
    /// Create a new, uncancelled root token.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { tx, parent: None }),
        }
    }

    /// Create a token that is cancelled whenever `self` is cancelled.
    ///
    /// Cancelling the child does not affect the parent.
    pub fn child(&self) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tx,
                parent: Some(self.clone()),
            }),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.tx.borrow()
            || self
                .inner
                .parent
                .as_ref()
                .map_or(false, CancelToken::is_cancelled)
    }

    /// Resolve once this token or any of its ancestors is cancelled.
    ///
    /// Boxed because the parent chain is awaited recursively.
    pub fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut rx = self.inner.tx.subscribe();
            let own = async move {
                // The sender lives in `self`, so `wait_for` cannot observe a closed channel here.
                let _ = rx.wait_for(|cancelled| *cancelled).await;
            };
            match &self.inner.parent {
                Some(parent) => {
                    tokio::select! {
                        _ = own => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => own.await,
            }
        })
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
