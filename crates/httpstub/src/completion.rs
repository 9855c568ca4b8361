//! One-shot completion signal.
//!
//! The stub holds the [`CompletionSignal`] and fires it the first time the
//! captured exchange count reaches its threshold. Any number of
//! [`Completion`] handles can wait on it, before or after it fires.

use std::time::Duration;

use tokio::sync::watch;

use crate::error::{Result, StubError};

/// Writer half of the completion signal.
#[derive(Debug)]
pub(crate) struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl CompletionSignal {
    /// Create a pending signal and a handle for waiting on it.
    pub(crate) fn new() -> (Self, Completion) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, Completion { rx })
    }

    /// Mark the signal satisfied.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub(crate) fn complete(&self) -> bool {
        self.tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }
}

/// Handle for awaiting a stub's completion.
///
/// Cloning is cheap; every clone observes the same signal.
///
/// # Example
///
/// ```rust,ignore
/// let completion = stub.completion();
/// send_requests(stub.uri()).await;
/// completion.wait_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<bool>,
}

impl Completion {
    /// Check whether the threshold has been reached.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the threshold is reached.
    ///
    /// If the stub is shut down first this never resolves. Race it against a
    /// timeout, or use [`wait_timeout`](Self::wait_timeout).
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|done| *done).await.is_err() {
            // Signal dropped without firing.
            std::future::pending::<()>().await;
        }
    }

    /// Wait until the threshold is reached or `timeout` elapses.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StubError::timeout("waiting for stub completion", timeout))
    }
}
