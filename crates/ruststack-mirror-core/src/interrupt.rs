//! Cooperative cancellation.
//!
//! Long-running tasks only stop at their delays: the lister's idle wait and
//! the pauses between retries. Those delays go through [`Interrupt::sleep`],
//! which returns early once the run has been interrupted.

use std::time::Duration;

use tokio::sync::watch;

/// Returned when a delay was cut short by an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Triggers an [`Interrupt`].
#[derive(Debug)]
pub struct InterruptHandle {
    tx: watch::Sender<bool>,
}

impl InterruptHandle {
    /// Interrupt every task holding the paired [`Interrupt`].
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes whether the run has been interrupted.
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

impl Interrupt {
    /// Create a linked handle and observer.
    #[must_use]
    pub fn new() -> (InterruptHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (InterruptHandle { tx }, Self { rx })
    }

    /// An observer that is never triggered.
    #[must_use]
    pub fn never() -> Self {
        Self::new().1
    }

    /// Whether the run has been interrupted.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `duration`, or until interrupted.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        if self.is_triggered() {
            return Err(Interrupted);
        }
        let mut rx = self.rx.clone();
        let triggered = async move {
            if rx.wait_for(|interrupted| *interrupted).await.is_err() {
                // Handle dropped without triggering: nothing can interrupt us now.
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            () = triggered => Err(Interrupted),
        }
    }
}
