//! Single-fire readiness signals with bounded waits.

use std::time::Duration;

use tokio::sync::watch;

/// A flag that flips once and stays set.
///
/// Waiters that arrive after the flag was set return immediately, so a
/// signal fired before anyone waits is never lost.
#[derive(Debug)]
pub struct Signal {
    tx: watch::Sender<bool>,
}

impl Signal {
    /// Create an unfired signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Set the flag. Idempotent.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the flag is set.
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait for the flag for at most `limit`. Returns whether it fired.
    pub async fn wait(&self, limit: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        tokio::time::timeout(limit, rx.wait_for(|fired| *fired))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}
