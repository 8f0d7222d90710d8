//! Cooperative cancellation for pipeline tasks.
//!
//! Each race lane, the speaker task, and the coordinator get a token scoped
//! to the connection; losing lanes additionally get their own pair so they
//! can be cancelled individually at lock-in without touching the winner.

use tokio::sync::watch;

/// Sender half: flips the token for every clone of the paired receiver.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        // Receivers may already be gone; that just means nothing is left to
        // cancel.
        let _ = self.tx.send(true);
    }

    /// Returns true if cancel() was already called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiver half carried by tasks; cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Returns true once cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is signalled (immediately if it already
    /// was, or if the handle was dropped).
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                // Handle dropped without cancelling; treat as cancelled so
                // orphaned tasks still wind down.
                return;
            }
        }
    }

    /// A token that never fires. Useful for single-shot calls and tests.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Leak the sender so the token stays pending forever.
        std::mem::forget(tx);
        Self { rx }
    }
}

/// Creates a connected handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token_observes_cancel() {
        let (handle, mut token) = cancel_pair();
        assert!(!token.is_cancelled());

        handle.cancel();
        assert!(token.is_cancelled());
        assert!(handle.is_cancelled());

        // Must resolve immediately.
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("cancelled() should resolve after cancel()");
    }

    #[tokio::test]
    async fn dropped_handle_unblocks_waiters() {
        let (handle, mut token) = cancel_pair();
        drop(handle);
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("cancelled() should resolve when handle is dropped");
    }

    #[tokio::test]
    async fn never_token_stays_pending() {
        let mut token = CancelToken::never();
        assert!(!token.is_cancelled());
        let waited =
            tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(waited.is_err(), "never() token must not resolve");
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        handle.cancel();
        assert!(token.is_cancelled());
    }
}
