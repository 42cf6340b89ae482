//! Graceful-shutdown wiring: SIGINT/SIGTERM flip an atomic flag and cancel
//! the root token so every in-flight wait unwinds promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Process-wide shutdown state. Workers poll [`Shutdown::is_requested`] at
/// attempt boundaries; sleeps and channel waits select against the token.
pub struct Shutdown {
    requested: AtomicBool,
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            token: CancellationToken::new(),
        }
    }

    /// Flags shutdown and cancels the root token. Idempotent.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Child token for batch-scoped cancellation: cancelling the batch does
    /// not shut the process down, but shutdown cancels every batch.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the signal listener. On the first SIGINT or SIGTERM the shutdown
/// flag is set; the engine drains at the next checkpoint.
pub fn install_signal_handler(shutdown: Arc<Shutdown>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::warn!("Shutdown signal received, draining...");
        shutdown.request();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_sets_flag_and_cancels_token() {
        let shutdown = Shutdown::new();
        let child = shutdown.child_token();
        assert!(!shutdown.is_requested());
        assert!(!child.is_cancelled());

        shutdown.request();
        assert!(shutdown.is_requested());
        assert!(child.is_cancelled());
        // The wait resolves immediately now.
        shutdown.cancelled().await;
    }

    #[tokio::test]
    async fn cancelling_a_child_does_not_shut_down() {
        let shutdown = Shutdown::new();
        let child = shutdown.child_token();
        child.cancel();
        assert!(!shutdown.is_requested());
    }
}
