use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::signal;
use tokio::sync::watch;

/// Tracks open connections and the shutdown signal for the listener.
///
/// The signal is a watch channel so any number of tasks can wait on it,
/// including ones that start waiting after it fired.
pub struct ShutdownManager {
    active_connections: AtomicUsize,
    signal: watch::Sender<bool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            active_connections: AtomicUsize::new(0),
            signal,
        }
    }

    /// Resolves on SIGINT, SIGTERM or `signal_shutdown()`, and marks the
    /// manager as shutting down in every case.
    pub async fn wait_for_shutdown(&self) {
        if self.is_shutting_down() {
            return;
        }

        #[cfg(unix)]
        {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = signal::ctrl_c() => {},
                        _ = sigterm.recv() => {},
                        _ = self.shutdown_requested() => {},
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    tokio::select! {
                        _ = signal::ctrl_c() => {},
                        _ = self.shutdown_requested() => {},
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = signal::ctrl_c() => {},
                _ = self.shutdown_requested() => {},
            }
        }

        self.signal_shutdown();
    }

    /// Resolves once shutdown has been signalled, without listening for OS
    /// signals itself.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.signal.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|requested| *requested).await;
    }

    pub fn signal_shutdown(&self) {
        if !self.signal.send_replace(true) {
            tracing::info!("Shutting down gracefully...");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.signal.borrow()
    }

    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
