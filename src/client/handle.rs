//! Public handle to a running live session.

use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

/// Lifecycle of the bidirectional session. At most one session is active per
/// handle; errors collapse to `Closed` and require an explicit restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Connecting,
    Open,
}

/// Handle to a started session.
///
/// Dropping the handle without calling [`LiveSession::stop`] makes a
/// best-effort attempt to signal shutdown.
pub struct LiveSession {
    pub(crate) shutdown_tx: Arc<TokioMutex<Option<oneshot::Sender<()>>>>,
    pub(crate) state_rx: watch::Receiver<SessionState>,
}

impl LiveSession {
    /// Requests session shutdown. Safe to call in any state and any number
    /// of times: the first call signals the dispatch task to tear down, every
    /// later call is a no-op. Never raises.
    pub async fn stop(&self) {
        let mut guard = self.shutdown_tx.lock().await;
        match guard.take() {
            Some(tx) => {
                if tx.send(()).is_err() {
                    info!("[SessionHandle] Stop: dispatch task already gone.");
                } else {
                    info!("[SessionHandle] Stop signal sent.");
                }
            }
            None => info!("[SessionHandle] Stop: already requested."),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Resolves once teardown has completed and the session is `Closed`.
    pub async fn closed(&mut self) {
        let _ = self.state_rx.wait_for(|s| *s == SessionState::Closed).await;
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.shutdown_tx.try_lock() {
            if let Some(tx) = guard.take() {
                warn!("[SessionHandle] Dropped without stop(); signaling shutdown.");
                let _ = tx.send(());
            }
        } else {
            warn!("[SessionHandle] Dropped while stop() was in flight.");
        }
    }
}
