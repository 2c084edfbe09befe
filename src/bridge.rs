//! Host bridge: the serialization point for the one thread allowed to call
//! the host application's native API.
//!
//! The bridge owns a single-request slot. `raise` parks an
//! [`ExtractionRequest`] in the slot and hands back a one-shot receiver; the
//! host's own event loop periodically calls `dispatch` on its thread, which
//! executes the pending request synchronously and resolves the receiver.
//! A second `raise` while a request is raised or executing is rejected with
//! [`ExtractError::BridgeBusy`] instead of overwriting the slot.
//!
//! One bridge instance per host session; there is no global state.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::error::{ExtractError, Result};
use crate::model::{ExtractionRequest, HostOutcome, Operation};

/// Where the bridge is in its request lifecycle.
///
/// `Completed` and `Failed` are terminal for the previous request and
/// equivalent to `Idle` for the next `raise`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Raised,
    Executing,
    Completed,
    Failed,
}

/// Host-side failure as reported by a session. Blocking failures have
/// already been rolled back by the session; the bridge converts them into a
/// structured error rather than letting them escape as a crash.
#[derive(Debug, Clone)]
pub struct HostFailure {
    pub message: String,
}

/// The seam to the host application. Implementations run on the host's
/// dedicated thread inside `dispatch` and are expected to auto-dismiss
/// non-fatal warnings (reporting them in [`HostOutcome::warnings`]) and roll
/// back on blocking errors before returning.
pub trait HostSession {
    fn execute(&mut self, request: &ExtractionRequest) -> std::result::Result<HostOutcome, HostFailure>;
}

struct Pending {
    request: ExtractionRequest,
    done: oneshot::Sender<Result<HostOutcome>>,
}

struct Inner {
    state: BridgeState,
    pending: Option<Pending>,
}

/// Cloneable handle to one host session's request slot.
#[derive(Clone)]
pub struct HostBridge {
    inner: Arc<Mutex<Inner>>,
}

impl Default for HostBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBridge {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: BridgeState::Idle,
                pending: None,
            })),
        }
    }

    pub fn state(&self) -> BridgeState {
        self.inner.lock().expect("bridge lock").state
    }

    /// Park a request and return the completion receiver the host thread
    /// will resolve. Fails fast with `BridgeBusy` while a previous request
    /// is still raised or executing.
    pub fn raise(
        &self,
        operation: Operation,
        path: &Path,
    ) -> Result<oneshot::Receiver<Result<HostOutcome>>> {
        let mut inner = self.inner.lock().expect("bridge lock");
        if matches!(inner.state, BridgeState::Raised | BridgeState::Executing) {
            return Err(ExtractError::BridgeBusy);
        }

        let (tx, rx) = oneshot::channel();
        inner.pending = Some(Pending {
            request: ExtractionRequest {
                operation,
                path: path.to_path_buf(),
            },
            done: tx,
        });
        inner.state = BridgeState::Raised;
        info!(?operation, path = %path.display(), "host request raised");
        Ok(rx)
    }

    /// Entry point for the host's event loop, called on the host thread.
    /// With nothing pending this is a no-op, so the host may poll it freely.
    pub fn dispatch<S: HostSession + ?Sized>(&self, session: &mut S) {
        let pending = {
            let mut inner = self.inner.lock().expect("bridge lock");
            match inner.pending.take() {
                Some(p) => {
                    inner.state = BridgeState::Executing;
                    p
                }
                None => return,
            }
        };

        // The lock is not held while the host runs; a concurrent `raise`
        // still observes `Executing` and is rejected.
        let result = match session.execute(&pending.request) {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    warn!(warning = %warning, "host warning auto-dismissed");
                }
                Ok(outcome)
            }
            Err(failure) => {
                warn!(error = %failure.message, "host execution failed, rolled back");
                Err(ExtractError::HostExecution(failure.message))
            }
        };

        let final_state = if result.is_ok() {
            BridgeState::Completed
        } else {
            BridgeState::Failed
        };
        self.inner.lock().expect("bridge lock").state = final_state;

        // The caller's wait may have timed out; its receiver being gone
        // must not take the host thread down with it.
        if pending.done.send(result).is_err() {
            warn!(
                path = %pending.request.path.display(),
                "host result dropped: caller stopped waiting"
            );
        }
    }
}
