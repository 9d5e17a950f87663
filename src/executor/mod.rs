//! Shared executor plumbing: the context threaded through every state
//! function, and the continuous-check task handle.

pub mod action_runner;
pub mod block;
pub mod checks;
pub mod plan;
pub mod recovery;
pub mod sequence;

use crate::ids::Id;
use crate::plugin::{PluginError, Registry};
use crate::time::Clock;
use crate::vault::Vault;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything a state function needs: storage, the plugin registry, the
/// clock, and the Plan-scoped cancellation token.
#[derive(Clone)]
pub struct ExecCtx {
    pub vault: Arc<dyn Vault>,
    pub registry: Arc<Registry>,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancellationToken,
}

impl ExecCtx {
    pub fn new(vault: Arc<dyn Vault>, registry: Arc<Registry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            vault,
            registry,
            clock,
            cancel: CancellationToken::new(),
        }
    }

    /// A child context sharing everything but carrying its own derived
    /// cancellation token (cancelled automatically when the parent is).
    pub fn child_cancel(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }
}

/// A running continuous-check background loop, per the "cancel then drain"
/// rule: callers must call [`ContCheckHandle::drain_nonblocking`] at every
/// sequence dispatch / PostChecks entry, and [`ContCheckHandle::stop`]
/// exactly once at teardown.
pub struct ContCheckHandle {
    cancel: CancellationToken,
    rx: mpsc::Receiver<Option<PluginError>>,
    task: JoinHandle<()>,
    last_failure: Option<PluginError>,
}

impl ContCheckHandle {
    pub(crate) fn new(cancel: CancellationToken, rx: mpsc::Receiver<Option<PluginError>>, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            rx,
            task,
            last_failure: None,
        }
    }

    /// Non-blocking poll for a tick's outcome. Returns `Some(err)` the
    /// first (and only) time the loop reports a failure; the failure is
    /// latched so repeated calls keep observing it even after the channel
    /// closes.
    pub fn drain_nonblocking(&mut self) -> Option<PluginError> {
        if let Some(err) = &self.last_failure {
            return Some(err.clone());
        }
        match self.rx.try_recv() {
            Ok(Some(err)) => {
                self.last_failure = Some(err.clone());
                Some(err)
            }
            Ok(None) | Err(_) => None,
        }
    }

    /// Cancel the loop, then drain the channel to completion — cancelling
    /// first ensures the drain can't race a tick that's still in progress.
    /// Draining in a loop until the channel closes (rather than a single
    /// `recv`) matters with the size-1 channel: a buffered success tick
    /// must not free the slot and let a concurrently-produced failure be
    /// sent and then never read.
    pub async fn stop(mut self) -> Option<PluginError> {
        self.cancel.cancel();
        if self.last_failure.is_none() {
            while let Some(msg) = self.rx.recv().await {
                if let Some(err) = msg {
                    self.last_failure = Some(err);
                    break;
                }
            }
        }
        let _ = self.task.await;
        self.last_failure
    }
}

/// Shorthand used across the executor modules for "the ID of the Plan this
/// subtree belongs to", threaded separately from the entity itself since
/// children only store a weak back-reference to their Plan's ID.
pub type PlanId = Id;
