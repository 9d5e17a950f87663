//! State cell and status types shared by every non-[`Attempt`] entity.
//!
//! [`StateCell`] holds state behind an atomically swappable pointer: readers
//! take a cheap `Arc` clone of the current [`StateSnapshot`] while writers
//! atomically replace it, so concurrent readers (the executor, a `Status`
//! stream consumer, a background continuous-check loop) always observe a
//! consistent snapshot rather than a torn read across
//! `status`/`start`/`end`.
//!
//! [`Attempt`]: crate::model::Attempt

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lifecycle status of a Plan, Block, Sequence, Checks group, or Action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    NotStarted,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl Status {
    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Stopped)
    }
}

/// The tag on a terminal Plan identifying which stage caused failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FailureReason {
    #[default]
    FRUnknown,
    FRPreCheck,
    FRContCheck,
    FRPostCheck,
    FRDeferredCheck,
    FRBlock,
    FRStopped,
}

/// An opaque optimistic-concurrency tag, bumped by the Vault on every write.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ETag(pub String);

/// A point-in-time, immutable view of an entity's lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub status: Status,
    pub start: Option<Duration>,
    pub end: Option<Duration>,
    pub etag: ETag,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            status: Status::NotStarted,
            start: None,
            end: None,
            etag: ETag::default(),
        }
    }
}

/// An atomically-swappable state cell, attached to every non-Attempt entity.
///
/// Reads and writes are atomic in memory: [`StateCell::snapshot`] never
/// observes a half-updated combination of `status`/`start`/`end`.
#[derive(Debug)]
pub struct StateCell(Mutex<Arc<StateSnapshot>>);

impl StateCell {
    pub fn new() -> Self {
        Self(Mutex::new(Arc::new(StateSnapshot::default())))
    }

    /// A consistent, cheap-to-clone snapshot of the current state.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.0.lock().expect("state cell mutex poisoned").clone()
    }

    pub fn status(&self) -> Status {
        self.snapshot().status
    }

    /// Replace the snapshot wholesale, bumping the ETag.
    pub fn set(&self, status: Status, start: Option<Duration>, end: Option<Duration>) {
        let next = Arc::new(StateSnapshot {
            status,
            start,
            end,
            etag: ETag(uuid::Uuid::new_v4().to_string()),
        });
        *self.0.lock().expect("state cell mutex poisoned") = next;
    }

    /// Transition to `Running`, stamping `start` and clearing `end`.
    pub fn start(&self, at: Duration) {
        self.set(Status::Running, Some(at), None);
    }

    /// Transition to a terminal status, stamping `end`. No-op (other than a
    /// debug assertion) if already terminal — terminal statuses never
    /// change once set.
    pub fn finish(&self, status: Status, at: Duration) {
        debug_assert!(status.is_terminal(), "finish() requires a terminal status");
        let cur = self.snapshot();
        if cur.status.is_terminal() {
            return;
        }
        self.set(status, cur.start.or(Some(at)), Some(at));
    }

    /// Restore from a persisted snapshot (used by recovery / Vault reads).
    pub fn restore(&self, snapshot: StateSnapshot) {
        *self.0.lock().expect("state cell mutex poisoned") = Arc::new(snapshot);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateCell {
    fn clone(&self) -> Self {
        Self(Mutex::new(self.0.lock().expect("poisoned").clone()))
    }
}

// Serializes/deserializes as its current snapshot, so `#[serde(flatten)]`
// on an owning entity puts `status`/`start`/`end`/`etag` directly on that
// entity's wire representation instead of nesting a cell object.
impl Serialize for StateCell {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.snapshot().as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StateCell {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let snapshot = StateSnapshot::deserialize(deserializer)?;
        let cell = StateCell::new();
        cell.restore(snapshot);
        Ok(cell)
    }
}
