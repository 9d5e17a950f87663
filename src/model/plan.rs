//! Entity types forming the ownership tree rooted at [`Plan`].

use super::state::{FailureReason, StateCell};
use crate::ids::{Id, Key};
use crate::plugin::{PluginError, DEFAULT_ACTION_TIMEOUT, MIN_ACTION_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The record of one execution of an [`Action`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub resp: serde_json::Value,
    pub err: Option<PluginError>,
    pub start: Option<Duration>,
    pub end: Option<Duration>,
}

impl Attempt {
    pub fn success(resp: serde_json::Value, start: Duration, end: Duration) -> Self {
        Self {
            resp,
            err: None,
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn failure(err: PluginError, start: Duration, end: Duration) -> Self {
        Self {
            resp: serde_json::Value::Null,
            err: Some(err),
            start: Some(start),
            end: Some(end),
        }
    }

    /// An attempt that was started but never finished — the shape recovery
    /// discards.
    pub fn partial(start: Duration) -> Self {
        Self {
            resp: serde_json::Value::Null,
            err: None,
            start: Some(start),
            end: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.err.is_none() && self.end.is_some()
    }
}

/// A single plugin invocation with timeout and retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: Id,
    pub key: Option<Key>,
    pub plugin: String,
    pub timeout: Duration,
    pub retries: u32,
    pub req: serde_json::Value,
    pub attempts: Vec<Attempt>,
    #[serde(flatten)]
    pub state: StateCell,
}

impl Action {
    pub fn new(plugin: impl Into<String>, req: serde_json::Value) -> Self {
        Self {
            id: Id::nil(),
            key: None,
            plugin: plugin.into(),
            timeout: DEFAULT_ACTION_TIMEOUT,
            retries: 0,
            req,
            attempts: Vec::new(),
            state: StateCell::new(),
        }
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Clamp `Timeout` to the `[MIN_ACTION_TIMEOUT, ..]` floor, defaulting
    /// a zero value to [`DEFAULT_ACTION_TIMEOUT`].
    pub fn normalize_timeout(&mut self) {
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_ACTION_TIMEOUT;
        } else if self.timeout < MIN_ACTION_TIMEOUT {
            self.timeout = MIN_ACTION_TIMEOUT;
        }
    }
}

/// A group of check-plugin Actions run in parallel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checks {
    pub id: Id,
    pub key: Option<Key>,
    /// Sleep between continuous-check ticks. Meaningless outside a
    /// `ContChecks` slot.
    pub delay: Duration,
    pub actions: Vec<Action>,
    #[serde(flatten)]
    pub state: StateCell,
}

impl Checks {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            id: Id::nil(),
            key: None,
            delay: Duration::from_nanos(1),
            actions,
            state: StateCell::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        // floor 1ns so a zero delay never busy-loops the continuous check.
        self.delay = delay.max(Duration::from_nanos(1));
        self
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }
}

/// An ordered list of Actions executed serially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: Id,
    pub key: Option<Key>,
    pub actions: Vec<Action>,
    #[serde(flatten)]
    pub state: StateCell,
}

impl Sequence {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            id: Id::nil(),
            key: None,
            actions,
            state: StateCell::new(),
        }
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }
}

/// Unlimited failure tolerance, encoded as `-1` per the wire contract.
pub const UNLIMITED_TOLERANCE: i64 = -1;

/// A grouping of related Sequences with its own checks, concurrency, and
/// failure tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: Id,
    pub key: Option<Key>,
    pub entrance_delay: Duration,
    pub exit_delay: Duration,
    pub bypass_checks: Option<Checks>,
    pub pre_checks: Option<Checks>,
    pub cont_checks: Option<Checks>,
    pub post_checks: Option<Checks>,
    pub deferred_checks: Option<Checks>,
    pub sequences: Vec<Sequence>,
    pub concurrency: u32,
    pub tolerated_failures: i64,
    #[serde(flatten)]
    pub state: StateCell,
}

impl Block {
    pub fn new(sequences: Vec<Sequence>) -> Self {
        Self {
            id: Id::nil(),
            key: None,
            entrance_delay: Duration::ZERO,
            exit_delay: Duration::ZERO,
            bypass_checks: None,
            pre_checks: None,
            cont_checks: None,
            post_checks: None,
            deferred_checks: None,
            sequences,
            concurrency: 1,
            tolerated_failures: 0,
            state: StateCell::new(),
        }
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_tolerated_failures(mut self, tolerated: i64) -> Self {
        self.tolerated_failures = tolerated;
        self
    }

    /// Whether `failed` exceeds the tolerated count (`-1` means unlimited).
    pub fn exceeds_tolerance(&self, failed: u32) -> bool {
        if self.tolerated_failures < 0 {
            return false;
        }
        failed as i64 > self.tolerated_failures
    }
}

/// The root workflow object a caller submits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Id,
    pub group_id: Option<String>,
    pub name: String,
    pub descr: String,
    pub meta: Vec<u8>,
    pub submit_time: Option<Duration>,
    pub failure_reason: FailureReason,
    pub bypass_checks: Option<Checks>,
    pub pre_checks: Option<Checks>,
    pub cont_checks: Option<Checks>,
    pub post_checks: Option<Checks>,
    pub deferred_checks: Option<Checks>,
    pub blocks: Vec<Block>,
    #[serde(flatten)]
    pub state: StateCell,
}

impl Plan {
    pub fn new(name: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            id: Id::nil(),
            group_id: None,
            name: name.into(),
            descr: String::new(),
            meta: Vec::new(),
            submit_time: None,
            failure_reason: FailureReason::default(),
            bypass_checks: None,
            pre_checks: None,
            cont_checks: None,
            post_checks: None,
            deferred_checks: None,
            blocks,
            state: StateCell::new(),
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_descr(mut self, descr: impl Into<String>) -> Self {
        self.descr = descr.into();
        self
    }
}
