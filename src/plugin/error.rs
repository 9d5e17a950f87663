//! Structured plugin errors.
//!
//! Plugin failures are never engine errors — they are captured as
//! [`PluginError`] values inside an Action's [`crate::model::Attempt`] and
//! drive that Action's `Status`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The stable message synthesized for an Action whose plugin exceeded its
/// `Timeout`.
pub const PLUGIN_TIMEOUT_MSG: &str = "plugin execution timed out";

/// A structured error returned by a [`crate::plugin::Plugin`].
///
/// `Permanent = true` tells the Action Runner to stop retrying immediately,
/// regardless of remaining `Retries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginError {
    pub code: u32,
    pub message: String,
    pub permanent: bool,
    pub wrapped: Option<Box<PluginError>>,
}

impl PluginError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            permanent: false,
            wrapped: None,
        }
    }

    pub fn permanent(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            permanent: true,
            wrapped: None,
        }
    }

    pub fn wrapping(mut self, inner: PluginError) -> Self {
        self.wrapped = Some(Box::new(inner));
        self
    }

    /// A synthetic, retryable error for an Action whose `Timeout` elapsed
    /// before the plugin returned. Not `permanent` — a timeout alone must
    /// not stop retries.
    pub fn timeout() -> Self {
        PluginError::new(0, PLUGIN_TIMEOUT_MSG)
    }

    /// A synthetic permanent error for a plugin name absent from the
    /// registry.
    pub fn plugin_not_found(name: &str) -> Self {
        PluginError::permanent(1, format!("plugin not found: {name}"))
    }

    /// A synthetic permanent error for a response whose runtime type did
    /// not match the plugin's declared `Response()` prototype.
    pub fn type_mismatch(plugin: &str) -> Self {
        PluginError::permanent(2, format!("response type mismatch for plugin: {plugin}"))
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(w) = &self.wrapped {
            write!(f, " (caused by: {w})")?;
        }
        Ok(())
    }
}

impl std::error::Error for PluginError {}
