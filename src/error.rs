//! Crate-level error types for `planforge`.
//!
//! Provides a unified [`EngineError`] that composes errors from every
//! sub-module (plugin, vault, validation) together with
//! [`error_stack::Report`] for rich, context-carrying error propagation.
//! Errors are additionally classified by a coarse taxonomy: a [`Category`]
//! (`User` vs `Internal`) and an [`ErrorKind`] type tag, both recoverable via
//! [`EngineError::kind`].
//!
//! Plugin-reported failures are deliberately *not* represented here: they
//! are captured as [`crate::model::Attempt`]s on an Action and drive its
//! `Status`, never surfacing as an `EngineError`.

use crate::plugin::PluginError;
use crate::vault::VaultError;
use thiserror::Error;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Caused by a caller-supplied Plan that failed validation.
    User,
    /// A bug or infrastructure fault internal to the engine.
    Internal,
}

/// Fine-grained type tag within a [`Category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A Plan failed validation at `Submit` time.
    Parameter,
    /// An invariant the engine itself is responsible for was violated.
    Bug,
    /// A transport/connection fault talking to a backing service.
    Conn,
    /// `Vault::Create` failed.
    StorageCreate,
    /// A per-object `Vault::Update*` failed.
    StorageUpdate,
    /// A generic Vault write failed outside Create/Update.
    StoragePut,
    /// A local filesystem fault.
    Fs,
}

/// Crate-level error type for `planforge`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The submitted Plan failed validation.
    #[error("plan validation failed: {0}")]
    Validation(String),

    /// `Start` was called on a Plan that was not `NotStarted`.
    #[error("plan {0} is not startable from its current state")]
    NotStartable(uuid::Uuid),

    /// The referenced Plan does not exist.
    #[error("plan {0} not found")]
    NotFound(uuid::Uuid),

    /// `Start` was refused because `SubmitTime` is older than `MaxSubmit`.
    #[error("plan {0} is stale: submitted {1:?} ago, exceeding MaxSubmit")]
    Stale(uuid::Uuid, std::time::Duration),

    /// A Vault operation failed.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// A plugin sub-system error surfaced to the engine boundary (e.g. during
    /// validation, before any Attempt could be recorded).
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// A (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal invariant violation — always a bug, never a user error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The coarse category this error belongs to.
    pub fn category(&self) -> Category {
        match self {
            EngineError::Validation(_) => Category::User,
            EngineError::NotStartable(_)
            | EngineError::NotFound(_)
            | EngineError::Stale(..)
            | EngineError::Vault(_)
            | EngineError::Plugin(_)
            | EngineError::Serialization(_)
            | EngineError::Internal(_) => Category::Internal,
        }
    }

    /// The fine-grained type tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Parameter,
            EngineError::NotStartable(_) => ErrorKind::Bug,
            EngineError::NotFound(_) => ErrorKind::Parameter,
            EngineError::Stale(..) => ErrorKind::Parameter,
            EngineError::Vault(e) => e.kind(),
            EngineError::Plugin(_) => ErrorKind::Bug,
            EngineError::Serialization(_) => ErrorKind::Bug,
            EngineError::Internal(_) => ErrorKind::Bug,
        }
    }
}

/// Convenience result alias using [`error_stack::Report`].
pub type EngineResult<T> = Result<T, error_stack::Report<EngineError>>;

/// Wrap any error convertible to [`EngineError`] into a fresh
/// [`error_stack::Report`], for use with `.map_err(report)?` at a call
/// boundary crossing into the engine's own error type.
pub fn report<E: Into<EngineError>>(e: E) -> error_stack::Report<EngineError> {
    error_stack::Report::new(e.into())
}
