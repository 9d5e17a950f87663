//! Planforge — a persistent, crash-recoverable executor for hierarchical
//! plans of user-supplied actions.
//!
//! This crate is the *core* of the engine: the composite state machine that
//! drives a [`model::Plan`] through checks, blocks, sequences and actions,
//! persisting every transition through a pluggable [`vault::Vault`] and
//! resuming consistently after a crash via [`executor::recovery`].
//!
//! Concrete storage backends, concrete [`plugin::Plugin`] implementations,
//! and the builder DSL used to construct [`model::Plan`] values in the first
//! place are external collaborators and intentionally not provided here.

pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod plugin;
pub mod time;
pub mod vault;

pub mod executor;
pub mod workstream;

pub use error::{EngineError, EngineResult};
pub use workstream::Workstream;
