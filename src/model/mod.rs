//! The entity tree: Plan/Block/Sequence/Checks/Action/Attempt, their shared
//! state cell, and the walker that holds the traversal order shared by
//! validation, recovery, and the executor.

pub mod plan;
pub mod state;
pub mod tree;

pub use plan::{Action, Attempt, Block, Checks, Plan, Sequence, UNLIMITED_TOLERANCE};
pub use state::{ETag, FailureReason, StateCell, StateSnapshot, Status};
