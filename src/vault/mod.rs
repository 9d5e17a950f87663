//! The pluggable persistence contract.
//!
//! `planforge` ships no concrete backend — SQLite, a blob store, an
//! in-memory map are all external collaborators implementing [`Vault`].
//! Only the contract, the stream types used by `List`/`Search`, and a
//! shared retry helper for backends whose writes are not immediately
//! durable live here.

pub mod stream;

pub use stream::{PlanStream, SearchFilter};

use crate::error::ErrorKind;
use crate::model::{Plan, Status};
use crate::plugin::Policy;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Error surfaced by a [`Vault`] implementation.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum VaultError {
    #[error("plan {0} not found")]
    NotFound(uuid::Uuid),

    #[error("vault write conflict: {0}")]
    Conflict(String),

    #[error("vault connection error: {0}")]
    Conn(String),

    #[error("vault create failed: {0}")]
    Create(String),

    #[error("vault update failed: {0}")]
    Update(String),

    #[error("vault write failed: {0}")]
    Put(String),

    #[error("filesystem error: {0}")]
    Fs(String),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::NotFound(_) | VaultError::Conflict(_) => ErrorKind::Parameter,
            VaultError::Conn(_) => ErrorKind::Conn,
            VaultError::Create(_) => ErrorKind::StorageCreate,
            VaultError::Update(_) => ErrorKind::StorageUpdate,
            VaultError::Put(_) => ErrorKind::StoragePut,
            VaultError::Fs(_) => ErrorKind::Fs,
        }
    }

    /// Whether this failure is permanent — retrying internally would never
    /// help. [`NotFound`](VaultError::NotFound) and
    /// [`Conflict`](VaultError::Conflict) are the caller's problem, not a
    /// transient backend fault.
    pub fn is_permanent(&self) -> bool {
        matches!(self, VaultError::NotFound(_) | VaultError::Conflict(_))
    }
}

/// The pluggable storage backend. Every write must be atomic for the
/// single object it touches; `Create` must be atomic for the whole tree.
#[async_trait]
pub trait Vault: Send + Sync {
    /// Atomically persist an entire new Plan tree.
    async fn create(&self, plan: &Plan) -> Result<(), VaultError>;

    async fn update_plan(&self, plan: &Plan) -> Result<(), VaultError>;
    async fn update_block(&self, plan_id: crate::ids::Id, block: &crate::model::Block) -> Result<(), VaultError>;
    async fn update_checks(&self, plan_id: crate::ids::Id, checks: &crate::model::Checks) -> Result<(), VaultError>;
    async fn update_sequence(
        &self,
        plan_id: crate::ids::Id,
        sequence: &crate::model::Sequence,
    ) -> Result<(), VaultError>;
    async fn update_action(&self, plan_id: crate::ids::Id, action: &crate::model::Action) -> Result<(), VaultError>;

    /// Read a full Plan tree by ID.
    async fn read(&self, id: crate::ids::Id) -> Result<Plan, VaultError>;

    async fn exists(&self, id: crate::ids::Id) -> Result<bool, VaultError>;

    /// A lazy stream of the most recent `limit` Plans.
    fn list(&self, limit: usize) -> PlanStream<'_>;

    /// A lazy stream of Plans matching `filter`.
    fn search(&self, filter: SearchFilter) -> PlanStream<'_>;

    /// Delete a Plan and its entire persisted subtree.
    async fn delete(&self, id: crate::ids::Id) -> Result<(), VaultError>;

    async fn close(&self) -> Result<(), VaultError>;

    /// Invoked once at startup, before any new execution begins. Returns
    /// every Plan whose Status is `Running` — recovery's input set.
    async fn recovery(&self) -> Result<Vec<Plan>, VaultError> {
        let mut running = Vec::new();
        let mut stream = self.search(SearchFilter::default().with_status(Status::Running));
        use futures::StreamExt;
        while let Some(item) = stream.next().await {
            running.push(item?);
        }
        Ok(running)
    }
}

/// Retry a fallible write with exponential backoff, surfacing only
/// permanent failures to the caller. Intended for `Vault` implementations
/// whose backend write is not always immediately durable (a contended row,
/// a transient connection drop) — see the Vault contract's retry note.
pub async fn retry_write<T, Fut>(
    policy: &Policy,
    is_permanent: impl Fn(&VaultError) -> bool,
    mut op: impl FnMut() -> Fut,
) -> Result<T, VaultError>
where
    Fut: Future<Output = Result<T, VaultError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_permanent(&err) => return Err(err),
            Err(err) => {
                if !policy.allows_attempt(attempt) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt).max(Duration::from_millis(1));
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
