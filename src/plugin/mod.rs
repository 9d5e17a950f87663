//! The plugin contract.
//!
//! Dynamic dispatch across differently-typed plugin requests/responses is
//! expressed the way a statically typed language should: request/response
//! payloads cross the trait boundary as [`serde_json::Value`], and each
//! plugin carries a *type tag* ([`Plugin::request_type_name`]/
//! [`Plugin::response_type_name`]) used by the registry and the Action
//! Runner to catch type mismatches, instead of reflective unmarshalling
//! against a runtime prototype instance.

pub mod error;
pub mod policy;
pub mod registry;

pub use error::{PluginError, PLUGIN_TIMEOUT_MSG};
pub use policy::Policy;
pub use registry::Registry;

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A user-supplied unit of work exposed through the standard plugin
/// contract.
///
/// Implementations must be safe to invoke concurrently once registered:
/// `execute` takes `&self`, not `&mut self` — any mutable state a plugin
/// needs must be interior (e.g. behind a `Mutex` or an `AtomicXxx`).
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable, globally unique plugin name.
    fn name(&self) -> &str;

    /// Whether this plugin may only be used inside a Checks group (`true`)
    /// or only inside a Sequence (`false`).
    fn is_check(&self) -> bool;

    /// The retry/backoff policy governing Action attempts against this
    /// plugin.
    fn retry_policy(&self) -> Policy {
        Policy::default()
    }

    /// Type tag standing in for the `Request()` prototype.
    fn request_type_name(&self) -> &'static str;

    /// Type tag standing in for the `Response()` prototype.
    fn response_type_name(&self) -> &'static str;

    /// Called once, after the plugin is loaded into a [`Registry`] and
    /// before any Action can reference it.
    fn init(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Validate a request at Plan-submission time, before any Action runs.
    fn validate_req(&self, req: &serde_json::Value) -> Result<(), PluginError>;

    /// Whether a decoded response value is of the shape this plugin
    /// declares via `response_type_name`. A plugin with a structural
    /// response type should check required fields here; the default accepts
    /// anything that isn't `Value::Null`, appropriate for plugins whose
    /// response type is effectively untyped JSON.
    fn validate_resp(&self, resp: &serde_json::Value) -> bool {
        !resp.is_null()
    }

    /// Execute the plugin against `req`, honouring cooperative
    /// cancellation via `cancel`. The Action Runner additionally races this
    /// future against `Timeout`; plugins are not required to self-enforce
    /// a deadline.
    async fn execute(
        &self,
        cancel: CancellationToken,
        req: serde_json::Value,
    ) -> Result<serde_json::Value, PluginError>;
}

/// The default `Action.Timeout` when a Plan omits one.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// `Action.Timeout` may never be configured below this floor.
pub const MIN_ACTION_TIMEOUT: Duration = Duration::from_secs(5);
