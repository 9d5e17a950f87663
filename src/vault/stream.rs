//! Lazy stream types returned by `Vault::list`/`Vault::search`.

use super::VaultError;
use crate::ids::Id;
use crate::model::{Plan, Status};
use futures::stream::BoxStream;

/// A lazy stream of Plans, each tagged with its own per-item error so one
/// corrupt or unreadable record doesn't abort the whole scan.
pub type PlanStream<'a> = BoxStream<'a, Result<Plan, VaultError>>;

/// Filter accepted by `Vault::search`: matches a Plan if every non-empty
/// field matches (`IDs`/`GroupIDs`/`Statuses` behave as OR-within,
/// AND-across).
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub ids: Vec<Id>,
    pub group_ids: Vec<String>,
    pub statuses: Vec<Status>,
}

impl SearchFilter {
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.ids.extend(ids);
        self
    }

    pub fn with_group_ids(mut self, group_ids: impl IntoIterator<Item = String>) -> Self {
        self.group_ids.extend(group_ids);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.statuses.push(status);
        self
    }

    /// Whether `plan` satisfies this filter.
    pub fn matches(&self, plan: &Plan) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&plan.id) {
            return false;
        }
        if !self.group_ids.is_empty() {
            let matches_group = plan
                .group_id
                .as_ref()
                .is_some_and(|g| self.group_ids.contains(g));
            if !matches_group {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&plan.state.status()) {
            return false;
        }
        true
    }
}
