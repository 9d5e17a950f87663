//! The facade: `Submit`, `Start`, `Wait`, `Status`, `Delete`. Owns the
//! plugin [`Registry`], the [`Vault`], and the set of in-process
//! executions, and runs recovery once at construction.

use crate::config::EngineConfig;
use crate::error::{report, EngineError, EngineResult};
use crate::executor::{plan, recovery, ExecCtx};
use crate::ids::{Id, IdGenerator, Key, UuidV7Generator};
use crate::model::tree::collect_keys;
use crate::model::{Action, Checks, Plan, Status};
use crate::plugin::Registry;
use crate::time::{Clock, SystemClock};
use crate::vault::{PlanStream, Vault};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<EngineResult<()>>,
}

/// Owns everything needed to submit, start, and observe Plans: storage,
/// the plugin registry, and the set of Plans currently executing
/// in-process.
pub struct Workstream {
    vault: Arc<dyn Vault>,
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: EngineConfig,
    running: Mutex<HashMap<uuid::Uuid, RunHandle>>,
}

impl Workstream {
    /// Build a Workstream with the system clock and a v7 UUID generator,
    /// then run recovery over every Plan the Vault reports as `Running`.
    pub async fn new(vault: Arc<dyn Vault>, registry: Arc<Registry>, config: EngineConfig) -> EngineResult<Self> {
        Self::with_clock_and_ids(vault, registry, config, Arc::new(SystemClock), Arc::new(UuidV7Generator)).await
    }

    /// Build a Workstream with injected [`Clock`] and [`IdGenerator`]
    /// implementations, for deterministic tests.
    pub async fn with_clock_and_ids(
        vault: Arc<dyn Vault>,
        registry: Arc<Registry>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> EngineResult<Self> {
        let ws = Self {
            vault,
            registry,
            clock,
            ids,
            config,
            running: Mutex::new(HashMap::new()),
        };
        ws.recover().await?;
        Ok(ws)
    }

    async fn recover(&self) -> EngineResult<()> {
        let running = self.vault.recovery().await.map_err(report)?;
        for mut p in running {
            let plan_id = p.id;
            let now = self.clock.now();
            let last_update = p.state.snapshot().start.unwrap_or(now);
            if now.saturating_sub(last_update) > self.config.max_last_update {
                warn!(plan_id = %plan_id, "plan exceeds MaxLastUpdate, marking stopped rather than resuming");
                p.state.finish(Status::Stopped, now);
                p.failure_reason = crate::model::FailureReason::FRStopped;
                self.vault.update_plan(&p).await.map_err(report)?;
                continue;
            }

            let resume = recovery::fix_plan(&mut p, now);
            self.vault.update_plan(&p).await.map_err(report)?;
            match resume {
                recovery::Resume::None | recovery::Resume::Terminal => {}
                recovery::Resume::FromTop => {
                    info!(plan_id = %plan_id, "resuming recovered plan");
                    self.spawn_execution(p);
                }
            }
        }
        Ok(())
    }

    fn spawn_execution(&self, plan: Plan) {
        let ctx = ExecCtx::new(self.vault.clone(), self.registry.clone(), self.clock.clone());
        let cancel = ctx.cancel.clone();
        let plan_id = plan.id.0;
        let task = tokio::spawn(async move {
            let mut plan = plan;
            plan::run(&ctx, &mut plan).await
        });
        self.running.lock().unwrap().insert(plan_id, RunHandle { cancel, task });
    }

    /// Populate defaults, assign IDs, validate, stamp `SubmitTime`, and
    /// persist the whole tree. Returns the Plan's assigned ID.
    pub async fn submit(&self, mut p: Plan) -> EngineResult<Id> {
        crate::model::tree::assign_ids(&mut p, self.ids.as_ref());
        validate(&p, &self.registry).map_err(|msg| report(EngineError::Validation(msg)))?;
        p.submit_time = Some(self.clock.now());
        self.vault.create(&p).await.map_err(report)?;
        Ok(p.id)
    }

    /// Load the Plan, verify it is `NotStarted` and not stale, and hand it
    /// to the Plan Executor in a background task.
    pub async fn start(&self, id: Id) -> EngineResult<()> {
        let p = self.vault.read(id).await.map_err(report)?;
        if p.state.status() != Status::NotStarted {
            return Err(report(EngineError::NotStartable(id.0)));
        }
        let submit_time = p.submit_time.unwrap_or(self.clock.now());
        let age = self.clock.now().saturating_sub(submit_time);
        if age > self.config.max_submit {
            return Err(report(EngineError::Stale(id.0, age)));
        }
        self.spawn_execution(p);
        Ok(())
    }

    /// Block until the in-process execution for `id` finishes or `cancel`
    /// fires, then re-read the Plan from storage.
    pub async fn wait(&self, id: Id, cancel: CancellationToken) -> EngineResult<Plan> {
        let handle = self.running.lock().unwrap().remove(&id.0);
        if let Some(RunHandle { cancel: plan_cancel, task }) = handle {
            tokio::select! {
                result = task => {
                    if let Ok(Err(e)) = result {
                        return Err(e);
                    }
                }
                _ = cancel.cancelled() => {
                    plan_cancel.cancel();
                }
            }
        }
        self.vault.read(id).await.map_err(report)
    }

    /// A lazy stream of snapshots taken every `interval`, ending once the
    /// Plan's Status leaves `Running`. The final emission is always `Ok`.
    pub fn status(&self, id: Id, interval: Duration) -> PlanStream<'static> {
        let vault = self.vault.clone();
        Box::pin(futures::stream::unfold(Some(()), move |alive| {
            let vault = vault.clone();
            async move {
                alive?;
                tokio::time::sleep(interval).await;
                match vault.read(id).await {
                    Ok(p) => {
                        let next = if p.state.status() == Status::Running {
                            Some(())
                        } else {
                            None
                        };
                        Some((Ok(p), next))
                    }
                    Err(e) => Some((Err(e), None)),
                }
            }
        }))
    }

    /// Delete a Plan and its entire persisted subtree. Refused while the
    /// Plan is `Running` — cancel and `wait` it first.
    pub async fn delete(&self, id: Id) -> EngineResult<()> {
        let p = self.vault.read(id).await.map_err(report)?;
        if p.state.status() == Status::Running {
            return Err(report(EngineError::Validation(format!(
                "plan {id} is Running; cancel and wait for it before deleting"
            ))));
        }
        self.vault.delete(id).await.map_err(report)
    }
}

fn validate(plan: &Plan, registry: &Registry) -> Result<(), String> {
    if plan.name.trim().is_empty() {
        return Err("Plan.Name must not be empty".into());
    }
    require_not_started(plan.state.status(), "Plan", &plan.id.to_string())?;
    validate_checks_slots(plan.checks_slots(), registry)?;

    for block in &plan.blocks {
        require_not_started(block.state.status(), "Block", &block.id.to_string())?;
        validate_checks_slots(block.checks_slots(), registry)?;
        for seq in &block.sequences {
            require_not_started(seq.state.status(), "Sequence", &seq.id.to_string())?;
            for action in &seq.actions {
                validate_action(action, registry, false)?;
            }
        }
    }

    let keys = collect_keys(plan);
    let mut seen: HashSet<Key> = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(format!("duplicate Key {key}"));
        }
    }
    Ok(())
}

fn require_not_started(status: Status, kind: &str, id: &str) -> Result<(), String> {
    if status != Status::NotStarted {
        return Err(format!("{kind} {id} must not carry user-set state before Submit"));
    }
    Ok(())
}

fn validate_checks_slots(slots: [&Option<Checks>; 5], registry: &Registry) -> Result<(), String> {
    for slot in slots {
        if let Some(checks) = slot {
            require_not_started(checks.state.status(), "Checks", &checks.id.to_string())?;
            for action in &checks.actions {
                validate_action(action, registry, true)?;
            }
        }
    }
    Ok(())
}

fn validate_action(action: &Action, registry: &Registry, expect_check: bool) -> Result<(), String> {
    require_not_started(action.state.status(), "Action", &action.id.to_string())?;
    let plugin = registry.require(&action.plugin).map_err(|e| e.message)?;
    if plugin.is_check() != expect_check {
        let found = if plugin.is_check() { "a check plugin" } else { "a sequence-only plugin" };
        let wanted = if expect_check { "Checks group" } else { "Sequence" };
        return Err(format!("plugin {} is {found} and cannot be used inside a {wanted}", action.plugin));
    }
    plugin
        .validate_req(&action.req)
        .map_err(|e| format!("plugin {} rejected request: {}", action.plugin, e.message))
}
