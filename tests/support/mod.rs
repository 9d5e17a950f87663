//! Shared doubles for the end-to-end scenario tests: a full in-memory
//! [`Vault`] and a handful of scripted [`Plugin`]s.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use planforge::ids::Id;
use planforge::model::{Action, Block, Checks, Plan, Sequence, Status};
use planforge::plugin::{Plugin, PluginError, Policy};
use planforge::vault::{PlanStream, SearchFilter, Vault, VaultError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A full-featured in-memory [`Vault`]: every entity update locates its
/// owning Plan and replaces the matching child in place, the way a real
/// backend would after decoding a row back into the tree.
#[derive(Default)]
pub struct MemoryVault {
    plans: Mutex<HashMap<uuid::Uuid, Plan>>,
}

impl MemoryVault {
    fn with_plan<T>(&self, id: Id, f: impl FnOnce(&mut Plan) -> Result<T, VaultError>) -> Result<T, VaultError> {
        let mut guard = self.plans.lock().unwrap();
        let plan = guard.get_mut(&id.0).ok_or(VaultError::NotFound(id.0))?;
        f(plan)
    }

    fn find_block<'a>(plan: &'a mut Plan, id: Id) -> Option<&'a mut Block> {
        plan.blocks.iter_mut().find(|b| b.id == id)
    }

    fn find_checks<'a>(plan: &'a mut Plan, id: Id) -> Option<&'a mut Checks> {
        let mut slots: Vec<&mut Option<Checks>> = plan.checks_slots_mut().into_iter().collect();
        for block in &mut plan.blocks {
            slots.extend(block.checks_slots_mut());
        }
        slots.into_iter().filter_map(|s| s.as_mut()).find(|c| c.id == id)
    }

    fn find_sequence<'a>(plan: &'a mut Plan, id: Id) -> Option<&'a mut Sequence> {
        plan.blocks.iter_mut().flat_map(|b| b.sequences.iter_mut()).find(|s| s.id == id)
    }

    fn find_action<'a>(plan: &'a mut Plan, id: Id) -> Option<&'a mut Action> {
        let mut slots: Vec<&mut Option<Checks>> = plan.checks_slots_mut().into_iter().collect();
        for block in &mut plan.blocks {
            slots.extend(block.checks_slots_mut());
        }
        for slot in slots {
            if let Some(checks) = slot {
                if let Some(a) = checks.actions.iter_mut().find(|a| a.id == id) {
                    return Some(a);
                }
            }
        }
        for block in &mut plan.blocks {
            for seq in &mut block.sequences {
                if let Some(a) = seq.actions.iter_mut().find(|a| a.id == id) {
                    return Some(a);
                }
            }
        }
        None
    }
}

#[async_trait]
impl Vault for MemoryVault {
    async fn create(&self, plan: &Plan) -> Result<(), VaultError> {
        self.plans.lock().unwrap().insert(plan.id.0, plan.clone());
        Ok(())
    }

    async fn update_plan(&self, plan: &Plan) -> Result<(), VaultError> {
        self.with_plan(plan.id, |p| {
            *p = plan.clone();
            Ok(())
        })
    }

    async fn update_block(&self, plan_id: Id, block: &Block) -> Result<(), VaultError> {
        self.with_plan(plan_id, |p| {
            let target = Self::find_block(p, block.id).ok_or(VaultError::NotFound(block.id.0))?;
            *target = block.clone();
            Ok(())
        })
    }

    async fn update_checks(&self, plan_id: Id, checks: &Checks) -> Result<(), VaultError> {
        self.with_plan(plan_id, |p| {
            let target = Self::find_checks(p, checks.id).ok_or(VaultError::NotFound(checks.id.0))?;
            *target = checks.clone();
            Ok(())
        })
    }

    async fn update_sequence(&self, plan_id: Id, sequence: &Sequence) -> Result<(), VaultError> {
        self.with_plan(plan_id, |p| {
            let target = Self::find_sequence(p, sequence.id).ok_or(VaultError::NotFound(sequence.id.0))?;
            *target = sequence.clone();
            Ok(())
        })
    }

    async fn update_action(&self, plan_id: Id, action: &Action) -> Result<(), VaultError> {
        self.with_plan(plan_id, |p| {
            let target = Self::find_action(p, action.id).ok_or(VaultError::NotFound(action.id.0))?;
            *target = action.clone();
            Ok(())
        })
    }

    async fn read(&self, id: Id) -> Result<Plan, VaultError> {
        self.plans.lock().unwrap().get(&id.0).cloned().ok_or(VaultError::NotFound(id.0))
    }

    async fn exists(&self, id: Id) -> Result<bool, VaultError> {
        Ok(self.plans.lock().unwrap().contains_key(&id.0))
    }

    fn list(&self, limit: usize) -> PlanStream<'_> {
        let mut plans: Vec<_> = self.plans.lock().unwrap().values().cloned().collect();
        plans.truncate(limit);
        Box::pin(stream::iter(plans.into_iter().map(Ok)))
    }

    fn search(&self, filter: SearchFilter) -> PlanStream<'_> {
        let plans: Vec<_> = self
            .plans
            .lock()
            .unwrap()
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        Box::pin(stream::iter(plans.into_iter().map(Ok)))
    }

    async fn delete(&self, id: Id) -> Result<(), VaultError> {
        self.plans.lock().unwrap().remove(&id.0).ok_or(VaultError::NotFound(id.0))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), VaultError> {
        Ok(())
    }
}

/// A plugin that replays a fixed script of outcomes, repeating the last
/// entry once exhausted. The workhorse double for every scenario below.
pub struct ScriptedPlugin {
    name: String,
    is_check: bool,
    policy: Policy,
    delay: Option<Duration>,
    script: Mutex<Vec<Result<serde_json::Value, PluginError>>>,
    calls: AtomicUsize,
}

impl ScriptedPlugin {
    pub fn new(name: &str, script: Vec<Result<serde_json::Value, PluginError>>) -> Self {
        Self {
            name: name.to_string(),
            is_check: false,
            policy: Policy::fixed(Duration::ZERO),
            delay: None,
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ok(name: &str) -> Self {
        Self::new(name, vec![Ok(serde_json::json!({"ok": true}))])
    }

    pub fn failing(name: &str) -> Self {
        Self::new(name, vec![Err(PluginError::permanent(1, format!("{name} always fails")))])
    }

    pub fn check(mut self) -> Self {
        self.is_check = true;
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_check(&self) -> bool {
        self.is_check
    }

    fn retry_policy(&self) -> Policy {
        self.policy.clone()
    }

    fn request_type_name(&self) -> &'static str {
        "test.Request"
    }

    fn response_type_name(&self) -> &'static str {
        "test.Response"
    }

    fn validate_req(&self, _req: &serde_json::Value) -> Result<(), PluginError> {
        Ok(())
    }

    async fn execute(&self, _cancel: CancellationToken, _req: serde_json::Value) -> Result<serde_json::Value, PluginError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let script = self.script.lock().unwrap();
        let outcome = script.get(idx).or_else(|| script.last()).cloned();
        outcome.unwrap_or_else(|| Ok(serde_json::json!({"ok": true})))
    }
}

pub fn action(plugin: &str) -> Action {
    Action::new(plugin, serde_json::json!({})).with_retries(0).with_timeout(Duration::from_secs(5))
}

pub fn seq(plugin: &str) -> Sequence {
    Sequence::new(vec![action(plugin)])
}

pub fn plan_with_blocks(name: &str, blocks: Vec<Block>) -> Plan {
    Plan::new(name, blocks)
}
