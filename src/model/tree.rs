//! Tree-walking helpers shared by validation, ID assignment, and recovery.
//!
//! Every walk visits the five Checks slots in the canonical order
//! `Bypass, Pre, Cont, Post, Deferred` — the order the final-state
//! classifier and recovery both depend on.

use super::plan::{Action, Block, Checks, Plan, Sequence};
use crate::ids::{Id, IdGenerator, Key};

/// The five Checks slots an object (Plan or Block) may carry, in the
/// canonical order used throughout the executor and recovery.
pub fn checks_slots_mut(
    bypass: &mut Option<Checks>,
    pre: &mut Option<Checks>,
    cont: &mut Option<Checks>,
    post: &mut Option<Checks>,
    deferred: &mut Option<Checks>,
) -> [&mut Option<Checks>; 5] {
    [bypass, pre, cont, post, deferred]
}

impl Plan {
    /// The Plan's five checks slots, in canonical order.
    pub fn checks_slots(&self) -> [&Option<Checks>; 5] {
        [
            &self.bypass_checks,
            &self.pre_checks,
            &self.cont_checks,
            &self.post_checks,
            &self.deferred_checks,
        ]
    }

    pub fn checks_slots_mut(&mut self) -> [&mut Option<Checks>; 5] {
        checks_slots_mut(
            &mut self.bypass_checks,
            &mut self.pre_checks,
            &mut self.cont_checks,
            &mut self.post_checks,
            &mut self.deferred_checks,
        )
    }
}

impl Block {
    pub fn checks_slots(&self) -> [&Option<Checks>; 5] {
        [
            &self.bypass_checks,
            &self.pre_checks,
            &self.cont_checks,
            &self.post_checks,
            &self.deferred_checks,
        ]
    }

    pub fn checks_slots_mut(&mut self) -> [&mut Option<Checks>; 5] {
        checks_slots_mut(
            &mut self.bypass_checks,
            &mut self.pre_checks,
            &mut self.cont_checks,
            &mut self.post_checks,
            &mut self.deferred_checks,
        )
    }
}

/// Assign a fresh [`Id`] to every entity in the tree whose `id` is still
/// [`Id::nil`], depth-first, Plan first.
pub fn assign_ids(plan: &mut Plan, gen: &dyn IdGenerator) {
    if plan.id == Id::nil() {
        plan.id = gen.new_id();
    }
    for slot in plan.checks_slots_mut() {
        if let Some(checks) = slot {
            assign_checks_ids(checks, gen);
        }
    }
    for block in &mut plan.blocks {
        assign_block_ids(block, gen);
    }
}

fn assign_block_ids(block: &mut Block, gen: &dyn IdGenerator) {
    if block.id == Id::nil() {
        block.id = gen.new_id();
    }
    for slot in block.checks_slots_mut() {
        if let Some(checks) = slot {
            assign_checks_ids(checks, gen);
        }
    }
    for seq in &mut block.sequences {
        if seq.id == Id::nil() {
            seq.id = gen.new_id();
        }
        for action in &mut seq.actions {
            assign_action_ids(action, gen);
        }
    }
}

fn assign_checks_ids(checks: &mut Checks, gen: &dyn IdGenerator) {
    if checks.id == Id::nil() {
        checks.id = gen.new_id();
    }
    for action in &mut checks.actions {
        assign_action_ids(action, gen);
    }
}

fn assign_action_ids(action: &mut Action, gen: &dyn IdGenerator) {
    if action.id == Id::nil() {
        action.id = gen.new_id();
    }
    action.normalize_timeout();
}

/// Collect every user-supplied [`Key`] in the tree, in traversal order.
/// Used by validation to detect duplicates.
pub fn collect_keys(plan: &Plan) -> Vec<Key> {
    let mut keys = Vec::new();
    for slot in plan.checks_slots() {
        if let Some(checks) = slot {
            collect_checks_keys(checks, &mut keys);
        }
    }
    for block in &plan.blocks {
        if let Some(k) = block.key {
            keys.push(k);
        }
        for slot in block.checks_slots() {
            if let Some(checks) = slot {
                collect_checks_keys(checks, &mut keys);
            }
        }
        for seq in &block.sequences {
            if let Some(k) = seq.key {
                keys.push(k);
            }
            for action in &seq.actions {
                if let Some(k) = action.key {
                    keys.push(k);
                }
            }
        }
    }
    keys
}

fn collect_checks_keys(checks: &Checks, out: &mut Vec<Key>) {
    if let Some(k) = checks.key {
        out.push(k);
    }
    for action in &checks.actions {
        if let Some(k) = action.key {
            out.push(k);
        }
    }
}

/// Visit every [`Action`] in the tree, including those inside Checks slots.
pub fn for_each_action<'a>(plan: &'a Plan, mut f: impl FnMut(&'a Action)) {
    for slot in plan.checks_slots() {
        if let Some(checks) = slot {
            checks.actions.iter().for_each(&mut f);
        }
    }
    for block in &plan.blocks {
        for slot in block.checks_slots() {
            if let Some(checks) = slot {
                checks.actions.iter().for_each(&mut f);
            }
        }
        for seq in &block.sequences {
            seq.actions.iter().for_each(&mut f);
        }
    }
}
