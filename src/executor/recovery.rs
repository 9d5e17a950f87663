//! Post-crash consistency pass: rewrites a persisted tree whose root is
//! still `Running` into a self-consistent state and decides whether (and
//! where) execution resumes.
//!
//! Checks groups are reset and re-run from scratch on resume — `run_once`
//! already clears `Attempts` for exactly this reason, so re-running a
//! Checks group after a crash is always safe. Sequences are different:
//! once a Sequence has completed it must never re-execute, so recovery
//! resolves each Sequence (and each Action within it) to a definite
//! terminal status or `NotStarted` rather than leaving it partially done.

use crate::model::{Action, Block, Checks, FailureReason, Plan, Sequence, Status};
use std::time::Duration;

/// What should happen to a recovered Plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// The Plan never started meaningfully; leave it for a future `Start`.
    None,
    /// The Plan reached a terminal status purely from fixup; nothing to run.
    Terminal,
    /// The Plan should re-enter the top state machine at `PlanBypassChecks`.
    FromTop,
}

fn reset_action(action: &mut Action) {
    action.attempts.clear();
    action.state.set(Status::NotStarted, None, None);
}

fn reset_checks(checks: &mut Checks) {
    checks.state.set(Status::NotStarted, None, None);
    for action in &mut checks.actions {
        reset_action(action);
    }
}

fn reset_seq(seq: &mut Sequence) {
    seq.state.set(Status::NotStarted, None, None);
    for action in &mut seq.actions {
        reset_action(action);
    }
}

/// `fixAction`: discard a dangling final Attempt, then resolve `Running`
/// to the status implied by the last complete Attempt.
pub fn fix_action(action: &mut Action) {
    if action.state.status() != Status::Running {
        return;
    }
    loop {
        match action.attempts.last() {
            None => {
                action.state.set(Status::NotStarted, None, None);
                return;
            }
            Some(a) if a.end.is_none() => {
                action.attempts.pop();
            }
            Some(_) => break,
        }
    }
    let last = action.attempts.last().expect("checked non-empty above");
    let end = last.end.expect("checked Some above");
    if last.err.is_none() {
        action.state.finish(Status::Completed, end);
    } else {
        action.state.finish(Status::Failed, end);
    }
}

/// `fixChecks`: Stopped dominates, then Failed, then "all completed", else
/// a full reset so the group re-runs idempotently.
pub fn fix_checks(checks: &mut Checks, now: Duration) {
    if checks.state.status() != Status::Running {
        return;
    }
    let any_stopped = checks.actions.iter().any(|a| a.state.status() == Status::Stopped);
    if any_stopped {
        for action in &mut checks.actions {
            if action.state.status() == Status::Running {
                action.state.finish(Status::Stopped, now);
            }
        }
        checks.state.finish(Status::Stopped, now);
        return;
    }

    for action in &mut checks.actions {
        fix_action(action);
    }

    let any_failed = checks.actions.iter().any(|a| a.state.status() == Status::Failed);
    let all_completed = checks
        .actions
        .iter()
        .all(|a| a.state.status() == Status::Completed);
    if any_failed {
        checks.state.finish(Status::Failed, now);
    } else if all_completed {
        checks.state.finish(Status::Completed, now);
    } else {
        reset_checks(checks);
    }
}

/// `fixSeq`: same shape as `fixChecks`, over an ordered Sequence of Actions.
pub fn fix_seq(seq: &mut Sequence, now: Duration) {
    if seq.state.status() != Status::Running {
        return;
    }
    let any_stopped = seq.actions.iter().any(|a| a.state.status() == Status::Stopped);
    if any_stopped {
        for action in &mut seq.actions {
            if action.state.status() == Status::Running {
                action.state.finish(Status::Stopped, now);
            }
        }
        seq.state.finish(Status::Stopped, now);
        return;
    }

    for action in &mut seq.actions {
        fix_action(action);
    }

    let any_failed = seq.actions.iter().any(|a| a.state.status() == Status::Failed);
    let all_completed = seq.actions.iter().all(|a| a.state.status() == Status::Completed);
    if any_failed {
        seq.state.finish(Status::Failed, now);
    } else if all_completed {
        seq.state.finish(Status::Completed, now);
    } else {
        reset_seq(seq);
    }
}

/// `fixBlock`: Bypass completed short-circuits to Completed; a Failed
/// Pre/Cont/Post check fails the Block; Stopped dominates over any
/// Sequence; any Failed Sequence fails the Block; a Block with no progress
/// at all resets to `NotStarted`. Otherwise the Block is left `Running` so
/// the Plan Executor re-enters it, skipping Sequences already `Completed`.
pub fn fix_block(block: &mut Block, now: Duration) {
    if block.state.status() != Status::Running {
        return;
    }

    for slot in block.checks_slots_mut() {
        if let Some(checks) = slot {
            fix_checks(checks, now);
        }
    }
    for seq in &mut block.sequences {
        fix_seq(seq, now);
    }

    if let Some(bypass) = &block.bypass_checks {
        if bypass.state.status() == Status::Completed {
            block.state.finish(Status::Completed, now);
            return;
        }
    }
    let gate_failed = [&block.pre_checks, &block.cont_checks, &block.post_checks]
        .into_iter()
        .flatten()
        .any(|c| c.state.status() == Status::Failed);
    if gate_failed {
        block.state.finish(Status::Failed, now);
        return;
    }
    if block.sequences.iter().any(|s| s.state.status() == Status::Stopped) {
        block.state.finish(Status::Stopped, now);
        return;
    }
    if block.sequences.iter().any(|s| s.state.status() == Status::Failed) {
        block.state.finish(Status::Failed, now);
        return;
    }

    let any_progress = block
        .sequences
        .iter()
        .any(|s| s.state.status() != Status::NotStarted)
        || block
            .checks_slots()
            .into_iter()
            .flatten()
            .any(|c| c.state.status() != Status::NotStarted);
    if !any_progress {
        block.state.set(Status::NotStarted, None, None);
    }
}

/// `fixPlan`: the same shape over Blocks, plus the positive completion
/// path (`all Blocks Completed and Post+Deferred Completed`).
pub fn fix_plan(plan: &mut Plan, now: Duration) -> Resume {
    if plan.state.status() != Status::Running {
        return if plan.state.status() == Status::NotStarted {
            Resume::None
        } else {
            Resume::Terminal
        };
    }

    for slot in plan.checks_slots_mut() {
        if let Some(checks) = slot {
            fix_checks(checks, now);
        }
    }
    for block in &mut plan.blocks {
        fix_block(block, now);
    }

    if let Some(bypass) = &plan.bypass_checks {
        if bypass.state.status() == Status::Completed {
            plan.state.finish(Status::Completed, now);
            plan.failure_reason = FailureReason::FRUnknown;
            return Resume::Terminal;
        }
    }

    for (slot, reason) in [
        (&plan.pre_checks, FailureReason::FRPreCheck),
        (&plan.cont_checks, FailureReason::FRContCheck),
        (&plan.post_checks, FailureReason::FRPostCheck),
    ] {
        if let Some(checks) = slot {
            if checks.state.status() == Status::Failed {
                plan.state.finish(Status::Failed, now);
                plan.failure_reason = reason;
                return Resume::Terminal;
            }
        }
    }

    if plan.blocks.iter().any(|b| b.state.status() == Status::Failed) {
        plan.state.finish(Status::Failed, now);
        plan.failure_reason = FailureReason::FRBlock;
        return Resume::Terminal;
    }
    if plan.blocks.iter().any(|b| b.state.status() == Status::Stopped) {
        plan.state.finish(Status::Stopped, now);
        plan.failure_reason = FailureReason::FRStopped;
        return Resume::Terminal;
    }

    let all_blocks_completed = plan.blocks.iter().all(|b| b.state.status() == Status::Completed);
    let post_completed = plan
        .post_checks
        .as_ref()
        .map_or(true, |c| c.state.status() == Status::Completed);
    let deferred_completed = plan
        .deferred_checks
        .as_ref()
        .map_or(true, |c| c.state.status() == Status::Completed);
    if all_blocks_completed && post_completed && deferred_completed {
        plan.state.finish(Status::Completed, now);
        plan.failure_reason = FailureReason::FRUnknown;
        return Resume::Terminal;
    }

    // No terminal condition applies: resume the top state machine. Already
    // `Completed` Blocks are skipped by the Plan Executor's block loop;
    // already `Completed` Sequences are skipped by the Block Executor's
    // fan-out.
    Resume::FromTop
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attempt, Plan};
    use crate::plugin::PluginError;

    #[test]
    fn fix_action_discards_dangling_attempt_and_resumes_from_prior() {
        let mut action = Action::new("p", serde_json::json!({}));
        action.state.start(Duration::from_secs(1));
        action.attempts.push(Attempt::success(
            serde_json::json!({"arg": "ok"}),
            Duration::from_secs(1),
            Duration::from_secs(2),
        ));
        action.attempts.push(Attempt::partial(Duration::from_secs(3)));

        fix_action(&mut action);

        assert_eq!(action.attempts.len(), 1);
        assert_eq!(action.state.status(), Status::Completed);
    }

    #[test]
    fn fix_action_with_only_a_dangling_attempt_resets_to_not_started() {
        let mut action = Action::new("p", serde_json::json!({}));
        action.state.start(Duration::from_secs(1));
        action.attempts.push(Attempt::partial(Duration::from_secs(1)));

        fix_action(&mut action);

        assert!(action.attempts.is_empty());
        assert_eq!(action.state.status(), Status::NotStarted);
    }

    #[test]
    fn fix_action_resolves_failed_last_attempt() {
        let mut action = Action::new("p", serde_json::json!({}));
        action.state.start(Duration::from_secs(1));
        action.attempts.push(Attempt::failure(
            PluginError::new(1, "e"),
            Duration::from_secs(1),
            Duration::from_secs(2),
        ));

        fix_action(&mut action);

        assert_eq!(action.state.status(), Status::Failed);
    }

    fn running_action_with_success(start: u64, end: u64) -> Action {
        let mut action = Action::new("p", serde_json::json!({}));
        action.state.start(Duration::from_secs(start));
        action.attempts.push(Attempt::success(
            serde_json::json!({"arg": "ok"}),
            Duration::from_secs(start),
            Duration::from_secs(end),
        ));
        action
    }

    #[test]
    fn fix_seq_with_all_actions_completed_completes_the_sequence() {
        let mut seq = Sequence::new(vec![
            running_action_with_success(1, 2),
            running_action_with_success(2, 3),
        ]);
        seq.state.start(Duration::from_secs(1));

        fix_seq(&mut seq, Duration::from_secs(10));

        assert_eq!(seq.state.status(), Status::Completed);
    }

    #[test]
    fn fix_seq_resets_a_never_started_sequence() {
        let mut seq = Sequence::new(vec![Action::new("p", serde_json::json!({}))]);
        seq.state.start(Duration::from_secs(1));

        fix_seq(&mut seq, Duration::from_secs(10));

        assert_eq!(seq.state.status(), Status::NotStarted);
        assert_eq!(seq.actions[0].state.status(), Status::NotStarted);
    }

    #[test]
    fn fix_plan_with_one_completed_block_and_one_untouched_block_resumes_from_top() {
        let completed_seq = Sequence::new(vec![running_action_with_success(1, 2)]);
        let mut completed_block = Block::new(vec![completed_seq]);
        completed_block.state.start(Duration::from_secs(1));

        let fresh_block = Block::new(vec![Sequence::new(vec![Action::new(
            "p",
            serde_json::json!({}),
        )])]);

        let mut plan = Plan::new("p", vec![completed_block, fresh_block]);
        plan.state.start(Duration::from_secs(1));

        let resume = fix_plan(&mut plan, Duration::from_secs(10));

        assert_eq!(resume, Resume::FromTop);
        assert_eq!(plan.blocks[0].state.status(), Status::Completed);
        assert_eq!(plan.blocks[1].state.status(), Status::NotStarted);
        assert_eq!(plan.state.status(), Status::Running);
    }

    #[test]
    fn fix_plan_with_all_blocks_completed_completes_the_plan() {
        let seq = Sequence::new(vec![running_action_with_success(1, 2)]);
        let mut block = Block::new(vec![seq]);
        block.state.start(Duration::from_secs(1));

        let mut plan = Plan::new("p", vec![block]);
        plan.state.start(Duration::from_secs(1));

        let resume = fix_plan(&mut plan, Duration::from_secs(10));

        assert_eq!(resume, Resume::Terminal);
        assert_eq!(plan.state.status(), Status::Completed);
        assert_eq!(plan.failure_reason, FailureReason::FRUnknown);
    }

    #[test]
    fn fix_plan_is_idempotent() {
        let seq = Sequence::new(vec![running_action_with_success(1, 2)]);
        let mut block = Block::new(vec![seq]);
        block.state.start(Duration::from_secs(1));
        let mut plan = Plan::new("p", vec![block]);
        plan.state.start(Duration::from_secs(1));

        fix_plan(&mut plan, Duration::from_secs(10));
        let after_first = plan.state.status();
        let resume = fix_plan(&mut plan, Duration::from_secs(20));

        assert_eq!(resume, Resume::Terminal);
        assert_eq!(plan.state.status(), after_first);
    }
}
