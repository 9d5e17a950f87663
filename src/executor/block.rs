//! Block Executor: Bypass/Pre/Cont/Post/Deferred checks wrapped around a
//! bounded-parallel fan-out of Sequences with failure tolerance.

use super::{checks, sequence, ContCheckHandle, ExecCtx, PlanId};
use crate::error::{report, EngineResult};
use crate::model::{Block, Sequence, Status};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::time::Duration;
use tracing::{info, warn};

/// How the Sequences fan-out for a Block ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencesOutcome {
    Completed,
    ContCheckFailed,
    ToleranceExceeded,
}

/// Run every Sequence in `block`, honouring `Concurrency`,
/// `ToleratedFailures`, and the continuous-check channel.
///
/// Two gates prevent a queued Sequence from dispatching after the failure
/// budget is already exceeded: the bound on how many Sequences may be
/// in flight at once, and a recheck of the failure count immediately
/// before each dispatch.
pub async fn run_sequences(
    ctx: &ExecCtx,
    plan_id: PlanId,
    block: &mut Block,
    mut cont: Option<&mut ContCheckHandle>,
) -> EngineResult<SequencesOutcome> {
    let concurrency = (block.concurrency.max(1)) as usize;
    let tolerated = block.tolerated_failures;
    let mut failures: u32 = 0;
    let mut cont_check_failed = false;
    let mut tolerance_exceeded = false;

    let mut in_flight: FuturesUnordered<_> = FuturesUnordered::new();
    // Sequences already `Completed` are the product of a resumed Plan
    // (recovery resolves finished Sequences before handing the Block back
    // to the Plan Executor) and must not re-execute.
    let mut iter = block
        .sequences
        .iter_mut()
        .filter(|seq| seq.state.status() != Status::Completed);

    loop {
        while in_flight.len() < concurrency && !cont_check_failed && !tolerance_exceeded {
            if let Some(handle) = cont.as_deref_mut() {
                if handle.drain_nonblocking().is_some() {
                    cont_check_failed = true;
                    break;
                }
            }
            if tolerated >= 0 && failures as i64 > tolerated {
                tolerance_exceeded = true;
                break;
            }
            match iter.next() {
                Some(seq) => in_flight.push(run_one(ctx, plan_id, seq)),
                None => break,
            }
        }

        if in_flight.is_empty() {
            break;
        }

        match in_flight.next().await {
            Some(Ok(Status::Failed)) => failures += 1,
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e),
            None => unreachable!("in_flight was non-empty"),
        }
    }

    if !cont_check_failed && tolerated >= 0 && failures as i64 > tolerated {
        tolerance_exceeded = true;
    }

    Ok(if cont_check_failed {
        SequencesOutcome::ContCheckFailed
    } else if tolerance_exceeded {
        SequencesOutcome::ToleranceExceeded
    } else {
        SequencesOutcome::Completed
    })
}

async fn run_one(ctx: &ExecCtx, plan_id: PlanId, seq: &mut Sequence) -> EngineResult<Status> {
    sequence::run(ctx, plan_id, seq).await?;
    Ok(seq.state.status())
}

/// Sleep for `delay`, returning early (without error) if `ctx` is
/// cancelled first. Returns whether the sleep ran to completion.
async fn interruptible_sleep(ctx: &ExecCtx, delay: Duration) -> bool {
    if delay.is_zero() {
        return !ctx.cancel.is_cancelled();
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = ctx.cancel.cancelled() => false,
    }
}

/// Run a Block's full lifecycle: entrance delay, Bypass, Pre+Cont first
/// pass, the Sequences fan-out with a live ContChecks loop, Post, Deferred,
/// exit delay. `block.state` reflects the final outcome on return.
pub async fn run(ctx: &ExecCtx, plan_id: PlanId, block: &mut Block) -> EngineResult<()> {
    if block.state.status() == Status::NotStarted {
        block.state.start(ctx.clock.now());
        ctx.vault.update_block(plan_id, block).await.map_err(report)?;
    }

    if !interruptible_sleep(ctx, block.entrance_delay).await {
        return finish(ctx, plan_id, block, Status::Stopped, true).await;
    }

    if let Some(bypass) = block.bypass_checks.as_mut() {
        let outcome = checks::run_once(ctx, plan_id, bypass).await?;
        if outcome.is_none() {
            // Bypass succeeded: this is a shortcut, not a gate. Deferred
            // checks attached to a bypassed object do not run.
            return finish(ctx, plan_id, block, Status::Completed, false).await;
        }
    }

    if ctx.cancel.is_cancelled() {
        return finish(ctx, plan_id, block, Status::Stopped, true).await;
    }

    let mut cont_handle = None;
    if block.pre_checks.is_some() || block.cont_checks.is_some() {
        let pre_res = run_slot_once(ctx, plan_id, block.pre_checks.as_mut()).await?;
        let cont_res = run_slot_once(ctx, plan_id, block.cont_checks.as_mut()).await?;
        if pre_res.is_some() || cont_res.is_some() {
            warn!(block_id = %block.id, "block pre/cont checks failed");
            return finish(ctx, plan_id, block, Status::Failed, true).await;
        }
        if let Some(cont_checks) = block.cont_checks.clone() {
            cont_handle = Some(checks::spawn_continuous(ctx.clone(), plan_id, cont_checks));
        }
    }

    if ctx.cancel.is_cancelled() {
        if let Some(h) = cont_handle.take() {
            h.stop().await;
        }
        return finish(ctx, plan_id, block, Status::Stopped, true).await;
    }

    let seq_outcome = run_sequences(ctx, plan_id, block, cont_handle.as_mut()).await;
    if let Some(h) = cont_handle.take() {
        h.stop().await;
    }

    match seq_outcome? {
        SequencesOutcome::Completed => {}
        SequencesOutcome::ContCheckFailed => {
            warn!(block_id = %block.id, "block continuous check failed");
            return finish(ctx, plan_id, block, Status::Failed, true).await;
        }
        SequencesOutcome::ToleranceExceeded => {
            warn!(block_id = %block.id, "block exceeded tolerated failures");
            return finish(ctx, plan_id, block, Status::Failed, true).await;
        }
    }

    if ctx.cancel.is_cancelled() {
        return finish(ctx, plan_id, block, Status::Stopped, true).await;
    }

    if let Some(post) = block.post_checks.as_mut() {
        let post_res = checks::run_once(ctx, plan_id, post).await?;
        if post_res.is_some() {
            warn!(block_id = %block.id, "block post checks failed");
            return finish(ctx, plan_id, block, Status::Failed, true).await;
        }
    }

    info!(block_id = %block.id, "block completed");
    finish(ctx, plan_id, block, Status::Completed, true).await
}

async fn run_slot_once(
    ctx: &ExecCtx,
    plan_id: PlanId,
    checks: Option<&mut crate::model::Checks>,
) -> EngineResult<Option<crate::plugin::PluginError>> {
    match checks {
        Some(c) => checks::run_once(ctx, plan_id, c).await,
        None => Ok(None),
    }
}

/// Run Deferred checks (best effort, cleanup semantics — their own
/// outcome never changes `status`), apply the exit delay, then persist the
/// Block's final state.
async fn finish(
    ctx: &ExecCtx,
    plan_id: PlanId,
    block: &mut Block,
    status: Status,
    run_deferred: bool,
) -> EngineResult<()> {
    if run_deferred {
        if let Some(deferred) = block.deferred_checks.as_mut() {
            let _ = checks::run_once(ctx, plan_id, deferred).await?;
        }
    }
    interruptible_sleep(ctx, block.exit_delay).await;
    let final_status = if ctx.cancel.is_cancelled() && status != Status::Stopped {
        Status::Stopped
    } else {
        status
    };
    block.state.finish(final_status, ctx.clock.now());
    ctx.vault.update_block(plan_id, block).await.map_err(report)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Plan};
    use crate::plugin::test_support::ScriptedPlugin;
    use crate::plugin::{Policy, Registry};
    use crate::time::FixedClock;
    use crate::vault::test_support::MemoryVault;
    use crate::vault::Vault;
    use std::sync::Arc;

    async fn ctx_with(registry: Registry) -> (ExecCtx, crate::ids::Id) {
        let vault = Arc::new(MemoryVault::default());
        let plan = Plan::new("p", vec![]);
        let plan_id = plan.id;
        vault.create(&plan).await.unwrap();
        let ctx = ExecCtx::new(vault, Arc::new(registry), Arc::new(FixedClock(Duration::ZERO)));
        (ctx, plan_id)
    }

    fn ok_seq() -> Sequence {
        Sequence::new(vec![Action::new("ok", serde_json::json!({}))])
    }

    fn fail_seq() -> Sequence {
        Sequence::new(vec![Action::new("bad", serde_json::json!({}))])
    }

    #[tokio::test]
    async fn tolerated_failures_within_budget_completes() {
        let mut registry = Registry::new();
        registry
            .register(ScriptedPlugin::new("ok", vec![Ok(serde_json::json!({"arg": "ok"}))]))
            .unwrap();
        registry
            .register(
                ScriptedPlugin::new("bad", vec![Err(crate::plugin::PluginError::permanent(1, "x"))])
                    .with_policy(Policy::fixed(Duration::ZERO)),
            )
            .unwrap();
        let (ctx, plan_id) = ctx_with(registry).await;

        let mut block = Block::new(vec![fail_seq(), fail_seq(), ok_seq()])
            .with_concurrency(3)
            .with_tolerated_failures(2);
        run(&ctx, plan_id, &mut block).await.unwrap();
        assert_eq!(block.state.status(), Status::Completed);
    }

    #[tokio::test]
    async fn exceeding_tolerance_fails_the_block() {
        let mut registry = Registry::new();
        registry
            .register(ScriptedPlugin::new("ok", vec![Ok(serde_json::json!({"arg": "ok"}))]))
            .unwrap();
        registry
            .register(
                ScriptedPlugin::new("bad", vec![Err(crate::plugin::PluginError::permanent(1, "x"))])
                    .with_policy(Policy::fixed(Duration::ZERO)),
            )
            .unwrap();
        let (ctx, plan_id) = ctx_with(registry).await;

        let mut block = Block::new(vec![fail_seq(), fail_seq(), ok_seq()])
            .with_concurrency(3)
            .with_tolerated_failures(1);
        run(&ctx, plan_id, &mut block).await.unwrap();
        assert_eq!(block.state.status(), Status::Failed);
    }

    #[tokio::test]
    async fn concurrency_cap_still_runs_every_sequence_to_completion() {
        let mut registry = Registry::new();
        registry
            .register(
                ScriptedPlugin::new("slow", vec![Ok(serde_json::json!({"arg": "ok"}))])
                    .with_delay(Duration::from_millis(5)),
            )
            .unwrap();
        let (ctx, plan_id) = ctx_with(registry).await;

        let seqs: Vec<_> = (0..5)
            .map(|_| Sequence::new(vec![Action::new("slow", serde_json::json!({}))]))
            .collect();
        let mut block = Block::new(seqs).with_concurrency(2).with_tolerated_failures(-1);

        run(&ctx, plan_id, &mut block).await.unwrap();
        assert_eq!(block.state.status(), Status::Completed);
        for seq in &block.sequences {
            assert_eq!(seq.state.status(), Status::Completed);
        }
    }
}
