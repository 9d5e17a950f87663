//! Plan Executor: the top state machine. Plan-level Bypass/Pre/Cont/Post/
//! Deferred checks wrap the strictly-sequential iteration of Blocks; a
//! final-state classification sub-machine assigns `FailureReason` on exit.

use super::{block, checks, ExecCtx, PlanId};
use crate::error::{report, EngineResult};
use crate::model::{FailureReason, Plan, Status};
use crate::plugin::PluginError;
use tracing::{info, warn};

/// Drive `plan` from its current state (freshly `NotStarted`/`Running`, or
/// a Running Plan handed back by recovery) through to a terminal status,
/// persisting every transition. Mirrors the per-Block lifecycle in
/// [`block::run`] one level up: Bypass is a shortcut, Pre+Cont run together
/// as a gate, Post and Deferred always get a chance to run.
pub async fn run(ctx: &ExecCtx, plan: &mut Plan) -> EngineResult<()> {
    let plan_id = plan.id;

    if plan.state.status() == Status::NotStarted {
        plan.state.start(ctx.clock.now());
        plan.submit_time.get_or_insert_with(|| ctx.clock.now());
        ctx.vault.update_plan(plan).await.map_err(report)?;
    }

    if let Some(bypass) = plan.bypass_checks.as_mut() {
        if bypass.state.status() != Status::Completed {
            let outcome = checks::run_once(ctx, plan_id, bypass).await?;
            if outcome.is_none() {
                return finish(ctx, plan, Status::Completed, FailureReason::FRUnknown, false).await;
            }
        }
    }

    if ctx.cancel.is_cancelled() {
        return finish(ctx, plan, Status::Stopped, FailureReason::FRStopped, true).await;
    }

    let mut cont_handle = None;
    if plan.pre_checks.is_some() || plan.cont_checks.is_some() {
        let pre_res = run_slot_once(ctx, plan_id, plan.pre_checks.as_mut()).await?;
        let cont_res = run_slot_once(ctx, plan_id, plan.cont_checks.as_mut()).await?;
        if pre_res.is_some() || cont_res.is_some() {
            warn!(plan_id = %plan_id, "plan pre/cont checks failed");
            return finish(ctx, plan, Status::Failed, FailureReason::FRPreCheck, true).await;
        }
        if let Some(cont_checks) = plan.cont_checks.clone() {
            cont_handle = Some(checks::spawn_continuous(ctx.clone(), plan_id, cont_checks));
        }
    }

    for b in &mut plan.blocks {
        if b.state.status() == Status::Completed {
            continue;
        }
        if let Some(handle) = cont_handle.as_mut() {
            if let Some(_err) = handle.drain_nonblocking() {
                if let Some(h) = cont_handle.take() {
                    h.stop().await;
                }
                warn!(plan_id = %plan_id, "plan continuous check failed before block dispatch");
                return finish(ctx, plan, Status::Failed, FailureReason::FRContCheck, true).await;
            }
        }
        if ctx.cancel.is_cancelled() {
            break;
        }
        block::run(ctx, plan_id, b).await?;
    }

    if let Some(h) = cont_handle.take() {
        if let Some(_err) = h.stop().await {
            warn!(plan_id = %plan_id, "plan continuous check failed");
            return finish(ctx, plan, Status::Failed, FailureReason::FRContCheck, true).await;
        }
    }

    if ctx.cancel.is_cancelled() {
        return finish(ctx, plan, Status::Stopped, FailureReason::FRStopped, true).await;
    }

    if plan.blocks.iter().any(|b| b.state.status() == Status::Failed) {
        return finish(ctx, plan, Status::Failed, FailureReason::FRBlock, true).await;
    }
    if plan.blocks.iter().any(|b| b.state.status() == Status::Stopped) {
        return finish(ctx, plan, Status::Stopped, FailureReason::FRStopped, true).await;
    }

    if let Some(post) = plan.post_checks.as_mut() {
        let post_res = checks::run_once(ctx, plan_id, post).await?;
        if post_res.is_some() {
            warn!(plan_id = %plan_id, "plan post checks failed");
            return finish(ctx, plan, Status::Failed, FailureReason::FRPostCheck, true).await;
        }
    }

    info!(plan_id = %plan_id, "plan completed");
    finish(ctx, plan, Status::Completed, FailureReason::FRUnknown, true).await
}

async fn run_slot_once(
    ctx: &ExecCtx,
    plan_id: PlanId,
    checks: Option<&mut crate::model::Checks>,
) -> EngineResult<Option<PluginError>> {
    match checks {
        Some(c) => checks::run_once(ctx, plan_id, c).await,
        None => Ok(None),
    }
}

/// Run Deferred checks (best effort), then apply the final-state
/// classification and persist. `End must not blindly overwrite` a status
/// already decided upstream — `status`/`reason` here are exactly that
/// upstream decision, carried through, not recomputed.
async fn finish(
    ctx: &ExecCtx,
    plan: &mut Plan,
    status: Status,
    reason: FailureReason,
    run_deferred: bool,
) -> EngineResult<()> {
    let plan_id = plan.id;
    if run_deferred {
        if let Some(deferred) = plan.deferred_checks.as_mut() {
            let _ = checks::run_once(ctx, plan_id, deferred).await?;
        }
    }
    let final_status = if ctx.cancel.is_cancelled() && status != Status::Stopped {
        Status::Stopped
    } else {
        status
    };
    let final_reason = if final_status == Status::Stopped && status != Status::Stopped {
        FailureReason::FRStopped
    } else {
        reason
    };
    plan.state.finish(final_status, ctx.clock.now());
    plan.failure_reason = final_reason;
    ctx.vault.update_plan(plan).await.map_err(report)?;
    Ok(())
}
