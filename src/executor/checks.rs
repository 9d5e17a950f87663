//! Checks Runner: one-shot parallel execution of a Checks group's Actions,
//! plus the background continuous-check loop.

use super::{action_runner, ContCheckHandle, ExecCtx, PlanId};
use crate::error::{report, EngineResult};
use crate::model::{Checks, Status};
use crate::plugin::PluginError;
use tokio::sync::mpsc;

/// Run every Action in `checks` once, in parallel, and report the group's
/// outcome.
///
/// Resets each Action's in-memory Attempts and state to `NotStarted` first,
/// so a group that is re-run after recovery behaves identically to a fresh
/// run. Returns `Ok(None)` if every Action completed, `Ok(Some(err))` with
/// the first failing Action's error otherwise. Any `Err` is an engine-level
/// fault (typically a Vault write failure).
pub async fn run_once(ctx: &ExecCtx, plan_id: PlanId, checks: &mut Checks) -> EngineResult<Option<PluginError>> {
    for action in &mut checks.actions {
        action.attempts.clear();
        action.state.set(Status::NotStarted, None, None);
    }

    checks.state.start(ctx.clock.now());
    ctx.vault.update_checks(plan_id, checks).await.map_err(report)?;

    let results = futures::future::join_all(
        checks
            .actions
            .iter_mut()
            .map(|action| action_runner::run(ctx, plan_id, action)),
    )
    .await;
    for result in results {
        result?;
    }

    let first_err = checks.actions.iter().find_map(|action| {
        if action.state.status() == Status::Failed {
            action.attempts.last().and_then(|a| a.err.clone())
        } else {
            None
        }
    });

    let terminal = if first_err.is_some() {
        Status::Failed
    } else {
        Status::Completed
    };
    checks.state.finish(terminal, ctx.clock.now());
    ctx.vault.update_checks(plan_id, checks).await.map_err(report)?;

    Ok(first_err)
}

/// Spawn the continuous-check background loop: sleep `checks.delay` (floor
/// 1ns), run the group once, report the tick's outcome on the result
/// channel, repeat. Terminates when cancelled or on first failure.
pub fn spawn_continuous(ctx: ExecCtx, plan_id: PlanId, mut checks: Checks) -> ContCheckHandle {
    let child = ctx.child_cancel();
    let cancel = child.cancel.clone();
    let (tx, rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        let delay = checks.delay.max(std::time::Duration::from_nanos(1));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if cancel.is_cancelled() {
                break;
            }

            match run_once(&child, plan_id, &mut checks).await {
                Ok(None) => {
                    if tx.send(None).await.is_err() {
                        break;
                    }
                }
                Ok(Some(err)) => {
                    let _ = tx.send(Some(err)).await;
                    break;
                }
                Err(_) => {
                    let _ = tx
                        .send(Some(PluginError::permanent(9, "continuous check storage error")))
                        .await;
                    break;
                }
            }
        }
    });

    ContCheckHandle::new(cancel, rx, task)
}
