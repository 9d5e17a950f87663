//! Sequence Executor: runs its Actions strictly in order, stopping at the
//! first failure.

use super::{action_runner, ExecCtx, PlanId};
use crate::error::{report, EngineResult};
use crate::model::{Sequence, Status};

/// Run every Action in `seq` in order. Stops at the first Action that ends
/// `Failed` or `Stopped` and adopts that status; otherwise marks the
/// Sequence `Completed`. Persists `Running` at start and the final status
/// at end — per-Action persistence is the Action Runner's own job.
pub async fn run(ctx: &ExecCtx, plan_id: PlanId, seq: &mut Sequence) -> EngineResult<()> {
    seq.state.start(ctx.clock.now());
    ctx.vault.update_sequence(plan_id, seq).await.map_err(report)?;

    for action in &mut seq.actions {
        action_runner::run(ctx, plan_id, action).await?;
        match action.state.status() {
            Status::Completed => continue,
            Status::Failed | Status::Stopped => {
                let final_status = action.state.status();
                seq.state.finish(final_status, ctx.clock.now());
                ctx.vault.update_sequence(plan_id, seq).await.map_err(report)?;
                return Ok(());
            }
            other => unreachable!("action runner must return a terminal status, got {other:?}"),
        }
    }

    seq.state.finish(Status::Completed, ctx.clock.now());
    ctx.vault.update_sequence(plan_id, seq).await.map_err(report)?;
    Ok(())
}
