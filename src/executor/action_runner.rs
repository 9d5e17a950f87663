//! Action Runner: `Start -> GetPlugin -> Execute -> End`.

use super::{ExecCtx, PlanId};
use crate::error::{report, EngineResult};
use crate::model::{Attempt, Action, Status};
use crate::plugin::PluginError;
use tracing::{debug, warn};

/// Run `action` to completion: locate its plugin, attempt it up to
/// `Retries + 1` times under the plugin's retry policy, and persist every
/// state change. Never returns `Err` for a plugin failure — only a genuine
/// engine-level fault (a Vault write that could not be completed) escapes
/// as an `Err`; the Action's own outcome is always readable from
/// `action.state` once this returns `Ok`.
pub async fn run(ctx: &ExecCtx, plan_id: PlanId, action: &mut Action) -> EngineResult<()> {
    action.state.start(ctx.clock.now());
    ctx.vault.update_action(plan_id, action).await.map_err(report)?;

    let plugin = match ctx.registry.require(&action.plugin) {
        Ok(p) => p,
        Err(err) => {
            let now = ctx.clock.now();
            action.attempts.push(Attempt::failure(err, now, now));
            action.state.finish(Status::Failed, now);
            ctx.vault.update_action(plan_id, action).await.map_err(report)?;
            return Ok(());
        }
    };

    let max_action_attempts = action.retries + 1;
    let policy = plugin.retry_policy();
    let mut attempts_made = 0u32;

    loop {
        if ctx.cancel.is_cancelled() {
            let now = ctx.clock.now();
            action.state.finish(Status::Stopped, now);
            ctx.vault.update_action(plan_id, action).await.map_err(report)?;
            return Ok(());
        }

        let start = ctx.clock.now();
        let outcome = match tokio::time::timeout(
            action.timeout,
            plugin.execute(ctx.cancel.clone(), action.req.clone()),
        )
        .await
        {
            Ok(Ok(resp)) if plugin.validate_resp(&resp) => Ok(resp),
            Ok(Ok(_bad_shape)) => Err(PluginError::type_mismatch(&action.plugin)),
            Ok(Err(plugin_err)) => Err(plugin_err),
            Err(_elapsed) => Err(PluginError::timeout()),
        };
        let end = ctx.clock.now();
        attempts_made += 1;

        match outcome {
            Ok(resp) => {
                action.attempts.push(Attempt::success(resp, start, end));
                action.state.finish(Status::Completed, end);
                ctx.vault.update_action(plan_id, action).await.map_err(report)?;
                debug!(action_id = %action.id, plugin = %action.plugin, "action completed");
                return Ok(());
            }
            Err(err) => {
                let permanent = err.permanent;
                action.attempts.push(Attempt::failure(err, start, end));
                ctx.vault.update_action(plan_id, action).await.map_err(report)?;

                let exhausted = attempts_made >= max_action_attempts;
                let policy_exhausted = !policy.allows_attempt(attempts_made);
                if permanent || exhausted || policy_exhausted {
                    action.state.finish(Status::Failed, end);
                    ctx.vault.update_action(plan_id, action).await.map_err(report)?;
                    warn!(
                        action_id = %action.id,
                        plugin = %action.plugin,
                        attempts = attempts_made,
                        "action failed"
                    );
                    return Ok(());
                }

                let delay = policy.delay_for(attempts_made - 1);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
