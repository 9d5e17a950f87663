//! End-to-end scenarios: submit a Plan through [`Workstream`] and drive it
//! to completion, exercising recovery, retries, tolerance, and continuous
//! checks the way a caller actually would.

mod support;

use planforge::config::EngineConfig;
use planforge::ids::SequentialIdGenerator;
use planforge::model::{Attempt, Block, Checks, FailureReason, Plan, Sequence, Status};
use planforge::plugin::{PluginError, Policy, Registry};
use planforge::time::FixedClock;
use planforge::vault::Vault;
use planforge::workstream::Workstream;
use std::sync::Arc;
use std::time::Duration;
use support::{action, seq, MemoryVault, ScriptedPlugin};
use tokio_util::sync::CancellationToken;

async fn workstream(registry: Registry) -> Workstream {
    Workstream::with_clock_and_ids(
        Arc::new(MemoryVault::default()),
        Arc::new(registry),
        EngineConfig::default(),
        Arc::new(FixedClock(Duration::from_secs(1))),
        Arc::new(SequentialIdGenerator::default()),
    )
    .await
    .unwrap()
}

async fn submit_and_run(ws: &Workstream, plan: Plan) -> Plan {
    let id = ws.submit(plan).await.unwrap();
    ws.start(id).await.unwrap();
    ws.wait(id, CancellationToken::new()).await.unwrap()
}

/// Every gate succeeds on the first try: Plan completes, `FailureReason`
/// stays `FRUnknown`.
#[tokio::test]
async fn happy_path_completes() {
    let mut registry = Registry::new();
    registry.register(ScriptedPlugin::ok("step")).unwrap();
    let ws = workstream(registry).await;

    let plan = Plan::new("happy-path", vec![Block::new(vec![seq("step"), seq("step")])]);
    let plan = submit_and_run(&ws, plan).await;

    assert_eq!(plan.state.status(), Status::Completed);
    assert_eq!(plan.failure_reason, FailureReason::FRUnknown);
    for block in &plan.blocks {
        assert_eq!(block.state.status(), Status::Completed);
    }
}

/// An Action fails once, transiently, then succeeds on retry — the
/// Sequence, Block, and Plan all still complete.
#[tokio::test]
async fn retry_recovers_to_success() {
    let mut registry = Registry::new();
    registry
        .register(
            ScriptedPlugin::new("flaky", vec![Err(PluginError::new(1, "transient")), Ok(serde_json::json!({"ok": true}))])
                .with_policy(Policy::fixed(Duration::ZERO)),
        )
        .unwrap();
    let ws = workstream(registry).await;

    let plan = Plan::new(
        "retry-to-success",
        vec![Block::new(vec![Sequence::new(vec![action("flaky").with_retries(1)])])],
    );
    let plan = submit_and_run(&ws, plan).await;

    assert_eq!(plan.state.status(), Status::Completed);
    let action = &plan.blocks[0].sequences[0].actions[0];
    assert_eq!(action.state.status(), Status::Completed);
    assert_eq!(action.attempts.len(), 2);
}

/// An Action exhausts its retries against a permanently-failing plugin:
/// the Sequence, Block and Plan all end `Failed`, with `FRBlock`.
#[tokio::test]
async fn permanent_failure_fails_the_plan() {
    let mut registry = Registry::new();
    registry
        .register(ScriptedPlugin::new("boom", vec![Err(PluginError::new(1, "always transient"))]).with_policy(Policy::fixed(Duration::ZERO)))
        .unwrap();
    let ws = workstream(registry).await;

    let plan = Plan::new(
        "permanent-failure",
        vec![Block::new(vec![Sequence::new(vec![action("boom").with_retries(2)])]).with_tolerated_failures(0)],
    );
    let plan = submit_and_run(&ws, plan).await;

    assert_eq!(plan.state.status(), Status::Failed);
    assert_eq!(plan.failure_reason, FailureReason::FRBlock);
    assert_eq!(plan.blocks[0].state.status(), Status::Failed);
    assert_eq!(
        plan.blocks[0].sequences[0].actions[0].attempts.len(),
        3,
        "retries+1 attempts must be exhausted before giving up"
    );
}

/// Two of three Sequences fail but the Block tolerates up to two failures:
/// the Block and Plan both still complete.
#[tokio::test]
async fn tolerated_failures_still_complete() {
    let mut registry = Registry::new();
    registry.register(ScriptedPlugin::ok("ok")).unwrap();
    registry
        .register(ScriptedPlugin::failing("bad").with_policy(Policy::fixed(Duration::ZERO)))
        .unwrap();
    let ws = workstream(registry).await;

    let plan = Plan::new(
        "tolerated-failures",
        vec![Block::new(vec![seq("bad"), seq("bad"), seq("ok")])
            .with_concurrency(3)
            .with_tolerated_failures(2)],
    );
    let plan = submit_and_run(&ws, plan).await;

    assert_eq!(plan.state.status(), Status::Completed);
    assert_eq!(plan.blocks[0].sequences[0].state.status(), Status::Failed);
    assert_eq!(plan.blocks[0].sequences[1].state.status(), Status::Failed);
    assert_eq!(plan.blocks[0].sequences[2].state.status(), Status::Completed);
}

/// A Block's continuous check passes its initial gate run but fails a
/// later tick while Sequences are still in flight: the Sequences fan-out
/// aborts, the Block ends `Failed`, and the Plan's classification blames
/// the Block (`FRBlock`), not the check directly — the continuous check
/// lives one level below the Plan.
#[tokio::test]
async fn continuous_check_failure_aborts_the_block() {
    let mut registry = Registry::new();
    registry
        .register(
            ScriptedPlugin::new(
                "watchdog",
                vec![Ok(serde_json::json!({"ok": true})), Err(PluginError::new(2, "degraded"))],
            )
            .check()
            .with_policy(Policy::fixed(Duration::ZERO)),
        )
        .unwrap();
    registry
        .register(ScriptedPlugin::ok("slow").with_delay(Duration::from_millis(40)))
        .unwrap();
    let ws = workstream(registry).await;

    let mut block = Block::new((0..4).map(|_| seq("slow")).collect())
        .with_concurrency(4)
        .with_tolerated_failures(-1);
    block.cont_checks = Some(Checks::new(vec![action("watchdog")]).with_delay(Duration::from_millis(5)));
    let plan = Plan::new("cont-check-abort", vec![block]);
    let plan = submit_and_run(&ws, plan).await;

    assert_eq!(plan.state.status(), Status::Failed);
    assert_eq!(plan.failure_reason, FailureReason::FRBlock);
    assert_eq!(plan.blocks[0].state.status(), Status::Failed);
}

/// Simulates a process crash mid-Plan: one Block already `Completed`, a
/// second Block `Running` with one Sequence `Completed` and another
/// Sequence's sole Action left with a dangling (unterminated) Attempt.
/// Recovery must discard the dangling attempt, reset that Action and
/// Sequence to `NotStarted`, and resume the Plan from the top — skipping
/// the already-Completed Block and Sequence — to a clean `Completed`.
#[tokio::test]
async fn recovery_resumes_a_crashed_plan_to_completion() {
    let mut registry = Registry::new();
    registry.register(ScriptedPlugin::ok("step")).unwrap();
    let vault = Arc::new(MemoryVault::default());
    let ids = SequentialIdGenerator::default();

    let mut plan = Plan::new(
        "recovers-after-crash",
        vec![
            Block::new(vec![seq("step")]),
            Block::new(vec![seq("step"), seq("step")]),
        ],
    );
    planforge::model::tree::assign_ids(&mut plan, &ids);
    plan.submit_time = Some(Duration::from_secs(1));
    plan.state.start(Duration::from_secs(1));

    plan.blocks[0].state.set(Status::Completed, Some(Duration::from_secs(1)), Some(Duration::from_secs(2)));
    plan.blocks[0].sequences[0].state.set(Status::Completed, Some(Duration::from_secs(1)), Some(Duration::from_secs(2)));
    plan.blocks[0].sequences[0].actions[0].state.set(Status::Completed, Some(Duration::from_secs(1)), Some(Duration::from_secs(2)));
    plan.blocks[0].sequences[0].actions[0]
        .attempts
        .push(Attempt::success(serde_json::json!({"ok": true}), Duration::from_secs(1), Duration::from_secs(2)));

    plan.blocks[1].state.start(Duration::from_secs(2));
    plan.blocks[1].sequences[0].state.set(Status::Completed, Some(Duration::from_secs(2)), Some(Duration::from_secs(3)));
    plan.blocks[1].sequences[0].actions[0].state.set(Status::Completed, Some(Duration::from_secs(2)), Some(Duration::from_secs(3)));
    plan.blocks[1].sequences[0].actions[0]
        .attempts
        .push(Attempt::success(serde_json::json!({"ok": true}), Duration::from_secs(2), Duration::from_secs(3)));

    plan.blocks[1].sequences[1].state.start(Duration::from_secs(3));
    plan.blocks[1].sequences[1].actions[0].state.start(Duration::from_secs(3));
    plan.blocks[1].sequences[1].actions[0].attempts.push(Attempt::partial(Duration::from_secs(3)));

    let plan_id = plan.id;
    vault.create(&plan).await.unwrap();

    let ws = Workstream::with_clock_and_ids(
        vault.clone(),
        Arc::new(registry),
        EngineConfig::default(),
        Arc::new(FixedClock(Duration::from_secs(4))),
        Arc::new(SequentialIdGenerator::default()),
    )
    .await
    .unwrap();

    let recovered = ws.wait(plan_id, CancellationToken::new()).await.unwrap();
    assert_eq!(recovered.state.status(), Status::Completed);
    assert_eq!(recovered.failure_reason, FailureReason::FRUnknown);
    assert_eq!(recovered.blocks[1].sequences[1].state.status(), Status::Completed);
    assert_eq!(recovered.blocks[1].sequences[1].actions[0].attempts.len(), 1);
}

/// `Delete` refuses a Running Plan and succeeds once it has terminated.
#[tokio::test]
async fn delete_refuses_running_plan() {
    let mut registry = Registry::new();
    registry.register(ScriptedPlugin::ok("step")).unwrap();
    let ws = workstream(registry).await;

    let plan = Plan::new("deletable", vec![Block::new(vec![seq("step")])]);
    let id = ws.submit(plan).await.unwrap();
    ws.start(id).await.unwrap();
    let _ = ws.wait(id, CancellationToken::new()).await.unwrap();

    ws.delete(id).await.unwrap();
    assert!(ws.wait(id, CancellationToken::new()).await.is_err());
}
