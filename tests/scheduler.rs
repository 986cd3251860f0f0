/// Schedule dispatcher integration tests
///
/// Exercises the lock protocol (exclusivity, expiry recovery), the
/// dispatch cycle outcomes (success, failure, not-found, not-published),
/// and next-fire-time bookkeeping against a real SQLite database.

use cogniway::llm::{ChatMessage, EchoClient, ModelClient, ToolInvoker};
use cogniway::runtime::scheduler::{ScheduleStore, LOCK_TIMEOUT_MS};
use cogniway::runtime::{ExecutionEngine, NodeExecutor, ScheduleDispatcher};
use cogniway::workflow::storage::WorkflowStorage;
use cogniway::workflow::types::{
    Edge, EdgeUiConfig, ModelRef, NodeConfig, OutputMapping, ScheduleTrigger, SourceKey,
    ToolDescriptor, Workflow, WorkflowNode,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    // holds the database directory alive for the test's duration
    _dir: TempDir,
    pool: SqlitePool,
    storage: WorkflowStorage,
    schedules: ScheduleStore,
}

async fn setup() -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await.expect("pool");

    let storage = WorkflowStorage::new(pool.clone());
    storage.init_schema().await.expect("workflow schema");
    let schedules = ScheduleStore::new(pool.clone());
    schedules.init_schema().await.expect("schedule schema");

    Harness {
        _dir: dir,
        pool,
        storage,
        schedules,
    }
}

fn dispatcher_with(
    harness: &Harness,
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolInvoker>,
) -> ScheduleDispatcher {
    let engine = Arc::new(ExecutionEngine::new(Arc::new(NodeExecutor::new(model, tools))));
    ScheduleDispatcher::new(harness.schedules.clone(), harness.storage.clone(), engine)
}

fn echo_dispatcher(harness: &Harness) -> ScheduleDispatcher {
    let client = Arc::new(EchoClient::new());
    dispatcher_with(harness, client.clone(), client)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn trigger(cron: &str) -> ScheduleTrigger {
    ScheduleTrigger {
        cron: cron.to_string(),
        timezone: "UTC".to_string(),
        payload: Some(json!({"topic": "daily"})),
    }
}

fn simple_workflow(id: &str, published: bool) -> Workflow {
    Workflow {
        id: id.to_string(),
        name: format!("workflow {id}"),
        description: String::new(),
        owner_id: "owner-1".to_string(),
        published,
        version: 1,
        nodes: vec![
            WorkflowNode {
                id: "start".into(),
                name: "start".into(),
                description: String::new(),
                output_schema: None,
                ui_config: None,
                config: NodeConfig::Input { schedule: Some(trigger("0 * * * *")) },
            },
            WorkflowNode {
                id: "out".into(),
                name: "out".into(),
                description: String::new(),
                output_schema: None,
                ui_config: None,
                config: NodeConfig::Output {
                    output_data: vec![OutputMapping {
                        key: "echo".into(),
                        source: SourceKey::root("start"),
                    }],
                },
            },
        ],
        edges: vec![Edge {
            id: "e1".into(),
            source: "start".into(),
            target: "out".into(),
            ui_config: EdgeUiConfig::default(),
        }],
    }
}

/// Create a published workflow plus a schedule row already due
async fn seed_due_schedule(harness: &Harness, workflow_id: &str, published: bool) -> String {
    let workflow = simple_workflow(workflow_id, published);
    harness.storage.save_workflow(&workflow).await.expect("save workflow");

    let schedule = harness
        .schedules
        .upsert_for_publish(workflow_id, "start", &trigger("0 * * * *"))
        .await
        .expect("upsert schedule");

    // force the fire time into the past so the row is due immediately
    sqlx::query("UPDATE workflow_schedules SET next_run_at = ? WHERE id = ?")
        .bind(now_ms() - 60_000)
        .bind(&schedule.id)
        .execute(&harness.pool)
        .await
        .expect("backdate schedule");

    schedule.id
}

#[tokio::test]
async fn publish_creates_an_enabled_schedule_with_next_run() {
    let harness = setup().await;
    let schedule = harness
        .schedules
        .upsert_for_publish("wf-1", "start", &trigger("0 * * * *"))
        .await
        .unwrap();

    assert!(schedule.enabled);
    let next = schedule.next_run_at.expect("hourly cron computes a fire time");
    assert!(next > now_ms());
    assert!(schedule.locked_at.is_none());

    // retiring disables rather than deletes
    harness.schedules.disable_for_workflow("wf-1").await.unwrap();
    let retired = harness.schedules.get(&schedule.id).await.unwrap().unwrap();
    assert!(!retired.enabled);
    assert!(harness
        .schedules
        .due_schedules(next + 1, 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unparseable_cron_leaves_schedule_paused() {
    let harness = setup().await;
    let schedule = harness
        .schedules
        .upsert_for_publish("wf-1", "start", &trigger("not a cron"))
        .await
        .unwrap();
    assert_eq!(schedule.next_run_at, None);
    assert!(harness
        .schedules
        .due_schedules(now_ms() + 1_000_000, 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn concurrent_lock_attempts_yield_exactly_one_winner() {
    let harness = setup().await;
    let schedule_id = seed_due_schedule(&harness, "wf-1", true).await;

    let now = now_ms();
    let (a, b) = tokio::join!(
        harness.schedules.try_lock(&schedule_id, "worker-a", now),
        harness.schedules.try_lock(&schedule_id, "worker-b", now),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(
        a.is_some() ^ b.is_some(),
        "exactly one worker must win the lock (a: {}, b: {})",
        a.is_some(),
        b.is_some()
    );
}

#[tokio::test]
async fn expired_lock_is_stealable_by_another_worker() {
    let harness = setup().await;
    let schedule_id = seed_due_schedule(&harness, "wf-1", true).await;

    // a crashed worker left a lock older than the timeout
    sqlx::query("UPDATE workflow_schedules SET locked_at = ?, locked_by = ? WHERE id = ?")
        .bind(now_ms() - LOCK_TIMEOUT_MS - 1_000)
        .bind("worker-dead")
        .bind(&schedule_id)
        .execute(&harness.pool)
        .await
        .unwrap();

    let stolen = harness
        .schedules
        .try_lock(&schedule_id, "worker-b", now_ms())
        .await
        .unwrap();
    assert!(stolen.is_some());
    assert_eq!(stolen.unwrap().locked_by.as_deref(), Some("worker-b"));
}

#[tokio::test]
async fn live_lock_blocks_other_workers() {
    let harness = setup().await;
    let schedule_id = seed_due_schedule(&harness, "wf-1", true).await;

    sqlx::query("UPDATE workflow_schedules SET locked_at = ?, locked_by = ? WHERE id = ?")
        .bind(now_ms() - 1_000)
        .bind("worker-a")
        .bind(&schedule_id)
        .execute(&harness.pool)
        .await
        .unwrap();

    let result = harness
        .schedules
        .try_lock(&schedule_id, "worker-b", now_ms())
        .await
        .unwrap();
    assert!(result.is_none());

    // the holder itself may re-acquire
    let reentry = harness
        .schedules
        .try_lock(&schedule_id, "worker-a", now_ms())
        .await
        .unwrap();
    assert!(reentry.is_some());
}

#[tokio::test]
async fn dispatch_runs_due_schedule_and_advances_fire_time() {
    let harness = setup().await;
    let schedule_id = seed_due_schedule(&harness, "wf-1", true).await;
    let dispatcher = echo_dispatcher(&harness);

    let report = dispatcher.dispatch_due_schedules(10, false).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.locked, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert!(report.errors.is_empty());

    let schedule = harness.schedules.get(&schedule_id).await.unwrap().unwrap();
    assert!(schedule.last_run_at.is_some());
    assert_eq!(schedule.last_error, None);
    assert!(schedule.locked_at.is_none() && schedule.locked_by.is_none());
    assert!(schedule.next_run_at.unwrap() > now_ms());

    // nothing is due anymore; the next cycle is a no-op
    let report = dispatcher.dispatch_due_schedules(10, false).await.unwrap();
    assert_eq!(report.scanned, 0);
}

#[tokio::test]
async fn dry_run_locks_and_releases_without_executing() {
    let harness = setup().await;
    let schedule_id = seed_due_schedule(&harness, "wf-1", true).await;
    let dispatcher = echo_dispatcher(&harness);

    let report = dispatcher.dispatch_due_schedules(10, true).await.unwrap();
    assert_eq!(report.locked, 1);
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 0);

    let schedule = harness.schedules.get(&schedule_id).await.unwrap().unwrap();
    assert!(schedule.last_run_at.is_none());
    assert!(schedule.locked_at.is_none() && schedule.locked_by.is_none());
    // the fire time is untouched, so the schedule is still due
    assert!(schedule.next_run_at.unwrap() < now_ms());
}

#[tokio::test]
async fn dispatch_skips_schedules_locked_by_other_workers() {
    let harness = setup().await;
    let schedule_id = seed_due_schedule(&harness, "wf-1", true).await;

    sqlx::query("UPDATE workflow_schedules SET locked_at = ?, locked_by = ? WHERE id = ?")
        .bind(now_ms())
        .bind("worker-other")
        .bind(&schedule_id)
        .execute(&harness.pool)
        .await
        .unwrap();

    let report = echo_dispatcher(&harness)
        .dispatch_due_schedules(10, false)
        .await
        .unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.locked, 0);
}

#[tokio::test]
async fn missing_workflow_fails_without_touching_next_run() {
    let harness = setup().await;
    // schedule row exists, workflow row does not
    let schedule = harness
        .schedules
        .upsert_for_publish("wf-ghost", "start", &trigger("0 * * * *"))
        .await
        .unwrap();
    let due_at = now_ms() - 60_000;
    sqlx::query("UPDATE workflow_schedules SET next_run_at = ? WHERE id = ?")
        .bind(due_at)
        .bind(&schedule.id)
        .execute(&harness.pool)
        .await
        .unwrap();

    let report = echo_dispatcher(&harness)
        .dispatch_due_schedules(10, false)
        .await
        .unwrap();
    assert_eq!(report.failed, 1);
    assert!(report.errors[0].message.contains("not found"));

    let after = harness.schedules.get(&schedule.id).await.unwrap().unwrap();
    assert!(after.last_error.as_deref().unwrap().contains("not found"));
    // the cadence is frozen until the workflow reappears
    assert_eq!(after.next_run_at, Some(due_at));
    assert!(after.locked_at.is_none());
}

#[tokio::test]
async fn unpublished_workflow_fails_but_self_heals() {
    let harness = setup().await;
    let schedule_id = seed_due_schedule(&harness, "wf-1", false).await;

    let report = echo_dispatcher(&harness)
        .dispatch_due_schedules(10, false)
        .await
        .unwrap();
    assert_eq!(report.failed, 1);
    assert!(report.errors[0].message.contains("not published"));

    let after = harness.schedules.get(&schedule_id).await.unwrap().unwrap();
    assert!(after.last_error.as_deref().unwrap().contains("not published"));
    // a later publish resumes the cadence: the fire time advanced
    assert!(after.next_run_at.unwrap() > now_ms());
    assert!(after.locked_at.is_none());
}

struct FailingClient;

#[async_trait]
impl ModelClient for FailingClient {
    async fn generate_text(&self, _model: &ModelRef, _messages: &[ChatMessage]) -> Result<String> {
        Err(anyhow!("provider down"))
    }
}

#[async_trait]
impl ToolInvoker for FailingClient {
    async fn invoke_tool(
        &self,
        _model: &ModelRef,
        _tool: &ToolDescriptor,
        _instruction: &str,
    ) -> Result<Value> {
        Err(anyhow!("tool server down"))
    }
}

#[tokio::test]
async fn failed_run_records_error_and_recomputes_next_run() {
    let harness = setup().await;

    // give the workflow an LLM node so the failing provider is reached
    let mut workflow = simple_workflow("wf-1", true);
    workflow.nodes.insert(
        1,
        WorkflowNode {
            id: "llm".into(),
            name: "llm".into(),
            description: String::new(),
            output_schema: None,
            ui_config: None,
            config: NodeConfig::Llm {
                model: ModelRef { name: "m".into(), provider: None },
                messages: vec![],
            },
        },
    );
    workflow.edges = vec![
        Edge {
            id: "e1".into(),
            source: "start".into(),
            target: "llm".into(),
            ui_config: EdgeUiConfig::default(),
        },
        Edge {
            id: "e2".into(),
            source: "llm".into(),
            target: "out".into(),
            ui_config: EdgeUiConfig::default(),
        },
    ];
    harness.storage.save_workflow(&workflow).await.unwrap();

    let schedule = harness
        .schedules
        .upsert_for_publish("wf-1", "start", &trigger("0 * * * *"))
        .await
        .unwrap();
    sqlx::query("UPDATE workflow_schedules SET next_run_at = ? WHERE id = ?")
        .bind(now_ms() - 60_000)
        .bind(&schedule.id)
        .execute(&harness.pool)
        .await
        .unwrap();

    let client = Arc::new(FailingClient);
    let dispatcher = dispatcher_with(&harness, client.clone(), client);
    let report = dispatcher.dispatch_due_schedules(10, false).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 0);

    let after = harness.schedules.get(&schedule.id).await.unwrap().unwrap();
    assert!(after.last_error.as_deref().unwrap().contains("provider down"));
    // failures never wedge the schedule
    assert!(after.next_run_at.unwrap() > now_ms());
    assert!(after.locked_at.is_none());
    // and never disable it
    assert!(after.enabled);
}

#[tokio::test]
async fn batch_continues_past_a_failing_schedule() {
    let harness = setup().await;
    let bad = seed_due_schedule(&harness, "wf-ghost", true).await;
    // drop the workflow row to force a not-found failure
    harness.storage.delete_workflow("wf-ghost").await.unwrap();
    let good = seed_due_schedule(&harness, "wf-good", true).await;

    let report = echo_dispatcher(&harness)
        .dispatch_due_schedules(10, false)
        .await
        .unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].schedule_id, bad);

    let good_after = harness.schedules.get(&good).await.unwrap().unwrap();
    assert!(good_after.last_run_at.is_some());
}
