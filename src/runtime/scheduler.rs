/// Poll-based workflow schedule dispatcher
///
/// Scans the `workflow_schedules` table for due rows, claims each with an
/// atomic conditional UPDATE (optimistic lock), runs the workflow through
/// the graph engine, and finalizes the row: clear the lock, record the
/// outcome, recompute the next fire time. Multiple worker processes may
/// dispatch concurrently; correctness rests entirely on the conditional
/// lock update, not on in-process mutual exclusion. Locks left behind by
/// crashed workers expire after `LOCK_TIMEOUT_MS`.

use crate::runtime::cron::next_fire_time;
use crate::runtime::engine::{now_millis, ExecutionEngine, RunOptions, WorkflowGraph};
use crate::workflow::storage::WorkflowStorage;
use crate::workflow::types::{ScheduleTrigger, Workflow};
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How long a worker may hold a schedule lock before it is considered
/// crashed and the lock becomes stealable
pub const LOCK_TIMEOUT_MS: i64 = 5 * 60 * 1000;

/// Execution timeout for scheduled runs
pub const SCHEDULED_RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// A persisted workflow schedule row
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSchedule {
    pub id: String,
    pub workflow_id: String,
    /// Input node the schedule was created from
    pub workflow_node_id: String,
    pub cron: String,
    pub timezone: String,
    pub enabled: bool,
    /// Stored payload merged into each trigger payload
    pub payload: Option<Value>,
    /// Unix milliseconds; NULL pauses the schedule
    pub next_run_at: Option<i64>,
    pub last_run_at: Option<i64>,
    pub last_error: Option<String>,
    pub locked_at: Option<i64>,
    pub locked_by: Option<String>,
}

const SCHEDULE_COLUMNS: &str = "id, workflow_id, workflow_node_id, cron, timezone, enabled, \
     payload, next_run_at, last_run_at, last_error, locked_at, locked_by";

fn schedule_from_row(row: &SqliteRow) -> Result<WorkflowSchedule> {
    let payload: Option<String> = row.try_get("payload")?;
    Ok(WorkflowSchedule {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        workflow_node_id: row.try_get("workflow_node_id")?,
        cron: row.try_get("cron")?,
        timezone: row.try_get("timezone")?,
        enabled: row.try_get("enabled")?,
        payload: payload.as_deref().map(serde_json::from_str).transpose()?,
        next_run_at: row.try_get("next_run_at")?,
        last_run_at: row.try_get("last_run_at")?,
        last_error: row.try_get("last_error")?,
        locked_at: row.try_get("locked_at")?,
        locked_by: row.try_get("locked_by")?,
    })
}

/// What to do with `next_run_at` when finalizing a failed run
#[derive(Debug, Clone)]
pub enum NextRunUpdate {
    /// Write the given fire time (NULL pauses the schedule)
    Set(Option<i64>),
    /// Leave the stored value untouched (workflow-not-found case)
    Keep,
}

/// SQLite-backed store for workflow schedule rows
///
/// All lock-field mutations go through this store; the conditional
/// UPDATE in `try_lock` is the only cross-process synchronization point
/// in the system.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    pool: SqlitePool,
}

impl ScheduleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the schedule schema; safe to call multiple times
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_schedules (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                workflow_node_id TEXT NOT NULL,
                cron TEXT NOT NULL,
                timezone TEXT NOT NULL DEFAULT 'UTC',
                enabled INTEGER NOT NULL DEFAULT 1,
                payload JSON,
                next_run_at INTEGER,
                last_run_at INTEGER,
                last_error TEXT,
                locked_at INTEGER,
                locked_by TEXT,
                UNIQUE(workflow_id, workflow_node_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_schedules_due
            ON workflow_schedules(enabled, next_run_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create or refresh the schedule row for a published workflow
    ///
    /// `next_run_at` is computed from now; an unparseable cron leaves it
    /// NULL, so the schedule exists but never becomes due.
    pub async fn upsert_for_publish(
        &self,
        workflow_id: &str,
        node_id: &str,
        trigger: &ScheduleTrigger,
    ) -> Result<WorkflowSchedule> {
        let next_run_at = next_fire_time(&trigger.cron, &trigger.timezone, Utc::now())
            .map(|dt| dt.timestamp_millis());
        let payload_json = trigger
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO workflow_schedules
                (id, workflow_id, workflow_node_id, cron, timezone, enabled, payload, next_run_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(workflow_id, workflow_node_id) DO UPDATE SET
                cron = excluded.cron,
                timezone = excluded.timezone,
                enabled = 1,
                payload = excluded.payload,
                next_run_at = excluded.next_run_at
            RETURNING {SCHEDULE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(workflow_id)
        .bind(node_id)
        .bind(&trigger.cron)
        .bind(&trigger.timezone)
        .bind(payload_json)
        .bind(next_run_at)
        .fetch_one(&self.pool)
        .await?;

        let schedule = schedule_from_row(&row)?;
        tracing::info!(
            "⏰ Schedule ready: {} (workflow {}, cron '{}', next run {:?})",
            schedule.id,
            workflow_id,
            trigger.cron,
            schedule.next_run_at
        );
        Ok(schedule)
    }

    /// Retire all schedules of a workflow (unpublish/delete); rows are
    /// kept for history, only disabled
    pub async fn disable_for_workflow(&self, workflow_id: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE workflow_schedules SET enabled = 0 WHERE workflow_id = ?")
            .bind(workflow_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn get(&self, id: &str) -> Result<Option<WorkflowSchedule>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM workflow_schedules WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    /// Enabled schedules due at `now`, oldest first
    pub async fn due_schedules(&self, now: i64, limit: u32) -> Result<Vec<WorkflowSchedule>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SCHEDULE_COLUMNS} FROM workflow_schedules
            WHERE enabled = 1 AND next_run_at IS NOT NULL AND next_run_at <= ?
            ORDER BY next_run_at ASC
            LIMIT ?
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    /// Atomic conditional lock acquisition
    ///
    /// Succeeds only while the row is still due, enabled, and either
    /// unlocked, expired-locked, or locked by this same worker. Zero rows
    /// updated means another worker holds a live lock (or already ran and
    /// advanced `next_run_at`).
    pub async fn try_lock(
        &self,
        id: &str,
        worker_id: &str,
        now: i64,
    ) -> Result<Option<WorkflowSchedule>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE workflow_schedules
            SET locked_at = ?, locked_by = ?
            WHERE id = ?
              AND enabled = 1
              AND next_run_at IS NOT NULL AND next_run_at <= ?
              AND (locked_at IS NULL OR locked_at < ? OR locked_by = ?)
            RETURNING {SCHEDULE_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(worker_id)
        .bind(id)
        .bind(now)
        .bind(now - LOCK_TIMEOUT_MS)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    /// Release a lock without recording an outcome (dry-run path)
    pub async fn release_lock(&self, id: &str, worker_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE workflow_schedules SET locked_at = NULL, locked_by = NULL \
             WHERE id = ? AND locked_by = ?",
        )
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Finalize a successful run: clear lock, stamp the run, clear the
    /// error, advance the fire time
    pub async fn finalize_success(
        &self,
        id: &str,
        ran_at: i64,
        next_run_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workflow_schedules
            SET locked_at = NULL, locked_by = NULL,
                last_run_at = ?, last_error = NULL, next_run_at = ?
            WHERE id = ?
            "#,
        )
        .bind(ran_at)
        .bind(next_run_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Finalize a failed run: clear lock, record the error; the fire time
    /// still advances unless the caller asked to keep it (not-found case),
    /// so a failing schedule self-heals instead of wedging
    pub async fn finalize_failure(
        &self,
        id: &str,
        message: &str,
        next_run: NextRunUpdate,
    ) -> Result<()> {
        match next_run {
            NextRunUpdate::Set(next_run_at) => {
                sqlx::query(
                    r#"
                    UPDATE workflow_schedules
                    SET locked_at = NULL, locked_by = NULL,
                        last_error = ?, next_run_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(message)
                .bind(next_run_at)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            NextRunUpdate::Keep => {
                sqlx::query(
                    r#"
                    UPDATE workflow_schedules
                    SET locked_at = NULL, locked_by = NULL, last_error = ?
                    WHERE id = ?
                    "#,
                )
                .bind(message)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}

/// One schedule's failure inside a dispatch batch
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleFailure {
    pub schedule_id: String,
    pub message: String,
}

/// Aggregate outcome of one dispatch cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub scanned: usize,
    pub locked: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<ScheduleFailure>,
}

/// Drives due schedules through lock -> run -> finalize
///
/// Schedules are processed sequentially within one dispatch call; one
/// schedule's failure never aborts the batch.
pub struct ScheduleDispatcher {
    store: ScheduleStore,
    workflows: WorkflowStorage,
    engine: Arc<ExecutionEngine>,
    worker_id: String,
}

impl ScheduleDispatcher {
    pub fn new(store: ScheduleStore, workflows: WorkflowStorage, engine: Arc<ExecutionEngine>) -> Self {
        let worker_id = format!("worker-{}-{}", std::process::id(), Uuid::new_v4().simple());
        Self {
            store,
            workflows,
            engine,
            worker_id,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run one dispatch cycle over due schedules
    ///
    /// `dry_run` exercises selection and locking without executing
    /// anything; locks taken in dry-run mode are released untouched.
    pub async fn dispatch_due_schedules(&self, limit: u32, dry_run: bool) -> Result<DispatchReport> {
        let now = now_millis();
        let due = self.store.due_schedules(now, limit).await?;
        let mut report = DispatchReport {
            scanned: due.len(),
            ..Default::default()
        };

        if !due.is_empty() {
            tracing::info!("📬 Dispatching {} due schedule(s) as {}", due.len(), self.worker_id);
        }

        for schedule in due {
            let locked = match self.store.try_lock(&schedule.id, &self.worker_id, now_millis()).await {
                Ok(Some(locked)) => locked,
                Ok(None) => {
                    tracing::debug!("⏭️ Schedule {} held by another worker", schedule.id);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(ScheduleFailure {
                        schedule_id: schedule.id.clone(),
                        message: format!("lock acquisition failed: {e:#}"),
                    });
                    continue;
                }
            };

            report.locked += 1;

            if dry_run {
                if let Err(e) = self.store.release_lock(&locked.id, &self.worker_id).await {
                    tracing::warn!("⚠️ Failed to release dry-run lock {}: {:#}", locked.id, e);
                }
                continue;
            }

            match self.run_locked_schedule(&locked).await {
                Ok(()) => report.succeeded += 1,
                Err(message) => {
                    tracing::warn!("❌ Schedule {} failed: {}", locked.id, message);
                    report.failed += 1;
                    report.errors.push(ScheduleFailure {
                        schedule_id: locked.id.clone(),
                        message,
                    });
                }
            }
        }

        tracing::info!(
            "📊 Dispatch done: {} scanned, {} locked, {} ok, {} failed, {} skipped",
            report.scanned,
            report.locked,
            report.succeeded,
            report.failed,
            report.skipped
        );
        Ok(report)
    }

    /// Execute one locked schedule and finalize its row
    ///
    /// Every path through here releases the lock exactly once. The fire
    /// time is recomputed on every outcome except workflow-not-found,
    /// where the cadence is left untouched until the workflow reappears.
    async fn run_locked_schedule(&self, schedule: &WorkflowSchedule) -> Result<(), String> {
        let workflow = match self.workflows.get_workflow(&schedule.workflow_id).await {
            Ok(Some(workflow)) => workflow,
            Ok(None) => {
                let message = format!("workflow not found: {}", schedule.workflow_id);
                self.finalize_err(schedule, &message, NextRunUpdate::Keep).await;
                return Err(message);
            }
            Err(e) => {
                let message = format!("failed to load workflow: {e:#}");
                self.finalize_err(schedule, &message, self.recompute(schedule)).await;
                return Err(message);
            }
        };

        if !workflow.published {
            let message = format!("workflow not published: {}", schedule.workflow_id);
            self.finalize_err(schedule, &message, self.recompute(schedule)).await;
            return Err(message);
        }

        let graph = match WorkflowGraph::compile(&workflow) {
            Ok(graph) => graph,
            Err(e) => {
                let message = format!("workflow failed to compile: {e:#}");
                self.finalize_err(schedule, &message, self.recompute(schedule)).await;
                return Err(message);
            }
        };

        let payload = trigger_payload(schedule, &workflow);
        tracing::info!(
            "🚀 Running scheduled workflow {} (schedule {})",
            schedule.workflow_id,
            schedule.id
        );

        let result = self
            .engine
            .run(
                &graph,
                payload,
                RunOptions {
                    timeout: SCHEDULED_RUN_TIMEOUT,
                    record_history: false,
                },
            )
            .await;

        let ran_at = now_millis();
        let next = match self.recompute(schedule) {
            NextRunUpdate::Set(next) => next,
            NextRunUpdate::Keep => None,
        };

        if result.is_ok {
            if let Err(e) = self.store.finalize_success(&schedule.id, ran_at, next).await {
                return Err(format!("run succeeded but finalize failed: {e:#}"));
            }
            Ok(())
        } else {
            let message = result.error.unwrap_or_else(|| "workflow run failed".to_string());
            self.finalize_err(schedule, &message, NextRunUpdate::Set(next)).await;
            Err(message)
        }
    }

    fn recompute(&self, schedule: &WorkflowSchedule) -> NextRunUpdate {
        NextRunUpdate::Set(
            next_fire_time(&schedule.cron, &schedule.timezone, Utc::now())
                .map(|dt| dt.timestamp_millis()),
        )
    }

    async fn finalize_err(&self, schedule: &WorkflowSchedule, message: &str, next: NextRunUpdate) {
        if let Err(e) = self.store.finalize_failure(&schedule.id, message, next).await {
            tracing::error!("❌ Failed to finalize schedule {}: {:#}", schedule.id, e);
        }
    }
}

/// Build the trigger payload: the schedule's stored payload merged with
/// owner and trigger context
fn trigger_payload(schedule: &WorkflowSchedule, workflow: &Workflow) -> Value {
    let mut payload = match schedule.payload.clone() {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    payload.insert("trigger_type".to_string(), json!("schedule"));
    payload.insert("schedule_id".to_string(), json!(schedule.id));
    payload.insert("owner_id".to_string(), json!(workflow.owner_id));
    payload.insert("fired_at".to_string(), json!(Utc::now().to_rfc3339()));
    Value::Object(payload)
}
