/// Schedule dispatch endpoint
///
/// Exposes one dispatch cycle over HTTP so an external timer (cron, k8s
/// CronJob, test harness) can drive the scheduler. The periodic in-process
/// poll loop calls the same dispatcher.

use crate::api::workflows::AppState;
use crate::runtime::scheduler::DispatchReport;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;

pub fn create_schedule_routes() -> Router<AppState> {
    Router::new().route("/api/schedules/dispatch", post(dispatch_schedules))
}

#[derive(Debug, Deserialize)]
struct DispatchParams {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    dry_run: bool,
}

fn default_limit() -> u32 {
    10
}

/// Run one dispatch cycle over due schedules
///
/// POST /api/schedules/dispatch?limit=10&dry_run=false
async fn dispatch_schedules(
    State(state): State<AppState>,
    Query(params): Query<DispatchParams>,
) -> Result<Json<DispatchReport>, StatusCode> {
    match state
        .dispatcher
        .dispatch_due_schedules(params.limit, params.dry_run)
        .await
    {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            tracing::error!("❌ Schedule dispatch failed: {:#}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
