/// Manual workflow run endpoint
///
/// Executes a published workflow with a caller-provided trigger payload
/// and returns the full run result including per-node traces.

use crate::api::workflows::AppState;
use crate::runtime::engine::{RunOptions, RunResult, WorkflowGraph};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};

pub fn create_run_routes() -> Router<AppState> {
    Router::new().route("/api/workflows/{id}/run", post(run_workflow))
}

/// Execute a workflow once with the request body as trigger payload
///
/// POST /api/workflows/{id}/run
/// Body: JSON trigger payload (empty body means an empty object)
async fn run_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<RunResult>), StatusCode> {
    // parse the body manually so an empty payload stays convenient
    let payload: Value = if body.trim().is_empty() {
        json!({})
    } else {
        match serde_json::from_str(&body) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("❌ Invalid JSON payload for run of {}: {}", id, e);
                return Err(StatusCode::BAD_REQUEST);
            }
        }
    };

    // only published workflows are runnable
    let compiled = match state.registry.get_workflow(&id) {
        Some(compiled) => compiled,
        None => {
            tracing::warn!("❌ Run requested for unknown or unpublished workflow: {}", id);
            return Err(StatusCode::NOT_FOUND);
        }
    };

    let graph = match WorkflowGraph::compile(&compiled.workflow) {
        Ok(graph) => graph,
        Err(e) => {
            tracing::error!("❌ Workflow {} failed to compile: {:#}", id, e);
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
    };

    tracing::info!("🚀 Manual run of workflow: {}", id);
    let result = state.engine.run(&graph, payload, RunOptions::default()).await;

    let status = if result.is_ok {
        StatusCode::OK
    } else {
        // execution failures are the caller's problem, not the server's
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(result)))
}
