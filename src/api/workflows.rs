/// Workflow management REST API endpoints
///
/// Provides CRUD plus publish/unpublish for workflow definitions with
/// hot-reload support. Publishing validates the graph, swaps the
/// registry, and creates/refreshes the schedule row when the Input node
/// declares a cron trigger; unpublishing retires the schedules.

use crate::{
    runtime::engine::WorkflowGraph,
    runtime::scheduler::ScheduleStore,
    runtime::{ExecutionEngine, ScheduleDispatcher},
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage, types::Workflow},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Workflow storage for persistence
    pub storage: WorkflowStorage,
    /// Hot-reload registry of published workflows
    pub registry: Arc<WorkflowRegistry>,
    /// Schedule row store
    pub schedules: ScheduleStore,
    /// Graph execution engine
    pub engine: Arc<ExecutionEngine>,
    /// Poll-based schedule dispatcher
    pub dispatcher: Arc<ScheduleDispatcher>,
}

/// Response for workflow mutation operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
}

/// Request body for workflow creation/update
#[derive(Debug, Deserialize)]
pub struct SaveWorkflowRequest {
    pub workflow: Workflow,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/{id}", get(get_workflow))
        .route("/api/workflows/{id}", put(update_workflow))
        .route("/api/workflows/{id}", delete(delete_workflow))
        .route("/api/workflows/{id}/publish", post(publish_workflow))
        .route("/api/workflows/{id}/unpublish", post(unpublish_workflow))
}

/// Create a new workflow (saved unpublished)
///
/// POST /api/workflows
/// Body: { "workflow": { "id", "name", "owner_id", "nodes", "edges", ... } }
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<SaveWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, StatusCode> {
    let mut workflow = payload.workflow;

    if workflow.id.is_empty() || workflow.name.is_empty() || workflow.owner_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.storage.get_workflow(&workflow.id).await {
        Ok(Some(_)) => return Err(StatusCode::CONFLICT),
        Ok(None) => {}
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    }

    // drafts are never live until an explicit publish
    workflow.published = false;

    if let Err(e) = state.storage.save_workflow(&workflow).await {
        tracing::error!("Failed to save workflow: {:#}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    tracing::info!("📝 Created workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' created successfully", workflow.name),
    }))
}

/// List all workflows
///
/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.storage.list_workflows().await {
        Ok(workflows) => Ok(Json(json!({ "workflows": workflows }))),
        Err(e) => {
            tracing::error!("Failed to list workflows: {:#}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Get a specific workflow by ID
///
/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, StatusCode> {
    match state.storage.get_workflow(&id).await {
        Ok(Some(workflow)) => Ok(Json(workflow)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get workflow {}: {:#}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Update an existing workflow; the saved draft goes back to unpublished
///
/// PUT /api/workflows/{id}
async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SaveWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, StatusCode> {
    let mut workflow = payload.workflow;
    workflow.id = id.clone();

    if workflow.name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let previous = match state.storage.get_workflow(&id).await {
        Ok(Some(previous)) => previous,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };
    workflow.version = previous.version + 1;
    workflow.published = false;

    if let Err(e) = state.storage.save_workflow(&workflow).await {
        tracing::error!("Failed to update workflow: {:#}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    // an edit invalidates the published copy until the next publish
    state.registry.remove_workflow(&id);
    if let Err(e) = state.schedules.disable_for_workflow(&id).await {
        tracing::error!("Failed to retire schedules for workflow {}: {:#}", id, e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    tracing::info!("📝 Updated workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' updated successfully", workflow.name),
    }))
}

/// Publish a workflow, making it runnable and schedulable
///
/// POST /api/workflows/{id}/publish
async fn publish_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowResponse>, StatusCode> {
    let workflow = match state.storage.get_workflow(&id).await {
        Ok(Some(workflow)) => workflow,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    // structural validation up front so a broken draft can't go live
    if let Err(e) = WorkflowGraph::compile(&workflow) {
        tracing::warn!("Rejected publish of workflow {}: {:#}", id, e);
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    if let Err(e) = state.storage.set_published(&id, true).await {
        tracing::error!("Failed to publish workflow {}: {:#}", id, e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    if let Err(e) = state.registry.reload_workflow(&id).await {
        tracing::error!("Failed to reload workflow into registry: {:#}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    // a scheduler-producing trigger materializes as a schedule row
    if let Some(compiled) = state.registry.get_workflow(&id) {
        if let Some(trigger) = &compiled.schedule_trigger {
            if let Err(e) = state
                .schedules
                .upsert_for_publish(&id, &compiled.input_node_id, trigger)
                .await
            {
                tracing::error!("Failed to create schedule for workflow {}: {:#}", id, e);
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    tracing::info!("🚀 Published workflow: {}", id);

    Ok(Json(WorkflowResponse {
        id,
        message: "Workflow published successfully".to_string(),
    }))
}

/// Unpublish a workflow; its schedules are retired, not deleted
///
/// POST /api/workflows/{id}/unpublish
async fn unpublish_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowResponse>, StatusCode> {
    match state.storage.set_published(&id, false).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to unpublish workflow {}: {:#}", id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    state.registry.remove_workflow(&id);
    if let Err(e) = state.schedules.disable_for_workflow(&id).await {
        tracing::error!("Failed to retire schedules for workflow {}: {:#}", id, e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    tracing::info!("📴 Unpublished workflow: {}", id);

    Ok(Json(WorkflowResponse {
        id,
        message: "Workflow unpublished successfully".to_string(),
    }))
}

/// Delete a workflow
///
/// DELETE /api/workflows/{id}
async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    if let Err(e) = state.schedules.disable_for_workflow(&id).await {
        tracing::error!("Failed to retire schedules for workflow {}: {:#}", id, e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    state.registry.remove_workflow(&id);

    match state.storage.delete_workflow(&id).await {
        Ok(true) => {
            tracing::info!("🗑️ Deleted workflow: {}", id);
            Ok(Json(json!({ "message": "Workflow deleted successfully" })))
        }
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete workflow: {:#}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
