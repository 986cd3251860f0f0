/// HTTP API layer
///
/// This module provides the REST endpoints for workflow management,
/// manual runs, and schedule dispatch:
/// - Workflow CRUD + publish/unpublish
/// - Manual execution of published workflows
/// - External-timer entry point for the schedule dispatcher

// Workflow management endpoints (POST/GET/PUT/DELETE + publish)
pub mod workflows;

// Manual workflow run endpoint
pub mod runs;

// Schedule dispatch endpoint
pub mod schedules;

// Re-export router builders
pub use runs::create_run_routes;
pub use schedules::create_schedule_routes;
pub use workflows::create_workflow_routes;
