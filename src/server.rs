/// Server setup and initialization
///
/// Wires together all components: storage, registry, execution engine,
/// schedule dispatcher, and HTTP routes. Also spawns the background poll
/// loop that drives the dispatcher on a fixed interval.

use crate::{
    api::{create_run_routes, create_schedule_routes, create_workflow_routes, workflows::AppState},
    config::Config,
    llm::{EchoClient, HttpModelClient, HttpToolInvoker, ModelClient, ToolInvoker},
    runtime::{
        scheduler::ScheduleStore, ExecutionEngine, NodeExecutor, ScheduleDispatcher,
    },
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage},
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes and background tasks
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)?;

    let db_path = Path::new(&config.database.data_dir).join("cogniway.db");
    tracing::info!("🗄️ Opening database: {}", db_path.display());
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    tracing::info!("📋 Initializing workflow storage");
    let storage = WorkflowStorage::new(pool.clone());
    storage.init_schema().await?;

    tracing::info!("⏰ Initializing schedule store");
    let schedules = ScheduleStore::new(pool);
    schedules.init_schema().await?;

    tracing::info!("📊 Initializing workflow registry");
    let registry = Arc::new(WorkflowRegistry::new(storage.clone()));
    registry.init_from_storage().await?;

    let model: Arc<dyn ModelClient> = match &config.capabilities.model_base_url {
        Some(base_url) => {
            tracing::info!("🌐 Model capability: {}", base_url);
            Arc::new(HttpModelClient::new(
                base_url.clone(),
                config.capabilities.model_api_key.clone(),
            ))
        }
        None => {
            tracing::warn!("⚠️ No model endpoint configured, using echo client");
            Arc::new(EchoClient::new())
        }
    };
    let tools: Arc<dyn ToolInvoker> = match &config.capabilities.tool_base_url {
        Some(base_url) => {
            tracing::info!("🔧 Tool capability: {}", base_url);
            Arc::new(HttpToolInvoker::new(base_url.clone()))
        }
        None => {
            tracing::warn!("⚠️ No tool endpoint configured, using echo client");
            Arc::new(EchoClient::new())
        }
    };

    tracing::info!("⚙️ Initializing execution engine");
    let executor = Arc::new(NodeExecutor::new(model, tools));
    let engine = Arc::new(ExecutionEngine::new(executor));

    let dispatcher = Arc::new(ScheduleDispatcher::new(
        schedules.clone(),
        storage.clone(),
        Arc::clone(&engine),
    ));
    tracing::info!("🚚 Schedule dispatcher ready: {}", dispatcher.worker_id());

    // background poll loop; the dispatch endpoint drives the same
    // dispatcher for external timers
    let poll_dispatcher = Arc::clone(&dispatcher);
    let poll_interval = Duration::from_secs(config.scheduler.poll_interval_secs.max(1));
    let dispatch_limit = config.scheduler.dispatch_limit;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = poll_dispatcher.dispatch_due_schedules(dispatch_limit, false).await {
                tracing::error!("❌ Dispatch cycle failed: {:#}", e);
            }
        }
    });

    let app_state = AppState {
        storage,
        registry,
        schedules,
        engine,
        dispatcher,
    };

    tracing::info!("📡 Creating HTTP router");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_run_routes())
        .merge(create_schedule_routes())
        .with_state(app_state);

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Cogniway server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
