/// Cogniway: agentic workflow automation engine
///
/// Main entry point for the Cogniway server. Initializes configuration
/// and starts the HTTP server with workflow management, execution, and
/// schedule dispatch.

use cogniway::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Workflow management API at /api/workflows/*
/// - Manual runs at /api/workflows/{id}/run
/// - Schedule dispatch at /api/schedules/dispatch
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (defaults to 0.0.0.0:3010 and ./data/cogniway.db)
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
