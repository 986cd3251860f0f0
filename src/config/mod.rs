/// Configuration management for the Cogniway engine
///
/// Handles server configuration, database location, scheduler poll
/// cadence, and external capability endpoints.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Schedule dispatcher configuration
    pub scheduler: SchedulerConfig,
    /// External model/tool capability endpoints
    pub capabilities: CapabilityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the SQLite database file (default: "data")
    pub data_dir: String,
}

/// Poll-based scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between dispatch cycles of the in-process poll loop
    pub poll_interval_secs: u64,
    /// Maximum due schedules claimed per dispatch cycle
    pub dispatch_limit: u32,
}

/// External capability endpoints; unset endpoints fall back to the echo
/// client so the engine stays runnable in development
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// OpenAI-compatible base URL (e.g., "https://api.openai.com/v1")
    pub model_base_url: Option<String>,
    pub model_api_key: Option<String>,
    /// Tool-server base URL
    pub tool_base_url: Option<String>,
}

impl Default for Config {
    /// Default configuration with env var support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("COGNIWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("COGNIWAY_PORT")
                    .unwrap_or_else(|_| "3010".to_string())
                    .parse()
                    .unwrap_or(3010),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("COGNIWAY_DATA_DIR")
                    .unwrap_or_else(|_| "data".to_string()),
            },
            scheduler: SchedulerConfig {
                poll_interval_secs: std::env::var("COGNIWAY_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
                dispatch_limit: std::env::var("COGNIWAY_DISPATCH_LIMIT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
            capabilities: CapabilityConfig {
                model_base_url: std::env::var("COGNIWAY_MODEL_BASE_URL").ok(),
                model_api_key: std::env::var("COGNIWAY_MODEL_API_KEY").ok(),
                tool_base_url: std::env::var("COGNIWAY_TOOL_BASE_URL").ok(),
            },
        }
    }
}
