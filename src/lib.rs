/// Cogniway: agentic workflow automation engine
///
/// This library provides a graph-based workflow execution core (typed
/// nodes, dynamic condition routing, fan-in joins) and a poll-based
/// schedule dispatcher with optimistic cross-worker locking.

// Core configuration and setup
pub mod config;

// Workflow management layer - definitions, storage, and registry
pub mod workflow;

// Runtime execution engine - graph execution and schedule dispatch
pub mod runtime;

// External model and tool capabilities
pub mod llm;

// HTTP API layer - workflow management, manual runs, schedule dispatch
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use llm::{ModelClient, ToolInvoker};
pub use runtime::{ExecutionEngine, RunOptions, RunResult, ScheduleDispatcher, WorkflowGraph};
pub use server::start_server;
pub use workflow::{Edge, NodeConfig, NodeKind, Workflow, WorkflowNode};
