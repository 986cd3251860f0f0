/// Workflow management layer
///
/// This module handles workflow definitions, persistence, and the
/// hot-reload registry of published workflows:
/// - Type definitions (Workflow, WorkflowNode, Edge, condition types)
/// - SQLite persistence with sqlx
/// - Lock-free registry using ArcSwap

// Core workflow type definitions
pub mod types;

// SQLite persistence layer for workflow storage
pub mod storage;

// Hot-reload registry of published workflows
pub mod registry;

// Re-export commonly used types
pub use registry::{CompiledWorkflow, WorkflowRegistry};
pub use storage::WorkflowStorage;
pub use types::{Edge, NodeConfig, NodeKind, Workflow, WorkflowNode};
