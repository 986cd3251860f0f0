/// Runtime execution engine
///
/// This module provides the graph-based workflow execution core and the
/// poll-based schedule dispatcher. It handles:
/// - Per-run runtime state (inputs, nested outputs)
/// - Node executors dispatched by kind tag
/// - Condition branch evaluation
/// - Graph compilation and fan-in aware stepping
/// - Due-schedule dispatch with optimistic row locking

// Per-run state store
pub mod state;

// Typed condition rule and branch evaluation
pub mod condition;

// Node execution handlers
pub mod executor;

// Graph compilation and the run loop
pub mod engine;

// Cron next-fire-time helper
pub mod cron;

// Schedule store and dispatcher
pub mod scheduler;

// Re-export main types
pub use engine::{ExecutionEngine, RunOptions, RunResult, WorkflowGraph};
pub use executor::{NodeExecutor, NodeOutput};
pub use scheduler::{DispatchReport, ScheduleDispatcher, ScheduleStore};
pub use state::RuntimeState;
