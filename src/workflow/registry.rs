/// Hot-reload registry of published workflows using ArcSwap
///
/// Provides lock-free, atomic updates to the in-memory registry of
/// runnable workflows. Each update swaps the entire registry pointer, so
/// concurrent runs keep the definition they started with while publishes
/// land instantly.

use crate::runtime::engine::WorkflowGraph;
use crate::workflow::{storage::WorkflowStorage, types::{NodeConfig, NodeKind, ScheduleTrigger, Workflow}};
use anyhow::{anyhow, Result};
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

/// Lock-free registry of published, compile-checked workflows
#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Atomic pointer to the workflow map (workflow_id -> compiled entry)
    workflows: ArcSwap<HashMap<String, CompiledWorkflow>>,

    /// Persistent storage for reload operations
    storage: WorkflowStorage,
}

/// A published workflow with execution metadata extracted at compile time
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub workflow: Workflow,
    /// The single Input node's id (the run entry point)
    pub input_node_id: String,
    /// Schedule trigger declared on the Input node, if any
    pub schedule_trigger: Option<ScheduleTrigger>,
}

impl WorkflowRegistry {
    pub fn new(storage: WorkflowStorage) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Populate the registry from storage at startup
    pub async fn init_from_storage(&self) -> Result<()> {
        let stored = self.storage.load_published_workflows().await?;

        let mut compiled = HashMap::new();
        for (id, workflow) in stored {
            match compile_workflow(workflow) {
                Ok(entry) => {
                    compiled.insert(id, entry);
                }
                // a broken definition must not block startup for the rest
                Err(e) => tracing::warn!("⚠️ Skipping workflow '{}': {:#}", id, e),
            }
        }

        self.workflows.store(Arc::new(compiled));
        tracing::info!(
            "📊 Initialized workflow registry with {} workflow(s)",
            self.workflows.load().len()
        );
        Ok(())
    }

    /// Hot-reload a single workflow from storage
    ///
    /// Unpublished workflows are dropped from the registry; published
    /// ones replace their previous entry via atomic pointer swap.
    pub async fn reload_workflow(&self, workflow_id: &str) -> Result<()> {
        let workflow = self
            .storage
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| anyhow!("workflow not found: {}", workflow_id))?;

        let current = self.workflows.load();
        let mut next = (**current).clone();

        if workflow.published {
            next.insert(workflow_id.to_string(), compile_workflow(workflow)?);
        } else {
            next.remove(workflow_id);
        }

        self.workflows.store(Arc::new(next));
        tracing::info!("🔥 Hot-reloaded workflow: {}", workflow_id);
        Ok(())
    }

    /// Get a workflow by ID (lock-free read)
    pub fn get_workflow(&self, workflow_id: &str) -> Option<CompiledWorkflow> {
        self.workflows.load().get(workflow_id).cloned()
    }

    /// Remove a workflow from the registry
    pub fn remove_workflow(&self, workflow_id: &str) {
        let current = self.workflows.load();
        let mut next = (**current).clone();

        if next.remove(workflow_id).is_some() {
            self.workflows.store(Arc::new(next));
            tracing::info!("🗑️ Removed workflow from registry: {}", workflow_id);
        }
    }
}

/// Validate a workflow and extract its execution metadata
///
/// Compilation doubles as the structural check: exactly one Input node,
/// unique names, known edge endpoints, acyclic.
fn compile_workflow(workflow: Workflow) -> Result<CompiledWorkflow> {
    WorkflowGraph::compile(&workflow)?;

    let input = workflow
        .nodes
        .iter()
        .find(|node| node.kind() == NodeKind::Input)
        .ok_or_else(|| anyhow!("workflow must have exactly one input node"))?;

    let schedule_trigger = match &input.config {
        NodeConfig::Input { schedule } => schedule.clone(),
        _ => None,
    };

    Ok(CompiledWorkflow {
        input_node_id: input.id.clone(),
        schedule_trigger,
        workflow,
    })
}
