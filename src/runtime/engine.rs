/// Petgraph-based graph execution engine
///
/// Compiles workflows into directed graphs and executes them
/// breadth-first from the Input node. Plain nodes route statically to
/// their edge targets; condition nodes route dynamically on the branch
/// selector they return. Fan-in nodes are synchronized with a per-run
/// join counter table so a node reachable over multiple branches runs
/// exactly once, after all expected branches have arrived.

use crate::runtime::executor::{NodeExecutor, NodeOutput};
use crate::runtime::state::RuntimeState;
use crate::workflow::types::{NodeKind, SourceKey, Workflow, WorkflowNode};
use anyhow::{anyhow, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Reserved id of the no-op sink that absorbs suppressed arrivals
pub const SKIP_NODE_ID: &str = "__skip__";

/// Default run timeout; scheduled runs use the same bound
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// Options for a single workflow run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Whole-run timeout; elapsing fails the run
    pub timeout: Duration,
    /// Record per-node execution traces
    pub record_history: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RUN_TIMEOUT,
            record_history: true,
        }
    }
}

/// Outcome of one workflow run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub is_ok: bool,
    /// The Output node's assembled object, when the run reached one
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub histories: Vec<NodeExecutionTrace>,
}

/// Per-node execution trace entry
#[derive(Debug, Clone, Serialize)]
pub struct NodeExecutionTrace {
    pub node_id: String,
    pub node_name: String,
    pub kind: &'static str,
    pub status: TraceStatus,
    /// Unix milliseconds
    pub started_at: i64,
    pub ended_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Success,
    Failed,
}

/// One vertex of the compiled graph
#[derive(Debug, Clone)]
enum GraphNode {
    Work(WorkflowNode),
    /// Reserved no-op sink
    Skip,
}

/// A workflow compiled into an executable directed graph
///
/// Note nodes (and edges touching them) are excluded. Edge weights carry
/// the branch label used for dynamic condition routing.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    graph: DiGraph<GraphNode, Option<String>>,
    input_index: NodeIndex,
    skip_index: NodeIndex,
}

impl WorkflowGraph {
    /// Compile nodes + edges into an executable graph
    ///
    /// Validates the structural invariants: exactly one Input node,
    /// unique non-Note names, no unknown edge endpoints, no cycles.
    pub fn compile(workflow: &Workflow) -> Result<Self> {
        tracing::debug!(
            "🏗️ Compiling workflow '{}' ({} nodes, {} edges)",
            workflow.id,
            workflow.nodes.len(),
            workflow.edges.len()
        );

        let mut graph = DiGraph::new();
        let mut index_of: HashMap<String, NodeIndex> = HashMap::new();
        let mut note_ids: HashSet<&str> = HashSet::new();
        let mut seen_names: HashSet<&str> = HashSet::new();
        let mut input_index = None;

        for node in &workflow.nodes {
            if node.kind() == NodeKind::Note {
                note_ids.insert(node.id.as_str());
                continue;
            }
            if !seen_names.insert(node.name.as_str()) {
                return Err(anyhow!("duplicate node name: '{}'", node.name));
            }
            let index = graph.add_node(GraphNode::Work(node.clone()));
            if index_of.insert(node.id.clone(), index).is_some() {
                return Err(anyhow!("duplicate node id: '{}'", node.id));
            }
            if node.kind() == NodeKind::Input {
                if input_index.replace(index).is_some() {
                    return Err(anyhow!("workflow must have exactly one input node"));
                }
            }
        }

        let input_index =
            input_index.ok_or_else(|| anyhow!("workflow must have exactly one input node"))?;

        for edge in &workflow.edges {
            // annotation edges vanish together with their note nodes
            if note_ids.contains(edge.source.as_str()) || note_ids.contains(edge.target.as_str()) {
                continue;
            }
            let source = index_of
                .get(&edge.source)
                .ok_or_else(|| anyhow!("edge '{}' references unknown node: {}", edge.id, edge.source))?;
            let target = index_of
                .get(&edge.target)
                .ok_or_else(|| anyhow!("edge '{}' references unknown node: {}", edge.id, edge.target))?;
            graph.add_edge(*source, *target, edge.branch_label().map(str::to_string));
        }

        if toposort(&graph, None).is_err() {
            return Err(anyhow!("workflow contains cycles - must be a DAG"));
        }

        let skip_index = graph.add_node(GraphNode::Skip);

        Ok(Self {
            graph,
            input_index,
            skip_index,
        })
    }

    fn node_id(&self, index: NodeIndex) -> &str {
        match &self.graph[index] {
            GraphNode::Work(node) => node.id.as_str(),
            GraphNode::Skip => SKIP_NODE_ID,
        }
    }

    /// Build the per-run fan-in join table from the static edge set
    ///
    /// Each inbound edge contributes its branch label, or its source node
    /// id when unlabeled; a node is tracked only when it has more than
    /// one distinct inbound key. Multiple edges sharing a key count once.
    fn build_need_table(&self) -> HashMap<NodeIndex, usize> {
        let mut inbound: HashMap<NodeIndex, HashSet<String>> = HashMap::new();
        for edge in self.graph.edge_references() {
            let key = match edge.weight() {
                Some(label) => label.clone(),
                None => self.node_id(edge.source()).to_string(),
            };
            inbound.entry(edge.target()).or_default().insert(key);
        }
        inbound
            .into_iter()
            .filter(|(_, keys)| keys.len() > 1)
            .map(|(index, keys)| (index, keys.len()))
            .collect()
    }

    /// Static successors of a plain node
    fn successors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph.edges(index).map(|edge| edge.target()).collect()
    }

    /// Dynamic successors of a condition node: edges whose branch label
    /// equals the returned selector; a falsy selector routes nowhere
    fn branch_successors(&self, index: NodeIndex, selector: Option<&str>) -> Vec<NodeIndex> {
        let Some(selector) = selector else {
            return Vec::new();
        };
        self.graph
            .edges(index)
            .filter(|edge| edge.weight().as_deref() == Some(selector))
            .map(|edge| edge.target())
            .collect()
    }
}

/// Graph execution engine
///
/// Owns the node executor; per-run state (runtime store, join counters,
/// executed set) lives inside each `run` call.
pub struct ExecutionEngine {
    executor: Arc<NodeExecutor>,
}

impl ExecutionEngine {
    pub fn new(executor: Arc<NodeExecutor>) -> Self {
        Self { executor }
    }

    /// Run a compiled workflow graph to completion
    ///
    /// Never returns an error: failures (including timeout) are surfaced
    /// in the result so callers get partial histories either way.
    pub async fn run(&self, graph: &WorkflowGraph, payload: Value, options: RunOptions) -> RunResult {
        let started = std::time::Instant::now();
        let mut histories = Vec::new();

        let outcome = tokio::time::timeout(
            options.timeout,
            self.run_inner(graph, payload, options.record_history, &mut histories),
        )
        .await;

        match outcome {
            Ok(Ok(value)) => {
                tracing::info!("🎉 Workflow run completed in {:?}", started.elapsed());
                RunResult {
                    is_ok: true,
                    value,
                    error: None,
                    histories,
                }
            }
            Ok(Err(e)) => {
                tracing::error!("❌ Workflow run failed after {:?}: {:#}", started.elapsed(), e);
                RunResult {
                    is_ok: false,
                    value: None,
                    error: Some(format!("{e:#}")),
                    histories,
                }
            }
            Err(_) => {
                tracing::error!("⏰ Workflow run timed out after {:?}", options.timeout);
                RunResult {
                    is_ok: false,
                    value: None,
                    error: Some(format!(
                        "workflow run timed out after {}s",
                        options.timeout.as_secs()
                    )),
                    histories,
                }
            }
        }
    }

    /// Event-driven stepping loop
    ///
    /// Single-threaded per run: arrivals are processed from a queue, so
    /// the join counters need no locking. Every node executes at most
    /// once per run; surplus arrivals divert to the SKIP sink.
    async fn run_inner(
        &self,
        graph: &WorkflowGraph,
        payload: Value,
        record_history: bool,
        histories: &mut Vec<NodeExecutionTrace>,
    ) -> Result<Option<Value>> {
        let mut state = RuntimeState::new(payload.clone());
        let mut need_table = graph.build_need_table();
        let mut executed: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::from([graph.input_index]);
        let mut final_value: Option<Value> = None;

        while let Some(index) = queue.pop_front() {
            if index == graph.skip_index || executed.contains(&index) {
                continue;
            }

            // fan-in gate: wait until every distinct inbound branch arrived
            if let Some(count) = need_table.get_mut(&index) {
                *count -= 1;
                if *count > 0 {
                    tracing::debug!(
                        "⏳ Join node '{}' waiting for {} more branch(es)",
                        graph.node_id(index),
                        count
                    );
                    queue.push_back(graph.skip_index);
                    continue;
                }
                need_table.remove(&index);
            }

            let GraphNode::Work(node) = &graph.graph[index] else {
                continue;
            };
            executed.insert(index);

            let node_started = now_millis();
            let output = self.executor.execute(node, &state).await;
            let node_ended = now_millis();

            let output = match output {
                Ok(output) => {
                    if record_history {
                        histories.push(trace(node, TraceStatus::Success, node_started, node_ended, None));
                    }
                    output
                }
                Err(e) => {
                    if record_history {
                        histories.push(trace(
                            node,
                            TraceStatus::Failed,
                            node_started,
                            node_ended,
                            Some(format!("{e:#}")),
                        ));
                    }
                    return Err(e.context(format!("node '{}' failed", node.name)));
                }
            };

            match output {
                NodeOutput::Value(value) => {
                    if node.kind() == NodeKind::Input {
                        state.set_input(&node.id, payload.clone());
                    }
                    if node.kind() == NodeKind::Output {
                        final_value = Some(value.clone());
                    }
                    state.set_output(&SourceKey::root(&node.id), value);
                    queue.extend(graph.successors(index));
                }
                NodeOutput::Branch(selector) => {
                    queue.extend(graph.branch_successors(index, selector.as_deref()));
                }
            }
        }

        Ok(final_value)
    }
}

fn trace(
    node: &WorkflowNode,
    status: TraceStatus,
    started_at: i64,
    ended_at: i64,
    error: Option<String>,
) -> NodeExecutionTrace {
    NodeExecutionTrace {
        node_id: node.id.clone(),
        node_name: node.name.clone(),
        kind: node.kind().as_str(),
        status,
        started_at,
        ended_at,
        error,
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
