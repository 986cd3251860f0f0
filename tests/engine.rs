/// Graph engine integration tests
///
/// Covers routing, fan-in join synchronization, condition precedence,
/// output assembly, and failure/timeout surfacing.

use cogniway::llm::{ChatMessage, EchoClient, ModelClient, ToolInvoker};
use cogniway::runtime::{ExecutionEngine, NodeExecutor, RunOptions, RunResult, WorkflowGraph};
use cogniway::workflow::types::{
    BranchType, ConditionBranch, ConditionOperator, ConditionRule, Edge, EdgeUiConfig,
    LogicalOperator, MessagePart, MessageRole, ModelRef, NodeConfig, OutputMapping, SourceKey,
    TemplateMessage, ToolDescriptor, Workflow, WorkflowNode,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

fn node(id: &str, config: NodeConfig) -> WorkflowNode {
    WorkflowNode {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        output_schema: None,
        ui_config: None,
        config,
    }
}

fn input_node(id: &str) -> WorkflowNode {
    node(id, NodeConfig::Input { schedule: None })
}

fn llm_node(id: &str) -> WorkflowNode {
    node(
        id,
        NodeConfig::Llm {
            model: ModelRef { name: "test-model".into(), provider: None },
            messages: vec![TemplateMessage {
                role: MessageRole::User,
                parts: vec![MessagePart::Text { text: format!("run {id}") }],
            }],
        },
    )
}

fn output_node(id: &str, mappings: Vec<(&str, SourceKey)>) -> WorkflowNode {
    node(
        id,
        NodeConfig::Output {
            output_data: mappings
                .into_iter()
                .map(|(key, source)| OutputMapping { key: key.to_string(), source })
                .collect(),
        },
    )
}

fn edge(id: &str, source: &str, target: &str) -> Edge {
    Edge {
        id: id.to_string(),
        source: source.to_string(),
        target: target.to_string(),
        ui_config: EdgeUiConfig::default(),
    }
}

fn labeled_edge(id: &str, source: &str, target: &str, label: &str) -> Edge {
    Edge {
        id: id.to_string(),
        source: source.to_string(),
        target: target.to_string(),
        ui_config: EdgeUiConfig {
            source_handle: Some(label.to_string()),
            label: None,
        },
    }
}

fn workflow(nodes: Vec<WorkflowNode>, edges: Vec<Edge>) -> Workflow {
    Workflow {
        id: "wf-test".into(),
        name: "test".into(),
        description: String::new(),
        owner_id: "owner-1".into(),
        published: true,
        version: 1,
        nodes,
        edges,
    }
}

fn engine_with(client: Arc<EchoClient>) -> ExecutionEngine {
    ExecutionEngine::new(Arc::new(NodeExecutor::new(client.clone(), client)))
}

async fn run(workflow: &Workflow, client: Arc<EchoClient>) -> RunResult {
    let graph = WorkflowGraph::compile(workflow).expect("workflow compiles");
    engine_with(client)
        .run(&graph, json!({"flag": "yes"}), RunOptions::default())
        .await
}

fn executions(result: &RunResult, node_id: &str) -> usize {
    result
        .histories
        .iter()
        .filter(|trace| trace.node_id == node_id)
        .count()
}

fn position(result: &RunResult, node_id: &str) -> usize {
    result
        .histories
        .iter()
        .position(|trace| trace.node_id == node_id)
        .unwrap_or_else(|| panic!("node {node_id} did not execute"))
}

#[tokio::test]
async fn single_inbound_node_runs_once_despite_duplicate_edges() {
    let wf = workflow(
        vec![input_node("start"), llm_node("a"), llm_node("x")],
        vec![
            edge("e1", "start", "a"),
            // two parallel edges sharing one branch key count once
            edge("e2", "a", "x"),
            edge("e3", "a", "x"),
        ],
    );
    let client = Arc::new(EchoClient::new());
    let result = run(&wf, client.clone()).await;

    assert!(result.is_ok, "{:?}", result.error);
    assert_eq!(executions(&result, "x"), 1);
    // one model call for "a", one for "x"
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn diamond_join_runs_once_after_both_branches() {
    let wf = workflow(
        vec![input_node("start"), llm_node("a"), llm_node("b"), llm_node("x")],
        vec![
            edge("e1", "start", "a"),
            edge("e2", "start", "b"),
            labeled_edge("e3", "a", "x", "path-a"),
            labeled_edge("e4", "b", "x", "path-b"),
        ],
    );
    let result = run(&wf, Arc::new(EchoClient::new())).await;

    assert!(result.is_ok, "{:?}", result.error);
    assert_eq!(executions(&result, "x"), 1);
    assert!(position(&result, "x") > position(&result, "a"));
    assert!(position(&result, "x") > position(&result, "b"));
}

#[tokio::test]
async fn unlabeled_diamond_joins_on_source_identity() {
    let wf = workflow(
        vec![input_node("start"), llm_node("a"), llm_node("b"), llm_node("x")],
        vec![
            edge("e1", "start", "a"),
            edge("e2", "start", "b"),
            edge("e3", "a", "x"),
            edge("e4", "b", "x"),
        ],
    );
    let result = run(&wf, Arc::new(EchoClient::new())).await;

    assert!(result.is_ok, "{:?}", result.error);
    assert_eq!(executions(&result, "x"), 1);
    assert!(position(&result, "x") > position(&result, "a"));
    assert!(position(&result, "x") > position(&result, "b"));
}

fn condition_node(id: &str) -> WorkflowNode {
    // if: flag equals "no" (false for the test payload)
    // elseIf: flag equals "yes" (true)
    // else: always matches if reached
    let source = SourceKey::new("start", vec!["flag".into()]);
    node(
        id,
        NodeConfig::Condition {
            if_branch: ConditionBranch {
                id: "if".into(),
                branch_type: BranchType::If,
                logical_operator: LogicalOperator::And,
                conditions: vec![ConditionRule {
                    source: source.clone(),
                    operator: ConditionOperator::Equals,
                    value: Some(json!("no")),
                }],
            },
            else_if: vec![ConditionBranch {
                id: "ei1".into(),
                branch_type: BranchType::ElseIf,
                logical_operator: LogicalOperator::And,
                conditions: vec![ConditionRule {
                    source,
                    operator: ConditionOperator::Equals,
                    value: Some(json!("yes")),
                }],
            }],
            else_branch: Some(ConditionBranch {
                id: "else".into(),
                branch_type: BranchType::Else,
                logical_operator: LogicalOperator::And,
                conditions: vec![],
            }),
        },
    )
}

#[tokio::test]
async fn condition_selects_elseif_over_else() {
    let wf = workflow(
        vec![
            input_node("start"),
            condition_node("cond"),
            llm_node("n1"),
            llm_node("n2"),
            llm_node("n3"),
        ],
        vec![
            edge("e1", "start", "cond"),
            labeled_edge("e2", "cond", "n1", "if"),
            labeled_edge("e3", "cond", "n2", "ei1"),
            labeled_edge("e4", "cond", "n3", "else"),
        ],
    );
    let result = run(&wf, Arc::new(EchoClient::new())).await;

    assert!(result.is_ok, "{:?}", result.error);
    assert_eq!(executions(&result, "n1"), 0);
    assert_eq!(executions(&result, "n2"), 1);
    assert_eq!(executions(&result, "n3"), 0);
}

#[tokio::test]
async fn condition_with_no_match_terminates_the_path() {
    // same condition but the payload matches neither branch and there is
    // no else edge wired; the run ends without reaching the output
    let mut cond = condition_node("cond");
    if let NodeConfig::Condition { else_branch, .. } = &mut cond.config {
        *else_branch = None;
    }
    let wf = workflow(
        vec![input_node("start"), cond, llm_node("n1"), llm_node("n2")],
        vec![
            edge("e1", "start", "cond"),
            labeled_edge("e2", "cond", "n1", "if"),
            labeled_edge("e3", "cond", "n2", "ei1"),
        ],
    );
    let graph = WorkflowGraph::compile(&wf).expect("workflow compiles");
    let result = engine_with(Arc::new(EchoClient::new()))
        .run(&graph, json!({"flag": "neither"}), RunOptions::default())
        .await;

    assert!(result.is_ok, "{:?}", result.error);
    assert!(result.value.is_none());
    assert_eq!(executions(&result, "n1"), 0);
    assert_eq!(executions(&result, "n2"), 0);
}

#[tokio::test]
async fn output_assembles_nested_paths() {
    let client = Arc::new(EchoClient::with_response(
        r#"{"answer": "hi", "hasNewInfo": true}"#,
    ));
    let wf = workflow(
        vec![
            input_node("start"),
            llm_node("llm1"),
            output_node(
                "out",
                vec![("answer", SourceKey::new("llm1", vec!["answer".into(), "answer".into()]))],
            ),
        ],
        vec![edge("e1", "start", "llm1"), edge("e2", "llm1", "out")],
    );
    let result = run(&wf, client).await;

    assert!(result.is_ok, "{:?}", result.error);
    assert_eq!(result.value, Some(json!({"answer": "hi"})));
}

#[tokio::test]
async fn tool_node_returns_structured_result() {
    let wf = workflow(
        vec![
            input_node("start"),
            node(
                "tool1",
                NodeConfig::Tool {
                    model: ModelRef { name: "test-model".into(), provider: None },
                    tool: ToolDescriptor {
                        name: "web-search".into(),
                        description: String::new(),
                        input_schema: None,
                    },
                    message: TemplateMessage {
                        role: MessageRole::User,
                        parts: vec![MessagePart::Text { text: "search it".into() }],
                    },
                },
            ),
            output_node(
                "out",
                vec![("tool", SourceKey::new("tool1", vec!["tool_result".into(), "tool".into()]))],
            ),
        ],
        vec![edge("e1", "start", "tool1"), edge("e2", "tool1", "out")],
    );
    let result = run(&wf, Arc::new(EchoClient::new())).await;

    assert!(result.is_ok, "{:?}", result.error);
    assert_eq!(result.value, Some(json!({"tool": "web-search"})));
}

#[tokio::test]
async fn note_nodes_are_excluded_from_the_compiled_graph() {
    let wf = workflow(
        vec![
            input_node("start"),
            node("memo", NodeConfig::Note { text: "reviewer note".into() }),
            output_node("out", vec![("echo", SourceKey::root("start"))]),
        ],
        vec![
            edge("e1", "start", "out"),
            // annotation edge, dropped together with the note
            edge("e2", "start", "memo"),
        ],
    );
    let result = run(&wf, Arc::new(EchoClient::new())).await;

    assert!(result.is_ok, "{:?}", result.error);
    assert_eq!(executions(&result, "memo"), 0);
    assert_eq!(result.value, Some(json!({"echo": {"flag": "yes"}})));
}

#[test]
fn cycles_are_rejected_at_compile_time() {
    let wf = workflow(
        vec![input_node("start"), llm_node("a"), llm_node("b")],
        vec![
            edge("e1", "start", "a"),
            edge("e2", "a", "b"),
            edge("e3", "b", "a"),
        ],
    );
    let err = WorkflowGraph::compile(&wf).unwrap_err();
    assert!(err.to_string().contains("cycle"), "{err}");
}

#[test]
fn duplicate_input_nodes_are_rejected() {
    let wf = workflow(vec![input_node("start"), input_node("start2")], vec![]);
    assert!(WorkflowGraph::compile(&wf).is_err());
}

struct FailingClient;

#[async_trait]
impl ModelClient for FailingClient {
    async fn generate_text(&self, _model: &ModelRef, _messages: &[ChatMessage]) -> Result<String> {
        Err(anyhow!("provider unavailable"))
    }
}

#[async_trait]
impl ToolInvoker for FailingClient {
    async fn invoke_tool(
        &self,
        _model: &ModelRef,
        _tool: &ToolDescriptor,
        _instruction: &str,
    ) -> Result<Value> {
        Err(anyhow!("tool server unavailable"))
    }
}

#[tokio::test]
async fn executor_failure_fails_the_whole_run() {
    let wf = workflow(
        vec![input_node("start"), llm_node("a"), output_node("out", vec![])],
        vec![edge("e1", "start", "a"), edge("e2", "a", "out")],
    );
    let graph = WorkflowGraph::compile(&wf).unwrap();
    let client = Arc::new(FailingClient);
    let engine = ExecutionEngine::new(Arc::new(NodeExecutor::new(client.clone(), client)));
    let result = engine.run(&graph, json!({}), RunOptions::default()).await;

    assert!(!result.is_ok);
    assert!(result.error.as_deref().unwrap().contains("provider unavailable"));
    // the failing node is traced, downstream nodes never ran
    assert_eq!(executions(&result, "a"), 1);
    assert_eq!(executions(&result, "out"), 0);
}

struct SlowClient;

#[async_trait]
impl ModelClient for SlowClient {
    async fn generate_text(&self, _model: &ModelRef, _messages: &[ChatMessage]) -> Result<String> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

#[async_trait]
impl ToolInvoker for SlowClient {
    async fn invoke_tool(
        &self,
        _model: &ModelRef,
        _tool: &ToolDescriptor,
        _instruction: &str,
    ) -> Result<Value> {
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn run_timeout_is_a_run_level_failure() {
    let wf = workflow(
        vec![input_node("start"), llm_node("a")],
        vec![edge("e1", "start", "a")],
    );
    let graph = WorkflowGraph::compile(&wf).unwrap();
    let client = Arc::new(SlowClient);
    let engine = ExecutionEngine::new(Arc::new(NodeExecutor::new(client.clone(), client)));
    let result = engine
        .run(
            &graph,
            json!({}),
            RunOptions {
                timeout: std::time::Duration::from_millis(100),
                record_history: true,
            },
        )
        .await;

    assert!(!result.is_ok);
    assert!(result.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn history_recording_can_be_disabled() {
    let wf = workflow(
        vec![input_node("start"), output_node("out", vec![("echo", SourceKey::root("start"))])],
        vec![edge("e1", "start", "out")],
    );
    let graph = WorkflowGraph::compile(&wf).unwrap();
    let client = Arc::new(EchoClient::new());
    let result = engine_with(client)
        .run(
            &graph,
            json!({}),
            RunOptions {
                timeout: std::time::Duration::from_secs(30),
                record_history: false,
            },
        )
        .await;

    assert!(result.is_ok);
    assert!(result.histories.is_empty());
    assert_eq!(result.value, Some(json!({"echo": {}})));
}
