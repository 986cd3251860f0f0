/// Core workflow type definitions
///
/// Defines the fundamental structures for workflows, nodes, and edges.
/// Node behavior is carried by a kind-tagged config union so the runtime
/// can dispatch executors with an exhaustive match. These types are
/// serialized/deserialized from JSON for persistence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete workflow definition containing nodes and their connections
///
/// Workflows are stored as JSON in SQLite and compiled into petgraph DAGs
/// for execution. Only published workflows are runnable; the owner id is
/// attached to scheduled trigger payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-daily-digest")
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    /// Workflow description for documentation
    #[serde(default)]
    pub description: String,
    /// Owner user id, forwarded into scheduled trigger payloads
    pub owner_id: String,
    /// Whether this workflow is published (runnable and schedulable)
    #[serde(default)]
    pub published: bool,
    /// Monotonic version, bumped on every save
    #[serde(default)]
    pub version: u32,
    /// List of nodes in this workflow
    pub nodes: Vec<WorkflowNode>,
    /// List of edges connecting nodes
    pub edges: Vec<Edge>,
}

/// A single node in the workflow DAG
///
/// Node names must be unique within a workflow, except for Note nodes
/// which are annotations and never execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique node identifier within the workflow (e.g., "n1", "summarize")
    pub id: String,
    /// Display name, unique per workflow (Note nodes exempt)
    pub name: String,
    /// Node description for documentation
    #[serde(default)]
    pub description: String,
    /// Nested object schema describing the shape of this node's output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Editor-only presentation data (position etc.); opaque to the runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_config: Option<Value>,
    /// Kind-specific configuration; carries the node kind tag
    pub config: NodeConfig,
}

impl WorkflowNode {
    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }
}

/// Node kinds understood by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Input,
    Output,
    Llm,
    Tool,
    Condition,
    Note,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Llm => "llm",
            NodeKind::Tool => "tool",
            NodeKind::Condition => "condition",
            NodeKind::Note => "note",
        }
    }
}

/// Kind-tagged node configuration union
///
/// The `kind` tag selects the executor at runtime. Adding a node kind
/// means adding a variant here and an arm in the executor dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeConfig {
    /// Workflow trigger parameters; the single entry point of a workflow.
    /// An attached schedule makes the workflow eligible for cron dispatch
    /// once published.
    Input {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schedule: Option<ScheduleTrigger>,
    },

    /// Maps selected upstream values to final result keys; the assembled
    /// object is the run's return value.
    Output { output_data: Vec<OutputMapping> },

    /// Templated chat messages sent to an external model
    Llm {
        model: ModelRef,
        messages: Vec<TemplateMessage>,
    },

    /// Single templated message driving a named tool invocation
    Tool {
        model: ModelRef,
        tool: ToolDescriptor,
        message: TemplateMessage,
    },

    /// if / elseIf* / else branch set evaluated in fixed order
    Condition {
        if_branch: ConditionBranch,
        #[serde(default)]
        else_if: Vec<ConditionBranch>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_branch: Option<ConditionBranch>,
    },

    /// Non-executable annotation, excluded from the compiled graph
    Note {
        #[serde(default)]
        text: String,
    },
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Input { .. } => NodeKind::Input,
            NodeConfig::Output { .. } => NodeKind::Output,
            NodeConfig::Llm { .. } => NodeKind::Llm,
            NodeConfig::Tool { .. } => NodeKind::Tool,
            NodeConfig::Condition { .. } => NodeKind::Condition,
            NodeConfig::Note { .. } => NodeKind::Note,
        }
    }
}

/// Cron trigger attached to an Input node
///
/// Publishing a workflow whose Input node carries a schedule creates a
/// `workflow_schedules` row for the poll-based dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTrigger {
    /// Standard 5-field cron expression (e.g., "0 * * * *")
    pub cron: String,
    /// IANA timezone string the cron fields are interpreted in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Stored payload merged into each scheduled trigger payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// One `{key, source}` pair of an Output node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMapping {
    /// Key in the final result object
    pub key: String,
    /// Upstream value this key resolves to
    pub source: SourceKey,
}

/// Reference into another node's output by node id and nested path
///
/// Used both for end-of-workflow output mapping and for inter-node value
/// substitution ("mentions") inside LLM/Tool message templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceKey {
    pub node_id: String,
    #[serde(default)]
    pub path: Vec<String>,
}

impl SourceKey {
    pub fn new(node_id: impl Into<String>, path: Vec<String>) -> Self {
        Self { node_id: node_id.into(), path }
    }

    /// Reference to a node's whole output (empty path)
    pub fn root(node_id: impl Into<String>) -> Self {
        Self { node_id: node_id.into(), path: Vec::new() }
    }
}

/// Reference to an external model (provider routing is the model client's
/// concern, not the engine's)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRef {
    /// Model name understood by the provider (e.g., "gpt-4.1-mini")
    pub name: String,
    /// Optional provider hint (e.g., "openai")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Descriptor of a named tool exposed by the external tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name (e.g., "web-search", "create-issue")
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's arguments, if declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// A templated chat message: literal text segments interleaved with
/// mentions of upstream node outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMessage {
    #[serde(default = "default_role")]
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
}

fn default_role() -> MessageRole {
    MessageRole::User
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One segment of a templated message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePart {
    /// Literal text, concatenated as-is
    Text { text: String },
    /// Inline reference to an upstream node's output
    Mention {
        node_id: String,
        #[serde(default)]
        path: Vec<String>,
    },
}

/// One branch of a Condition node
///
/// Else branches carry no conditions and always match when reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionBranch {
    /// Branch id; doubles as the branch label on outgoing edges
    /// ("if", "else", or an elseIf id)
    pub id: String,
    #[serde(rename = "type")]
    pub branch_type: BranchType,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub conditions: Vec<ConditionRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BranchType {
    If,
    ElseIf,
    Else,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// A single typed comparison inside a condition branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRule {
    /// Value under test, resolved from runtime state
    pub source: SourceKey,
    pub operator: ConditionOperator,
    /// Literal right-hand side; absent for unary operators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Comparison operators, partitioned by value type
///
/// String: equals, not_equals, contains, not_contains, starts_with,
/// ends_with, is_empty, is_not_empty. Number: equals, not_equals,
/// greater_than, less_than, greater_than_or_equal, less_than_or_equal.
/// Boolean: is_true, is_false. Equals/not_equals compare numerically when
/// both sides coerce to numbers, otherwise as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    IsTrue,
    IsFalse,
}

/// Connection between two nodes in the workflow DAG
///
/// `ui_config.source_handle` (falling back to `label`) carries the branch
/// label used for condition routing; edges out of non-condition nodes
/// have no branch label and are always followed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge identifier
    pub id: String,
    /// Source node ID
    pub source: String,
    /// Target node ID
    pub target: String,
    #[serde(default)]
    pub ui_config: EdgeUiConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeUiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Branch label this edge is taken under, if any
    pub fn branch_label(&self) -> Option<&str> {
        self.ui_config
            .source_handle
            .as_deref()
            .or(self.ui_config.label.as_deref())
    }
}
