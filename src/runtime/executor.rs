/// Node execution handlers for the six node kinds
///
/// Contains the execution logic for each node kind, selected by an
/// exhaustive match over the kind tag:
/// - Input: returns the trigger payload unchanged
/// - Output: assembles the run's final result object
/// - LLM: renders templated messages and calls the model capability
/// - Tool: renders one message and calls the tool capability
/// - Condition: selects the first matching branch id
/// - Note: never executed (excluded from the compiled graph)

use crate::llm::{ChatMessage, ModelClient, ToolInvoker};
use crate::runtime::condition::check_branch;
use crate::runtime::state::RuntimeState;
use crate::workflow::types::{
    ConditionBranch, MessagePart, NodeConfig, SourceKey, TemplateMessage, WorkflowNode,
};
use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Result of executing a single node
///
/// Plain nodes produce a value that is written into runtime state; a
/// condition node produces a branch selector consumed by the graph
/// engine for dynamic routing.
#[derive(Debug, Clone)]
pub enum NodeOutput {
    /// Output value, stored at `outputs[node_id]`
    Value(Value),
    /// Selected branch id, or `None` when no branch matched
    Branch(Option<String>),
}

/// Node executor holding the external capabilities
///
/// Dispatches execution to the appropriate handler based on the node's
/// kind tag. Pure with respect to runtime state: reads accessible state,
/// returns an output, and the engine owns all state writes.
pub struct NodeExecutor {
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolInvoker>,
}

impl NodeExecutor {
    pub fn new(model: Arc<dyn ModelClient>, tools: Arc<dyn ToolInvoker>) -> Self {
        Self { model, tools }
    }

    /// Execute a single node against the current run state
    pub async fn execute(&self, node: &WorkflowNode, state: &RuntimeState) -> Result<NodeOutput> {
        tracing::debug!("🚀 Executing node: {} (kind: {})", node.id, node.kind().as_str());

        match &node.config {
            NodeConfig::Input { .. } => Ok(NodeOutput::Value(state.query().clone())),

            NodeConfig::Output { output_data } => {
                let mut result = Map::new();
                for mapping in output_data {
                    let value = state.get_output(&mapping.source).unwrap_or(Value::Null);
                    result.insert(mapping.key.clone(), value);
                }
                Ok(NodeOutput::Value(Value::Object(result)))
            }

            NodeConfig::Llm { model, messages } => {
                let rendered: Vec<ChatMessage> = messages
                    .iter()
                    .map(|message| render_message(message, state))
                    .collect();
                let text = self.model.generate_text(model, &rendered).await?;
                Ok(NodeOutput::Value(json!({ "answer": parse_generated(&text) })))
            }

            NodeConfig::Tool { model, tool, message } => {
                let rendered = render_message(message, state);
                let result = self.tools.invoke_tool(model, tool, &rendered.content).await?;
                Ok(NodeOutput::Value(json!({ "tool_result": result })))
            }

            NodeConfig::Condition { if_branch, else_if, else_branch } => {
                let selected = select_branch(if_branch, else_if, else_branch.as_ref(), state);
                tracing::debug!(
                    "🔀 Condition {} selected branch: {:?}",
                    node.id,
                    selected
                );
                Ok(NodeOutput::Branch(selected))
            }

            NodeConfig::Note { .. } => {
                Err(anyhow!("note node '{}' is not executable", node.id))
            }
        }
    }
}

/// Evaluate branches in fixed order: if, each elseIf in declaration
/// order, else last; first match wins
fn select_branch(
    if_branch: &ConditionBranch,
    else_if: &[ConditionBranch],
    else_branch: Option<&ConditionBranch>,
    state: &RuntimeState,
) -> Option<String> {
    let resolve = |key: &SourceKey| state.get_output(key);

    std::iter::once(if_branch)
        .chain(else_if.iter())
        .chain(else_branch)
        .find(|branch| check_branch(branch, resolve))
        .map(|branch| branch.id.clone())
}

/// Render a templated message into plain text
///
/// Literal segments are concatenated as-is. Mention values are inlined:
/// objects and arrays as a pretty-printed fenced JSON block, scalars in
/// backticks. Unresolved mentions render as `null`.
fn render_message(message: &TemplateMessage, state: &RuntimeState) -> ChatMessage {
    let mut content = String::new();
    for part in &message.parts {
        match part {
            MessagePart::Text { text } => content.push_str(text),
            MessagePart::Mention { node_id, path } => {
                let key = SourceKey::new(node_id.clone(), path.clone());
                content.push_str(&render_mention(state.get_output(&key)));
            }
        }
    }
    ChatMessage::new(message.role, content)
}

fn render_mention(value: Option<Value>) -> String {
    match value {
        Some(value @ (Value::Object(_) | Value::Array(_))) => {
            let pretty = serde_json::to_string_pretty(&value)
                .unwrap_or_else(|_| value.to_string());
            format!("\n```json\n{}\n```\n", pretty)
        }
        Some(Value::String(s)) => format!("`{}`", s),
        Some(scalar) => format!("`{}`", scalar),
        None => "`null`".to_string(),
    }
}

/// Interpret generated text: JSON (optionally inside a ```json fence)
/// becomes structured output, anything else stays a plain string
fn parse_generated(text: &str) -> Value {
    let trimmed = text.trim();
    let candidate = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::String(text.to_string()),
    }
}
