/// Echo capabilities for tests and unconfigured deployments
///
/// `EchoClient` answers with a canned response when one is set, otherwise
/// reflects the last user message back. Tool invocations return the
/// descriptor and instruction as a structured value. Call counts are
/// tracked so tests can assert execution counts.

use crate::llm::{ChatMessage, ModelClient, ToolInvoker};
use crate::workflow::types::{MessageRole, ModelRef, ToolDescriptor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct EchoClient {
    canned: Option<String>,
    calls: AtomicUsize,
}

impl EchoClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always respond with `response` instead of echoing
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            canned: Some(response.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of generate/invoke calls served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for EchoClient {
    async fn generate_text(&self, _model: &ModelRef, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(canned) = &self.canned {
            return Ok(canned.clone());
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .or_else(|| messages.last());
        Ok(last_user.map(|m| m.content.clone()).unwrap_or_default())
    }
}

#[async_trait]
impl ToolInvoker for EchoClient {
    async fn invoke_tool(
        &self,
        _model: &ModelRef,
        tool: &ToolDescriptor,
        instruction: &str,
    ) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "tool": tool.name,
            "instruction": instruction,
        }))
    }
}
