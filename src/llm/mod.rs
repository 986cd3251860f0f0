/// External model and tool capabilities
///
/// The engine treats text generation and tool invocation as opaque
/// capabilities behind trait objects. This module defines the traits,
/// an OpenAI-compatible HTTP implementation, and an echo client used by
/// tests and as the unconfigured default.

use crate::workflow::types::{MessageRole, ModelRef, ToolDescriptor};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod echo;
pub mod http;

pub use echo::EchoClient;
pub use http::{HttpModelClient, HttpToolInvoker};

/// A fully rendered chat message ready for a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// "Generate text from messages given a model reference"
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate_text(&self, model: &ModelRef, messages: &[ChatMessage]) -> Result<String>;
}

/// "Invoke a named tool with a rendered instruction, given a model
/// reference" — the tool server derives arguments and returns the tool's
/// structured result
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke_tool(
        &self,
        model: &ModelRef,
        tool: &ToolDescriptor,
        instruction: &str,
    ) -> Result<Value>;
}
