/// HTTP implementations of the model and tool capabilities
///
/// `HttpModelClient` speaks the OpenAI-compatible chat completions
/// protocol. `HttpToolInvoker` posts rendered instructions to the
/// external tool-server process and returns its structured JSON result.

use crate::llm::{ChatMessage, ModelClient, ToolInvoker};
use crate::workflow::types::{MessageRole, ModelRef, ToolDescriptor};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// OpenAI-compatible chat completions client
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpModelClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn generate_text(&self, model: &ModelRef, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "model": model.name,
            "messages": messages.iter().map(|m| json!({
                "role": role_str(m.role),
                "content": m.content,
            })).collect::<Vec<_>>(),
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        tracing::debug!("🌐 Model request: {} ({})", url, model.name);

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("model request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("model request returned {}: {}", status, detail));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("model response was not JSON: {}", e))?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("model response missing choices[0].message.content"))
    }
}

/// Client for the external tool-server process
///
/// The tool server owns argument derivation and tool execution; this
/// side only ships the model reference, the tool descriptor, and the
/// rendered instruction.
#[derive(Debug, Clone)]
pub struct HttpToolInvoker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpToolInvoker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke_tool(
        &self,
        model: &ModelRef,
        tool: &ToolDescriptor,
        instruction: &str,
    ) -> Result<Value> {
        let url = format!("{}/tools/call", self.base_url.trim_end_matches('/'));
        tracing::debug!("🔧 Tool request: {} ({})", url, tool.name);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "tool": tool.name,
                "model": model.name,
                "instruction": instruction,
            }))
            .send()
            .await
            .map_err(|e| anyhow!("tool request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("tool '{}' returned {}: {}", tool.name, status, detail));
        }

        response
            .json()
            .await
            .map_err(|e| anyhow!("tool response was not JSON: {}", e))
    }
}
