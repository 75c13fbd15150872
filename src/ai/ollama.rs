//! Ollama native chat backend.
//!
//! Talks to a local daemon at `/api/chat` with `stream: false`. No
//! credential is required. Tool calls come back with `arguments` already
//! as a JSON object (unlike the OpenAI string encoding), and usage is
//! reported as `prompt_eval_count` / `eval_count`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ai::provider::{ChatProvider, ChatRequest, ProviderKind};
use crate::ai::{AiResponse, Role, StopReason, Usage};
use crate::error::{ConnectorError, Result};
use crate::tools::ToolCallRequest;
use crate::transport::{RetryingTransport, TransportRequest};

pub struct OllamaProvider {
    base_url: String,
    transport: Arc<RetryingTransport>,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, transport: Arc<RetryingTransport>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
        }
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for msg in &request.messages {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let mut entry = json!({"role": role, "content": msg.content});
            if !msg.tool_calls.is_empty() {
                let calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|c| json!({"function": {"name": c.name, "arguments": c.arguments}}))
                    .collect();
                entry["tool_calls"] = Value::Array(calls);
            }
            messages.push(entry);
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_output_tokens,
            },
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
        }
        body
    }
}

fn parse_tool_calls(message: &Value) -> Vec<ToolCallRequest> {
    let Some(calls) = message.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|call| {
            let function = call.get("function")?;
            Some(ToolCallRequest {
                id: None,
                name: function.get("name")?.as_str()?.to_string(),
                arguments: function.get("arguments").cloned().unwrap_or_else(|| json!({})),
            })
        })
        .collect()
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn chat(&self, request: &ChatRequest) -> Result<AiResponse> {
        let req = TransportRequest::post(format!("{}/api/chat", self.base_url))
            .json(self.build_body(request));

        let resp = self.transport.execute(&req).await?;
        let payload: Value = resp.json()?;

        let message = payload
            .get("message")
            .ok_or_else(|| ConnectorError::Provider("response has no message".to_string()))?;

        let tool_calls = parse_tool_calls(message);
        let stop_reason = match payload.get("done_reason").and_then(Value::as_str) {
            _ if !tool_calls.is_empty() => StopReason::ToolCalls,
            Some("stop") | None => StopReason::Stop,
            Some("length") => StopReason::Length,
            Some(other) => StopReason::Other(other.to_string()),
        };

        Ok(AiResponse {
            content: message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            stop_reason,
            tool_calls,
            usage: Usage {
                input_tokens: payload
                    .get("prompt_eval_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                output_tokens: payload
                    .get("eval_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
            },
            model: payload
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&request.model)
                .to_string(),
        })
    }
}
