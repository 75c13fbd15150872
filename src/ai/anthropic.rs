//! Anthropic Messages backend.
//!
//! Wire differences from the OpenAI shape: `x-api-key` plus
//! `anthropic-version` headers instead of a bearer token, a top-level
//! `system` field, and content blocks — assistant tool calls arrive as
//! `tool_use` blocks and results go back as `tool_result` blocks inside a
//! user message.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ai::provider::{ChatProvider, ChatRequest, ProviderKind};
use crate::ai::{AiResponse, Role, StopReason, Usage};
use crate::credentials::CredentialResolver;
use crate::error::{ConnectorError, Result};
use crate::tools::adapters::parse_anthropic_tool_calls;
use crate::transport::{RetryingTransport, TransportRequest};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    base_url: String,
    resolver: Arc<CredentialResolver>,
    transport: Arc<RetryingTransport>,
}

impl AnthropicProvider {
    pub fn new(
        base_url: impl Into<String>,
        resolver: Arc<CredentialResolver>,
        transport: Arc<RetryingTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resolver,
            transport,
        }
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut messages = Vec::new();
        let mut system_parts: Vec<String> = request.system.iter().cloned().collect();

        for msg in &request.messages {
            match msg.role {
                // The Messages API takes system text at the top level only
                Role::System => system_parts.push(msg.content.clone()),
                Role::User => messages.push(json!({"role": "user", "content": msg.content})),
                Role::Assistant if !msg.tool_calls.is_empty() => {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": msg.content}));
                    }
                    for c in &msg.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": c.id.clone().unwrap_or_default(),
                            "name": c.name,
                            "input": c.arguments,
                        }));
                    }
                    messages.push(json!({"role": "assistant", "content": blocks}));
                }
                Role::Assistant => {
                    messages.push(json!({"role": "assistant", "content": msg.content}))
                }
                Role::Tool => messages.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.content,
                    }],
                })),
            }
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
        });
        if !system_parts.is_empty() {
            body["system"] = json!(system_parts.join("\n\n"));
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
        }
        body
    }
}

fn map_stop_reason(stop_reason: Option<&str>, has_calls: bool) -> StopReason {
    match stop_reason {
        Some("end_turn") | Some("stop_sequence") => StopReason::Stop,
        Some("tool_use") => StopReason::ToolCalls,
        Some("max_tokens") => StopReason::Length,
        Some(other) => StopReason::Other(other.to_string()),
        None if has_calls => StopReason::ToolCalls,
        None => StopReason::Stop,
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn chat(&self, request: &ChatRequest) -> Result<AiResponse> {
        let token = self.resolver.resolve("api_key")?;
        let req = TransportRequest::post(format!("{}/messages", self.base_url))
            .header("x-api-key", token.value())
            .header("anthropic-version", API_VERSION)
            .json(self.build_body(request));

        let resp = self.transport.execute(&req).await?;
        let payload: Value = resp.json()?;

        let content = payload
            .get("content")
            .ok_or_else(|| ConnectorError::Provider("response has no content".to_string()))?;

        let text = content
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let tool_calls = parse_anthropic_tool_calls(content);
        let stop_reason = payload.get("stop_reason").and_then(Value::as_str);

        Ok(AiResponse {
            content: text,
            stop_reason: map_stop_reason(stop_reason, !tool_calls.is_empty()),
            tool_calls,
            usage: Usage {
                input_tokens: payload
                    .pointer("/usage/input_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                output_tokens: payload
                    .pointer("/usage/output_tokens")
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
