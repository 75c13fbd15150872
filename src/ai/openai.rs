//! OpenAI chat-completions backend.
//!
//! Also serves any OpenAI-compatible vendor (xAI, self-hosted gateways)
//! through a different base URL; only `kind()` and the credential differ.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ai::provider::{ChatProvider, ChatRequest, ProviderKind};
use crate::ai::{AiResponse, Role, StopReason, Usage};
use crate::credentials::CredentialResolver;
use crate::error::{ConnectorError, Result};
use crate::tools::adapters::parse_openai_tool_calls;
use crate::transport::{RetryingTransport, TransportRequest};

pub struct OpenAiProvider {
    kind: ProviderKind,
    base_url: String,
    resolver: Arc<CredentialResolver>,
    transport: Arc<RetryingTransport>,
}

impl OpenAiProvider {
    pub fn new(
        kind: ProviderKind,
        base_url: impl Into<String>,
        resolver: Arc<CredentialResolver>,
        transport: Arc<RetryingTransport>,
    ) -> Self {
        Self {
            kind,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resolver,
            transport,
        }
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for msg in &request.messages {
            match msg.role {
                Role::System => messages.push(json!({"role": "system", "content": msg.content})),
                Role::User => messages.push(json!({"role": "user", "content": msg.content})),
                Role::Assistant if !msg.tool_calls.is_empty() => {
                    let calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.id.clone().unwrap_or_default(),
                                "type": "function",
                                "function": {
                                    "name": c.name,
                                    "arguments": c.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    messages.push(json!({
                        "role": "assistant",
                        "content": msg.content,
                        "tool_calls": calls,
                    }));
                }
                Role::Assistant => {
                    messages.push(json!({"role": "assistant", "content": msg.content}))
                }
                Role::Tool => messages.push(json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content,
                })),
            }
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
        }
        body
    }
}

fn map_stop_reason(finish_reason: Option<&str>, has_calls: bool) -> StopReason {
    match finish_reason {
        Some("stop") => StopReason::Stop,
        Some("tool_calls") => StopReason::ToolCalls,
        Some("length") => StopReason::Length,
        Some(other) => StopReason::Other(other.to_string()),
        None if has_calls => StopReason::ToolCalls,
        None => StopReason::Stop,
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn chat(&self, request: &ChatRequest) -> Result<AiResponse> {
        let token = self.resolver.resolve("api_key")?;
        let req = TransportRequest::post(format!("{}/chat/completions", self.base_url))
            .bearer(token.value())
            .json(self.build_body(request));

        let resp = self.transport.execute(&req).await?;
        let payload: Value = resp.json()?;

        let message = payload
            .pointer("/choices/0/message")
            .ok_or_else(|| ConnectorError::Provider("response has no choices".to_string()))?;

        let tool_calls = parse_openai_tool_calls(message);
        let finish_reason = payload
            .pointer("/choices/0/finish_reason")
            .and_then(Value::as_str);

        Ok(AiResponse {
            content: message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            stop_reason: map_stop_reason(finish_reason, !tool_calls.is_empty()),
            tool_calls,
            usage: Usage {
                input_tokens: payload
                    .pointer("/usage/prompt_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                output_tokens: payload
                    .pointer("/usage/completion_tokens")
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiMessage;
    use crate::rate_limit::{AcquireMode, RateLimitConfig, RateLimiter};
    use crate::transport::{HttpSend, RetryPolicy, SendError, TransportResponse};
    use std::sync::Mutex;
    use std::time::Duration;

    struct CapturingSender {
        response: String,
        requests: Mutex<Vec<TransportRequest>>,
    }

    #[async_trait]
    impl HttpSend for CapturingSender {
        async fn send(
            &self,
            req: &TransportRequest,
        ) -> std::result::Result<TransportResponse, SendError> {
            self.requests.lock().unwrap().push(req.clone());
            Ok(TransportResponse {
                status: 200,
                body: self.response.clone(),
            })
        }
    }

    fn provider_with(response: &str) -> (OpenAiProvider, Arc<CapturingSender>) {
        let sender = Arc::new(CapturingSender {
            response: response.to_string(),
            requests: Mutex::new(Vec::new()),
        });
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            capacity: 100,
            refill_per_sec: 100.0,
            mode: AcquireMode::FailFast,
            block_timeout: Duration::from_secs(1),
        }));
        let transport = Arc::new(RetryingTransport::with_sender(
            "openai",
            Arc::clone(&sender) as Arc<dyn HttpSend>,
            limiter,
            RetryPolicy::default(),
        ));
        let resolver =
            Arc::new(CredentialResolver::new("openai").with_explicit("api_key", "sk-test"));
        (
            OpenAiProvider::new(ProviderKind::OpenAi, "https://api.openai.com/v1", resolver, transport),
            sender,
        )
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![AiMessage::user("hello")],
            system: Some("Be terse.".to_string()),
            tools: Vec::new(),
            temperature: 0.7,
            max_output_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_request_shape_and_auth() {
        let (provider, sender) = provider_with(
            r#"{"model":"gpt-4o-mini","choices":[{"message":{"content":"hi"},"finish_reason":"stop"}],"usage":{"prompt_tokens":9,"completion_tokens":1}}"#,
        );
        let resp = provider.chat(&request()).await.unwrap();
        assert_eq!(resp.content, "hi");
        assert_eq!(resp.stop_reason, StopReason::Stop);
        assert_eq!(resp.usage.input_tokens, 9);
        assert_eq!(resp.usage.output_tokens, 1);

        let captured = sender.requests.lock().unwrap();
        let req = &captured[0];
        assert_eq!(req.url, "https://api.openai.com/v1/chat/completions");
        assert!(req
            .headers
            .iter()
            .any(|(k, v)| k == "Authorization" && v == "Bearer sk-test"));
        let body = req.body.as_ref().unwrap();
        // System prompt prepended as a system-role message
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_tool_calls_parsed() {
        let (provider, _) = provider_with(
            r#"{"choices":[{"message":{"content":null,"tool_calls":[{"id":"call_1","type":"function","function":{"name":"acme_search","arguments":"{\"query\":\"x\"}"}}]},"finish_reason":"tool_calls"}],"usage":{"prompt_tokens":5,"completion_tokens":2}}"#,
        );
        let resp = provider.chat(&request()).await.unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolCalls);
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "acme_search");
        assert_eq!(resp.tool_calls[0].arguments["query"], "x");
    }

    #[tokio::test]
    async fn test_tool_result_messages_serialized() {
        let (provider, sender) = provider_with(
            r#"{"choices":[{"message":{"content":"done"},"finish_reason":"stop"}]}"#,
        );
        let mut req = request();
        req.messages.push(AiMessage::tool(
            "{\"sum\":5}",
            Some("call_1".to_string()),
        ));
        provider.chat(&req).await.unwrap();

        let captured = sender.requests.lock().unwrap();
        let body = captured[0].body.as_ref().unwrap();
        let tool_msg = &body["messages"][2];
        assert_eq!(tool_msg["role"], "tool");
        assert_eq!(tool_msg["tool_call_id"], "call_1");
    }

    #[tokio::test]
    async fn test_missing_choices_is_provider_error() {
        let (provider, _) = provider_with(r#"{"object":"error-ish"}"#);
        let err = provider.chat(&request()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Provider(_)));
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_send() {
        let (provider, sender) = provider_with("{}");
        let provider = OpenAiProvider::new(
            ProviderKind::Xai,
            "https://api.x.ai/v1",
            Arc::new(CredentialResolver::new("xai")),
            provider.transport,
        );
        let err = provider.chat(&request()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::CredentialNotFound(_)));
        assert!(sender.requests.lock().unwrap().is_empty());
    }
}
