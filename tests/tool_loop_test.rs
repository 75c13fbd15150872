// Integration tests for the agent loop over a scripted provider.
//
// The provider replays a canned multi-step plan, so the loop's message
// assembly, sequential tool execution, and budget accounting are
// exercised together with the registry and client.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use vendor_connectors::ai::agent::ToolCallLoop;
use vendor_connectors::ai::client::ChatClient;
use vendor_connectors::ai::provider::{ChatProvider, ChatRequest, ProviderKind};
use vendor_connectors::ai::{AiResponse, Role, StopReason, Usage};
use vendor_connectors::config::Settings;
use vendor_connectors::error::{ConnectorError, Result};
use vendor_connectors::tools::handler_fn;
use vendor_connectors::tools::schema::{ParamSpec, ParamType, ToolSchema};
use vendor_connectors::tools::ToolCallRequest;
use vendor_connectors::ToolRegistry;

// ── Scripted provider ─────────────────────────────────────────────────────────

struct ScriptedProvider {
    script: Mutex<Vec<AiResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(mut script: Vec<AiResponse>) -> Arc<Self> {
        script.reverse();
        Arc::new(Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn chat(&self, request: &ChatRequest) -> Result<AiResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ConnectorError::Provider("script exhausted".to_string()))
    }
}

fn text(content: &str) -> AiResponse {
    AiResponse {
        content: content.to_string(),
        tool_calls: Vec::new(),
        stop_reason: StopReason::Stop,
        usage: Usage {
            input_tokens: 20,
            output_tokens: 10,
        },
        model: "scripted".to_string(),
    }
}

fn calls(requested: Vec<(&str, &str, Value)>) -> AiResponse {
    AiResponse {
        content: String::new(),
        tool_calls: requested
            .into_iter()
            .map(|(id, name, arguments)| ToolCallRequest {
                id: Some(id.to_string()),
                name: name.to_string(),
                arguments,
            })
            .collect(),
        stop_reason: StopReason::ToolCalls,
        usage: Usage {
            input_tokens: 20,
            output_tokens: 10,
        },
        model: "scripted".to_string(),
    }
}

// ── Registry: a small file-cabinet connector ──────────────────────────────────

fn cabinet_registry() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    let store: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));

    let write_store = Arc::clone(&store);
    registry
        .register(
            "cabinet",
            "put",
            "Stores a note under a key",
            ToolSchema::new(vec![
                ParamSpec::required("key", ParamType::String, "Note key"),
                ParamSpec::required("text", ParamType::String, "Note body"),
            ]),
            handler_fn(move |args| {
                let store = Arc::clone(&write_store);
                async move {
                    let key = args["key"].as_str().unwrap_or_default().to_string();
                    let text = args["text"].as_str().unwrap_or_default().to_string();
                    store.lock().unwrap().push((key.clone(), text));
                    Ok(json!({"stored": key}))
                }
            }),
        )
        .unwrap();

    let read_store = Arc::clone(&store);
    registry
        .register(
            "cabinet",
            "get",
            "Reads a note by key",
            ToolSchema::new(vec![ParamSpec::required(
                "key",
                ParamType::String,
                "Note key",
            )]),
            handler_fn(move |args| {
                let store = Arc::clone(&read_store);
                async move {
                    let key = args["key"].as_str().unwrap_or_default();
                    let found = store
                        .lock()
                        .unwrap()
                        .iter()
                        .rev()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.clone());
                    match found {
                        Some(text) => Ok(json!({"text": text})),
                        None => Err(ConnectorError::Api {
                            connector: "cabinet".to_string(),
                            status: 404,
                            message: format!("no note '{}'", key),
                        }),
                    }
                }
            }),
        )
        .unwrap();

    Arc::new(registry)
}

fn agent_with(script: Vec<AiResponse>) -> (ToolCallLoop, Arc<ScriptedProvider>) {
    let provider = ScriptedProvider::new(script);
    let registry = cabinet_registry();
    let client = Arc::new(
        ChatClient::with_provider(
            Arc::clone(&provider) as Arc<dyn ChatProvider>,
            &Settings::default(),
        )
        .with_tools(Arc::clone(&registry)),
    );
    (ToolCallLoop::new(client, registry), provider)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_multi_step_plan_executes_in_model_order() {
    let (agent, provider) = agent_with(vec![
        calls(vec![
            ("call_a", "cabinet_put", json!({"key": "plan", "text": "step one"})),
            ("call_b", "cabinet_get", json!({"key": "plan"})),
        ]),
        text("your plan says: step one"),
    ]);

    let outcome = agent.run("remember then recall", None).await.unwrap();
    assert_eq!(outcome.round_trips, 2);
    assert_eq!(outcome.response.content, "your plan says: step one");

    // Second request: user, assistant-with-calls, then two tool results in
    // the order the model asked for them
    let captured = provider.requests.lock().unwrap();
    let msgs = &captured[1].messages;
    assert_eq!(msgs[0].role, Role::User);
    assert_eq!(msgs[1].role, Role::Assistant);
    assert_eq!(msgs[2].tool_call_id.as_deref(), Some("call_a"));
    assert_eq!(msgs[3].tool_call_id.as_deref(), Some("call_b"));
    // The get ran after the put, so it saw the stored note
    assert!(msgs[3].content.contains("step one"));
}

#[tokio::test]
async fn test_tools_advertised_on_every_round_trip() {
    let (agent, provider) = agent_with(vec![
        calls(vec![("c1", "cabinet_put", json!({"key": "k", "text": "v"}))]),
        text("done"),
    ]);
    agent.run("store it", None).await.unwrap();

    let captured = provider.requests.lock().unwrap();
    for request in captured.iter() {
        assert_eq!(request.tools.len(), 2);
        assert_eq!(request.tools[0]["function"]["name"], "cabinet_get");
    }
}

#[tokio::test]
async fn test_failed_tool_surfaces_as_error_payload() {
    let (agent, provider) = agent_with(vec![
        calls(vec![("c1", "cabinet_get", json!({"key": "absent"}))]),
        text("nothing stored under that key"),
    ]);
    let outcome = agent.run("what's under 'absent'?", None).await.unwrap();
    assert_eq!(outcome.round_trips, 2);

    let captured = provider.requests.lock().unwrap();
    let payload: Value = serde_json::from_str(&captured[1].messages[2].content).unwrap();
    assert_eq!(payload["error"]["kind"], "api_error");
    assert!(payload["error"]["message"].as_str().unwrap().contains("absent"));
}

#[tokio::test]
async fn test_budget_enforced_across_rounds() {
    let (agent, provider) = agent_with(vec![
        calls(vec![("c1", "cabinet_put", json!({"key": "a", "text": "1"}))]),
        calls(vec![("c2", "cabinet_put", json!({"key": "b", "text": "2"}))]),
        calls(vec![("c3", "cabinet_put", json!({"key": "c", "text": "3"}))]),
    ]);
    let agent = agent.max_round_trips(3);

    let err = agent.run("never stop", None).await.unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::ToolLoopBudgetExceeded { budget: 3 }
    ));
    assert_eq!(provider.requests.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_usage_accumulates_across_rounds() {
    let (agent, _) = agent_with(vec![
        calls(vec![("c1", "cabinet_put", json!({"key": "k", "text": "v"}))]),
        text("done"),
    ]);
    let outcome = agent.run("store it", None).await.unwrap();
    assert_eq!(outcome.usage.input_tokens, 40);
    assert_eq!(outcome.usage.output_tokens, 20);
}

#[tokio::test]
async fn test_system_prompt_carried_every_round() {
    let (agent, provider) = agent_with(vec![
        calls(vec![("c1", "cabinet_put", json!({"key": "k", "text": "v"}))]),
        text("done"),
    ]);
    agent.run("store it", Some("be careful")).await.unwrap();

    let captured = provider.requests.lock().unwrap();
    for request in captured.iter() {
        assert_eq!(request.system.as_deref(), Some("be careful"));
    }
}
