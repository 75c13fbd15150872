//! Framework adapters: projections of a registry snapshot.
//!
//! Each projection is a pure function of the tools registered at the time
//! it is built; after later registrations the caller rebuilds it. Three
//! shapes are supported: generic callables for host applications, provider
//! tool declarations for chat requests, and parsers turning provider
//! tool-call directives back into invocable requests.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::Result;
use crate::tools::registry::ToolRegistry;
use crate::tools::ToolCallRequest;

/// A registry tool exposed as a generic callable: name, description,
/// schema, and an `invoke` that validates and executes through the
/// registry.
#[derive(Clone)]
pub struct CallableTool {
    name: String,
    description: String,
    schema: Value,
    registry: Arc<ToolRegistry>,
}

impl CallableTool {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub async fn invoke(&self, arguments: &Value) -> Result<Value> {
        self.registry.invoke(&self.name, arguments, "callable").await
    }
}

/// Projects every registered tool as a generic callable, sorted by name.
pub fn callable_tools(registry: &Arc<ToolRegistry>) -> Vec<CallableTool> {
    registry
        .list()
        .into_iter()
        .map(|tool| CallableTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            schema: tool.schema.to_json_schema(),
            registry: Arc::clone(registry),
        })
        .collect()
}

/// Tool declarations in the OpenAI chat-completions `tools` shape.
pub fn openai_tools(registry: &ToolRegistry) -> Vec<Value> {
    registry
        .list()
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.schema.to_json_schema(),
                }
            })
        })
        .collect()
}

/// Tool declarations in the Anthropic Messages `tools` shape.
pub fn anthropic_tools(registry: &ToolRegistry) -> Vec<Value> {
    registry
        .list()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.schema.to_json_schema(),
            })
        })
        .collect()
}

/// Extracts tool calls from an OpenAI-style assistant message.
///
/// The `function.arguments` field arrives as a JSON-encoded string; a body
/// that fails to parse is carried as-is under a `"_raw"` key so validation
/// can reject it with a useful message instead of dropping the call.
pub fn parse_openai_tool_calls(message: &Value) -> Vec<ToolCallRequest> {
    let Some(calls) = message.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|call| {
            let function = call.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let raw = function
                .get("arguments")
                .and_then(Value::as_str)
                .unwrap_or("{}");
            let arguments = serde_json::from_str(raw)
                .unwrap_or_else(|_| json!({ "_raw": raw }));
            Some(ToolCallRequest {
                id: call.get("id").and_then(Value::as_str).map(String::from),
                name,
                arguments,
            })
        })
        .collect()
}

/// Extracts tool calls from Anthropic Messages content blocks
/// (`type: "tool_use"`).
pub fn parse_anthropic_tool_calls(content: &Value) -> Vec<ToolCallRequest> {
    let Some(blocks) = content.as_array() else {
        return Vec::new();
    };
    blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
        .filter_map(|block| {
            Some(ToolCallRequest {
                id: block.get("id").and_then(Value::as_str).map(String::from),
                name: block.get("name")?.as_str()?.to_string(),
                arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
            })
        })
        .collect()
}
