//! Provider-agnostic chat types.
//!
//! Conversation history, responses, and token usage share one shape across
//! every backend; each provider module translates to and from its wire
//! format at the edge.

pub mod agent;
pub mod anthropic;
pub mod client;
pub mod ollama;
pub mod openai;
pub mod provider;

use serde::{Deserialize, Serialize};

use crate::tools::ToolCallRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// A tool execution result fed back into the conversation.
    Tool,
}

/// One conversation message.
#[derive(Clone, Debug)]
pub struct AiMessage {
    pub role: Role,
    pub content: String,
    /// Tool calls the assistant requested in this turn, if any.
    pub tool_calls: Vec<ToolCallRequest>,
    /// For `Role::Tool` messages: the provider call id being answered.
    pub tool_call_id: Option<String>,
}

impl AiMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant turn that requested tool calls.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Tool result answering the call with the given id.
    pub fn tool(content: impl Into<String>, call_id: Option<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: call_id,
        }
    }
}

/// Token usage, normalized across providers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Why the model stopped generating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Natural end of turn.
    Stop,
    /// The model requested tool calls.
    ToolCalls,
    /// Output token limit reached.
    Length,
    /// Provider-specific reason, carried verbatim.
    Other(String),
}

/// One model response, normalized.
#[derive(Clone, Debug)]
pub struct AiResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// Model identifier the provider reported.
    pub model: String,
}

impl AiResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
