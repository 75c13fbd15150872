//! Bounded tool-call loop.
//!
//! Drives a conversation until the model stops requesting tools or the
//! round-trip budget runs out. Tool calls execute sequentially in the
//! order the model requested them, and each result (or structured error)
//! is appended as a tool-role message before the loop re-enters. Tool
//! failures are data for the model to react to; only failures classified
//! fatal (missing credentials, broken configuration) abort the loop.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::ai::client::ChatClient;
use crate::ai::{AiMessage, AiResponse, Usage};
use crate::error::{ConnectorError, Result};
use crate::tools::registry::ToolRegistry;

const DEFAULT_MAX_ROUND_TRIPS: usize = 8;

pub struct ToolCallLoop {
    client: Arc<ChatClient>,
    registry: Arc<ToolRegistry>,
    max_round_trips: usize,
}

/// What a completed loop produced.
#[derive(Debug)]
pub struct LoopOutcome {
    /// The final model response (no tool calls outstanding).
    pub response: AiResponse,
    /// The full conversation, tool turns included.
    pub messages: Vec<AiMessage>,
    /// Model round trips consumed.
    pub round_trips: usize,
    /// Usage accumulated across every round trip.
    pub usage: Usage,
}

impl ToolCallLoop {
    pub fn new(client: Arc<ChatClient>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            registry,
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
        }
    }

    /// Overrides the round-trip budget. Must be at least 1.
    pub fn max_round_trips(mut self, budget: usize) -> Self {
        self.max_round_trips = budget.max(1);
        self
    }

    /// Runs the loop for one user prompt.
    pub async fn run(&self, prompt: &str, system: Option<&str>) -> Result<LoopOutcome> {
        self.run_messages(vec![AiMessage::user(prompt)], system).await
    }

    /// Runs the loop on an existing conversation.
    pub async fn run_messages(
        &self,
        mut messages: Vec<AiMessage>,
        system: Option<&str>,
    ) -> Result<LoopOutcome> {
        let mut usage = Usage::default();

        for round in 1..=self.max_round_trips {
            let response = self
                .client
                .chat_messages(messages.clone(), system.map(String::from), true)
                .await?;
            usage.add(response.usage);

            if !response.has_tool_calls() {
                info!(round_trips = round, "Tool loop complete");
                messages.push(AiMessage::assistant(response.content.clone()));
                return Ok(LoopOutcome {
                    messages,
                    round_trips: round,
                    usage,
                    response,
                });
            }

            messages.push(AiMessage::assistant_with_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            // Sequential, in the order the model requested
            for call in &response.tool_calls {
                let content = match self
                    .registry
                    .invoke(&call.name, &call.arguments, "agent")
                    .await
                {
                    Ok(result) => result.to_string(),
                    Err(e) if e.is_fatal() => {
                        return Err(ConnectorError::ToolLoopFatal(e.to_string()));
                    }
                    Err(e) => {
                        warn!(tool = %call.name, kind = %e.kind(), error = %e, "Tool call failed");
                        json!({"error": {"kind": e.kind(), "message": e.to_string()}}).to_string()
                    }
                };
                messages.push(AiMessage::tool(content, call.id.clone()));
            }
        }

        Err(ConnectorError::ToolLoopBudgetExceeded {
            budget: self.max_round_trips,
        })
    }
}
