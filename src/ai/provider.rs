//! The `ChatProvider` seam and provider selection.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::{AiMessage, AiResponse};
use crate::error::{ConnectorError, Result};

/// Which backend serves chat requests. A runtime configuration value, not
/// a compile-time choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Ollama,
    /// xAI speaks the OpenAI wire format at its own endpoint.
    Xai,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Xai => "xai",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
            ProviderKind::Ollama => "llama3.2",
            ProviderKind::Xai => "grok-2-latest",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::Xai => "https://api.x.ai/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "ollama" => Ok(ProviderKind::Ollama),
            "xai" => Ok(ProviderKind::Xai),
            other => Err(ConnectorError::Config(format!(
                "unknown provider '{}' (expected openai, anthropic, ollama, or xai)",
                other
            ))),
        }
    }
}

/// One chat request, already normalized. `tools` carries provider-shaped
/// tool declarations built by the adapters module.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<AiMessage>,
    pub system: Option<String>,
    pub tools: Vec<Value>,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

/// A chat backend. Implementations translate to their wire format, send
/// through the retrying transport, and normalize the response.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn chat(&self, request: &ChatRequest) -> Result<AiResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trips_from_str() {
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Ollama,
            ProviderKind::Xai,
        ] {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let err = "gemini".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }
}
