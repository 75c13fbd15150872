//! Provider-agnostic chat client.
//!
//! Maps a configured `ProviderKind` to a concrete backend at construction,
//! attaches registry tools in the backend's declaration shape, and
//! normalizes everything else. The client only carries conversations; it
//! never executes tools — that is the agent loop's job.

use std::sync::Arc;

use tracing::info;

use crate::ai::anthropic::AnthropicProvider;
use crate::ai::ollama::OllamaProvider;
use crate::ai::openai::OpenAiProvider;
use crate::ai::provider::{ChatProvider, ChatRequest, ProviderKind};
use crate::ai::{AiMessage, AiResponse};
use crate::config::Settings;
use crate::credentials::{CredentialResolver, CredentialSpec};
use crate::error::Result;
use crate::rate_limit::RateLimiter;
use crate::tools::adapters::{anthropic_tools, openai_tools};
use crate::tools::registry::ToolRegistry;
use crate::transport::RetryingTransport;

/// A chat client bound to one provider and model.
pub struct ChatClient {
    kind: ProviderKind,
    provider: Arc<dyn ChatProvider>,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
    registry: Option<Arc<ToolRegistry>>,
}

impl ChatClient {
    /// Builds the configured backend, resolving its API key through the
    /// standard source order (vendor env vars like `ANTHROPIC_API_KEY`
    /// included as aliases).
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let kind = settings.provider;
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| kind.default_base_url().to_string());
        let limiter = Arc::new(RateLimiter::new(settings.rate_limit_config()));
        let transport = Arc::new(RetryingTransport::new(
            kind.as_str(),
            limiter,
            settings.retry_policy(),
        ));

        let provider: Arc<dyn ChatProvider> = match kind {
            ProviderKind::OpenAi | ProviderKind::Xai => Arc::new(OpenAiProvider::new(
                kind,
                base_url,
                Arc::new(api_key_resolver(kind)),
                transport,
            )),
            ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
                base_url,
                Arc::new(api_key_resolver(kind)),
                transport,
            )),
            ProviderKind::Ollama => Arc::new(OllamaProvider::new(base_url, transport)),
        };

        let model = settings.resolved_model();
        info!(provider = %kind, model = %model, "Chat client initialized");
        Ok(Self {
            kind,
            provider,
            model,
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            registry: None,
        })
    }

    /// Construction with an externally built backend. Tests use this to
    /// substitute a scripted provider.
    pub fn with_provider(provider: Arc<dyn ChatProvider>, settings: &Settings) -> Self {
        Self {
            kind: provider.kind(),
            provider,
            model: settings.resolved_model(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            registry: None,
        }
    }

    /// Attaches a tool registry; subsequent requests advertise its tools.
    pub fn with_tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn registry(&self) -> Option<&Arc<ToolRegistry>> {
        self.registry.as_ref()
    }

    /// Sends one user message on top of existing history.
    pub async fn chat(
        &self,
        message: &str,
        history: &[AiMessage],
        system: Option<&str>,
        use_tools: bool,
    ) -> Result<AiResponse> {
        let mut messages = history.to_vec();
        messages.push(AiMessage::user(message));
        self.chat_messages(messages, system.map(String::from), use_tools)
            .await
    }

    /// Sends a fully assembled message list.
    pub async fn chat_messages(
        &self,
        messages: Vec<AiMessage>,
        system: Option<String>,
        use_tools: bool,
    ) -> Result<AiResponse> {
        let tools = if use_tools {
            self.tool_declarations()
        } else {
            Vec::new()
        };
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            system,
            tools,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        };
        self.provider.chat(&request).await
    }

    /// One-shot prompt with no history.
    pub async fn invoke(&self, prompt: &str, use_tools: bool) -> Result<AiResponse> {
        self.chat(prompt, &[], None, use_tools).await
    }

    /// Registry tools in the backend's declaration shape. Empty when no
    /// registry is attached.
    pub fn tool_declarations(&self) -> Vec<serde_json::Value> {
        let Some(registry) = &self.registry else {
            return Vec::new();
        };
        match self.kind {
            // Ollama accepts the OpenAI function-tool shape
            ProviderKind::OpenAi | ProviderKind::Xai | ProviderKind::Ollama => {
                openai_tools(registry)
            }
            ProviderKind::Anthropic => anthropic_tools(registry),
        }
    }
}

fn api_key_resolver(kind: ProviderKind) -> CredentialResolver {
    let spec = match kind {
        ProviderKind::OpenAi => CredentialSpec::required("api_key").env_alias("OPENAI_API_KEY"),
        ProviderKind::Anthropic => {
            CredentialSpec::required("api_key").env_alias("ANTHROPIC_API_KEY")
        }
        ProviderKind::Xai => CredentialSpec::required("api_key").env_alias("XAI_API_KEY"),
        ProviderKind::Ollama => CredentialSpec::optional("api_key"),
    };
    CredentialResolver::new(kind.as_str()).declare(spec)
}
