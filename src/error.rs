//! Error taxonomy shared by every connector built on this crate.
//!
//! Deterministic failures (credentials, schema validation, configuration)
//! are never retried and surface immediately. Transient transport and
//! rate-limit failures are retried internally by `RetryingTransport` and
//! only reach the caller after the retry budget is exhausted, wrapped with
//! enough context (attempt count, elapsed time) to diagnose without
//! inspecting internal state.

use std::time::Duration;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ConnectorError>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    /// No configured source yielded a value for a required credential.
    #[error("credential '{0}' not found in any configured source")]
    CredentialNotFound(String),

    /// Fail-fast rate limit admission was denied.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Blocking rate limit admission gave up before tokens became available.
    #[error("timed out after {waited:?} waiting for rate limit tokens")]
    RateLimitTimeout { waited: Duration },

    /// The transport exhausted its retry budget (or hit a terminal failure).
    #[error("transport failed after {attempts} attempt(s) in {elapsed:?}: {message}")]
    Transport {
        attempts: u32,
        elapsed: Duration,
        message: String,
    },

    /// A response body could not be decoded into the expected shape.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// Tool arguments failed schema validation; the handler was not invoked.
    #[error("invalid arguments for tool '{tool}': {message}")]
    ToolArgument { tool: String, message: String },

    /// A tool was requested that no connector has registered.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// Registration would shadow an existing namespaced tool name.
    #[error("tool '{0}' is already registered")]
    DuplicateToolName(String),

    /// The tool-call loop hit its round-trip ceiling without terminating.
    #[error("tool loop exceeded its budget of {budget} round trip(s)")]
    ToolLoopBudgetExceeded { budget: usize },

    /// A tool execution failure classified as unrecoverable by the loop.
    #[error("tool loop aborted: {0}")]
    ToolLoopFatal(String),

    /// Vendor application error returned with a successful transport status.
    #[error("{connector} API error (status {status}): {message}")]
    Api {
        connector: String,
        status: u16,
        message: String,
    },

    /// Invalid or unrecognized configuration, rejected at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// An LLM provider call failed.
    #[error("provider error: {0}")]
    Provider(String),
}

impl ConnectorError {
    /// Stable machine-readable kind, used by the RPC surface and by
    /// tool-result error payloads fed back to the model.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectorError::CredentialNotFound(_) => "credential_not_found",
            ConnectorError::RateLimitExceeded => "rate_limit_exceeded",
            ConnectorError::RateLimitTimeout { .. } => "rate_limit_timeout",
            ConnectorError::Transport { .. } => "transport_error",
            ConnectorError::Decode(_) => "decode_error",
            ConnectorError::ToolArgument { .. } => "tool_argument_error",
            ConnectorError::UnknownTool(_) => "unknown_tool",
            ConnectorError::DuplicateToolName(_) => "duplicate_tool_name",
            ConnectorError::ToolLoopBudgetExceeded { .. } => "tool_loop_budget_exceeded",
            ConnectorError::ToolLoopFatal(_) => "tool_loop_fatal",
            ConnectorError::Api { .. } => "api_error",
            ConnectorError::Config(_) => "config_error",
            ConnectorError::Provider(_) => "provider_error",
        }
    }

    /// Whether a tool execution failure should abort the tool-call loop
    /// instead of being surfaced to the model as data.
    ///
    /// Credential and configuration failures are deterministic — the model
    /// cannot recover from them by retrying with different arguments.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectorError::CredentialNotFound(_) | ConnectorError::Config(_)
        )
    }
}
