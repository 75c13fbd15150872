//! Externally supplied configuration.
//!
//! Settings load from a TOML string/file or from `VC_`-prefixed
//! environment variables. Unknown keys are a hard error at parse time,
//! never silently ignored.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ai::provider::ProviderKind;
use crate::error::{ConnectorError, Result};
use crate::rate_limit::{AcquireMode, RateLimitConfig};
use crate::transport::RetryPolicy;

/// Top-level settings for a chat client plus its connector transports.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    pub provider: ProviderKind,
    /// Model identifier; empty string means the provider default.
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    /// Override for the provider endpoint (self-hosted gateways,
    /// OpenAI-compatible vendors).
    pub base_url: Option<String>,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            model: String::new(),
            temperature: 0.7,
            max_output_tokens: 4096,
            base_url: None,
            rate_limit: RateLimitSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateLimitSettings {
    pub capacity: u32,
    pub refill_per_sec: f64,
    pub blocking: bool,
    pub block_timeout_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 60,
            refill_per_sec: 1.0,
            blocking: true,
            block_timeout_ms: 30_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 200,
            multiplier: 2.0,
            max_backoff_ms: 10_000,
            jitter: 0.25,
        }
    }
}

impl Settings {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(raw).map_err(|e| ConnectorError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConnectorError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        let settings = Self::from_toml_str(&raw)?;
        info!(path = %path.as_ref().display(), provider = %settings.provider, "Loaded settings");
        Ok(settings)
    }

    /// Builds settings from `VC_*` environment variables, starting from
    /// defaults. Recognized: `VC_PROVIDER`, `VC_MODEL`, `VC_TEMPERATURE`,
    /// `VC_MAX_OUTPUT_TOKENS`, `VC_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let mut settings = Settings::default();
        if let Ok(v) = std::env::var("VC_PROVIDER") {
            settings.provider = v.parse()?;
        }
        if let Ok(v) = std::env::var("VC_MODEL") {
            settings.model = v;
        }
        if let Ok(v) = std::env::var("VC_TEMPERATURE") {
            settings.temperature = v
                .parse()
                .map_err(|_| ConnectorError::Config(format!("invalid VC_TEMPERATURE '{}'", v)))?;
        }
        if let Ok(v) = std::env::var("VC_MAX_OUTPUT_TOKENS") {
            settings.max_output_tokens = v.parse().map_err(|_| {
                ConnectorError::Config(format!("invalid VC_MAX_OUTPUT_TOKENS '{}'", v))
            })?;
        }
        if let Ok(v) = std::env::var("VC_BASE_URL") {
            settings.base_url = Some(v);
        }
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConnectorError::Config(format!(
                "temperature {} outside [0.0, 2.0]",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(ConnectorError::Config(
                "max_output_tokens must be positive".to_string(),
            ));
        }
        if self.rate_limit.capacity == 0 {
            return Err(ConnectorError::Config(
                "rate_limit.capacity must be positive".to_string(),
            ));
        }
        if self.rate_limit.refill_per_sec <= 0.0 {
            return Err(ConnectorError::Config(
                "rate_limit.refill_per_sec must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConnectorError::Config(
                "retry.max_attempts must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConnectorError::Config(format!(
                "retry.jitter {} outside [0.0, 1.0]",
                self.retry.jitter
            )));
        }
        Ok(())
    }

    /// Model to request, falling back to the provider default.
    pub fn resolved_model(&self) -> String {
        if self.model.is_empty() {
            self.provider.default_model().to_string()
        } else {
            self.model.clone()
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            capacity: self.rate_limit.capacity,
            refill_per_sec: self.rate_limit.refill_per_sec,
            mode: if self.rate_limit.blocking {
                AcquireMode::Blocking
            } else {
                AcquireMode::FailFast
            },
            block_timeout: Duration::from_millis(self.rate_limit.block_timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_backoff: Duration::from_millis(self.retry.base_backoff_ms),
            multiplier: self.retry.multiplier,
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            jitter: self.retry.jitter,
        }
    }
}
