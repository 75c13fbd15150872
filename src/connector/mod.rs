//! Per-vendor connector façade.
//!
//! A connector owns its credential resolver, rate limiter, and retrying
//! transport. `ConnectorBase` bundles those with the vendor base URL and
//! provides request helpers that resolve bearer credentials on demand, so
//! concrete connectors only describe their operations and register tools.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::credentials::CredentialResolver;
use crate::error::{ConnectorError, Result};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::tools::registry::ToolRegistry;
use crate::transport::{RetryPolicy, RetryingTransport, TransportRequest, TransportResponse};

/// A vendor connector: a name plus the tools it contributes.
///
/// Implementations typically embed a `ConnectorBase` and register one tool
/// per vendor operation.
pub trait VendorConnector: Send + Sync {
    /// Connector name, used as the tool namespace prefix. Must satisfy
    /// `validate_connector_name`.
    fn name(&self) -> &str;

    /// Registers this connector's tools. Called once at startup.
    fn register_tools(&self, registry: &ToolRegistry) -> Result<()>;
}

/// Connector names are lowercase `[a-z0-9_]`, starting with a letter. They
/// prefix namespaced tool names, so the grammar is deliberately narrow.
pub fn validate_connector_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConnectorError::Config(format!(
            "invalid connector name '{}': must be lowercase [a-z0-9_] starting with a letter",
            name
        )))
    }
}

/// Shared plumbing for concrete connectors.
pub struct ConnectorBase {
    name: String,
    base_url: String,
    resolver: Arc<CredentialResolver>,
    transport: Arc<RetryingTransport>,
}

impl ConnectorBase {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        resolver: CredentialResolver,
        rate_limit: RateLimitConfig,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let name = name.into();
        validate_connector_name(&name)?;
        let limiter = Arc::new(RateLimiter::new(rate_limit));
        let transport = Arc::new(RetryingTransport::new(name.clone(), limiter, retry));
        info!(connector = %name, "Connector initialized");
        Ok(Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resolver: Arc::new(resolver),
            transport,
        })
    }

    /// Construction with an externally built transport, used by tests to
    /// substitute a scripted sender.
    pub fn with_transport(
        name: impl Into<String>,
        base_url: impl Into<String>,
        resolver: CredentialResolver,
        transport: Arc<RetryingTransport>,
    ) -> Result<Self> {
        let name = name.into();
        validate_connector_name(&name)?;
        Ok(Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resolver: Arc::new(resolver),
            transport,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    pub fn transport(&self) -> &RetryingTransport {
        &self.transport
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Builds a GET request against the connector base URL with the named
    /// bearer credential resolved on demand.
    pub fn authorized_get(&self, path: &str, credential: &str) -> Result<TransportRequest> {
        let token = self.resolver.resolve(credential)?;
        Ok(TransportRequest::get(self.url(path)).bearer(token.value()))
    }

    /// Builds a POST request with a JSON body and the named bearer
    /// credential. Non-idempotent unless the caller marks it otherwise.
    pub fn authorized_post(
        &self,
        path: &str,
        credential: &str,
        body: Value,
    ) -> Result<TransportRequest> {
        let token = self.resolver.resolve(credential)?;
        Ok(TransportRequest::post(self.url(path))
            .bearer(token.value())
            .json(body))
    }

    /// Executes a request and decodes the body, translating error payloads
    /// carried on a success status into `Api` errors.
    pub async fn execute_json(&self, req: &TransportRequest) -> Result<Value> {
        let resp = self.transport.execute(req).await?;
        self.decode(resp)
    }

    /// GET + bearer + decode in one call.
    pub async fn get_json(&self, path: &str, credential: &str) -> Result<Value> {
        let req = self.authorized_get(path, credential)?;
        self.execute_json(&req).await
    }

    /// POST + bearer + decode in one call.
    pub async fn post_json(&self, path: &str, credential: &str, body: Value) -> Result<Value> {
        let req = self.authorized_post(path, credential, body)?;
        self.execute_json(&req).await
    }

    /// Translates a transport-success response into a decoded value or a
    /// typed `Api` error when the vendor signals failure in the payload
    /// (an `error` object alongside a 2xx status).
    pub fn decode(&self, resp: TransportResponse) -> Result<Value> {
        let value: Value = resp.json()?;
        if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified vendor error")
                .to_string();
            return Err(ConnectorError::Api {
                connector: self.name.clone(),
                status: resp.status,
                message,
            });
        }
        Ok(value)
    }
}
