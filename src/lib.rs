// Error taxonomy and crate-wide Result
pub mod error;

// Externally supplied settings (TOML / env)
pub mod config;

// Credential resolution and memoization
pub mod credentials;

// Token bucket rate limiting
pub mod rate_limit;

// Retrying HTTP transport
pub mod transport;

// Connector façade and trait
pub mod connector;

// Tool schemas, registry, and framework adapters
pub mod tools;

// RPC surface over the registry
pub mod rpc;

// Chat providers and the tool-call loop
pub mod ai;

/// Initializes a `tracing` fmt subscriber honoring `RUST_LOG`, defaulting
/// to info-level output for this crate. Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vendor_connectors=info".into()),
        )
        .try_init();
}

pub use config::Settings;
pub use connector::{ConnectorBase, VendorConnector};
pub use credentials::{Credential, CredentialResolver, CredentialSpec};
pub use error::{ConnectorError, Result};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use tools::registry::ToolRegistry;
pub use transport::{RetryPolicy, RetryingTransport, TransportRequest};
