//! Tool descriptors, handlers, and invocation records.
//!
//! A tool is a named, schema-validated operation contributed by a
//! connector. Handlers run behind an async trait object so the registry
//! can hold tools from any connector uniformly.

pub mod adapters;
pub mod registry;
pub mod schema;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Result;
use self::schema::ToolSchema;

/// Executes one tool call. Arguments arrive already validated against the
/// tool's schema, with defaults filled in.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value> {
        (self.0)(arguments).await
    }
}

/// Wraps an async closure as a `ToolHandler`.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A registered tool: identity, documentation, schema, and handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Namespaced name, `<connector>_<operation>`.
    pub name: String,
    pub description: String,
    /// Connector that contributed the tool.
    pub category: String,
    pub schema: ToolSchema,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Record of one tool invocation.
#[derive(Clone, Debug)]
pub struct ToolInvocation {
    pub id: Uuid,
    pub tool: String,
    pub arguments: Map<String, Value>,
    /// Who asked: `"rpc"`, `"agent"`, or a caller-supplied label.
    pub caller: String,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, arguments: Map<String, Value>, caller: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool: tool.into(),
            arguments,
            caller: caller.into(),
        }
    }
}

/// A tool call as requested by a model or RPC client, before validation.
#[derive(Clone, Debug)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, echoed back in tool-role messages.
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}
