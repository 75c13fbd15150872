//! Central tool registry.
//!
//! Connectors register their operations under namespaced names
//! (`<connector>_<operation>`); the registry validates arguments and
//! dispatches invocations. Listing returns a sorted snapshot, so adapters
//! built from it are stable across identical registrations.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ConnectorError, Result};
use crate::tools::schema::ToolSchema;
use crate::tools::{ToolDescriptor, ToolHandler, ToolInvocation};

/// Holds every registered tool. Cheap to clone handles out; reads take a
/// shared lock, registration an exclusive one.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<ToolDescriptor>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one operation under `<connector>_<operation>`.
    ///
    /// A name collision fails with `DuplicateToolName` and leaves the
    /// registry unchanged.
    pub fn register(
        &self,
        connector: &str,
        operation: &str,
        description: impl Into<String>,
        schema: ToolSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<()> {
        let name = format!("{}_{}", connector, operation);
        let mut tools = self.tools.write().unwrap();
        if tools.contains_key(&name) {
            return Err(ConnectorError::DuplicateToolName(name));
        }
        info!(connector = %connector, tool = %name, "Registered tool");
        tools.insert(
            name.clone(),
            Arc::new(ToolDescriptor {
                name,
                description: description.into(),
                category: connector.to_string(),
                schema,
                handler,
            }),
        );
        Ok(())
    }

    /// Snapshot of all tools, sorted by name.
    pub fn list(&self) -> Vec<Arc<ToolDescriptor>> {
        self.tools.read().unwrap().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools.read().unwrap().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().unwrap().is_empty()
    }

    /// Validates arguments and runs the handler.
    ///
    /// Unknown names fail with `UnknownTool`; validation failures with
    /// `ToolArgument` before the handler runs.
    pub async fn invoke(&self, name: &str, arguments: &Value, caller: &str) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| ConnectorError::UnknownTool(name.to_string()))?;

        let effective = tool.schema.validate(name, arguments)?;
        let invocation = ToolInvocation::new(name, effective, caller);
        debug!(
            tool = %name,
            invocation = %invocation.id,
            caller = %caller,
            "Invoking tool"
        );
        tool.handler.call(invocation.arguments).await
    }
}
