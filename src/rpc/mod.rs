//! RPC surface over the tool registry.
//!
//! Exposes two routes, mirroring the list/call protocol agent hosts speak:
//! - `POST /tools/list` — all registered tools with their schemas
//! - `POST /tools/call` — validate and execute one tool
//!
//! Execution failures come back as structured `{error: {kind, message}}`
//! bodies, never as raw panics or bare strings.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::ConnectorError;
use crate::tools::registry::ToolRegistry;

/// Shared state for the RPC handlers.
#[derive(Clone)]
pub struct RpcState {
    pub registry: Arc<ToolRegistry>,
}

/// One entry in the `POST /tools/list` response.
#[derive(Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

#[derive(Serialize)]
pub struct ListToolsResponse {
    pub tools: Vec<ToolInfo>,
}

/// Request body for `POST /tools/call`.
#[derive(Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Serialize)]
pub struct CallToolResponse {
    pub result: Value,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

async fn list_tools(State(state): State<Arc<RpcState>>) -> Json<ListToolsResponse> {
    let tools = state
        .registry
        .list()
        .iter()
        .map(|tool| ToolInfo {
            name: tool.name.clone(),
            description: tool.description.clone(),
            schema: tool.schema.to_json_schema(),
        })
        .collect();
    Json(ListToolsResponse { tools })
}

async fn call_tool(
    State(state): State<Arc<RpcState>>,
    Json(req): Json<CallToolRequest>,
) -> Result<Json<CallToolResponse>, RpcError> {
    let arguments = if req.arguments.is_null() {
        Value::Object(Default::default())
    } else {
        req.arguments
    };
    let result = state.registry.invoke(&req.name, &arguments, "rpc").await?;
    info!(tool = %req.name, "Tool call served");
    Ok(Json(CallToolResponse { result }))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RpcError(ConnectorError);

impl From<ConnectorError> for RpcError {
    fn from(e: ConnectorError) -> Self {
        RpcError(e)
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ConnectorError::UnknownTool(_) => StatusCode::NOT_FOUND,
            ConnectorError::ToolArgument { .. } => StatusCode::BAD_REQUEST,
            ConnectorError::RateLimitExceeded | ConnectorError::RateLimitTimeout { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    kind: self.0.kind().to_string(),
                    message: self.0.to_string(),
                },
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn create_router(registry: Arc<ToolRegistry>) -> Router {
    Router::new()
        .route("/tools/list", post(list_tools))
        .route("/tools/call", post(call_tool))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(RpcState { registry }))
}
