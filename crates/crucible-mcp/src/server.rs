//! MCP server over stdio
//!
//! Exposes a [`ToolRegistry`] through rmcp. Stdout carries the protocol, so
//! nothing else may write to it while the server runs.

use crate::error::{MCPError, Result, ToolError};
use crate::registry::ToolRegistry;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use serde_json::Value;
use tracing::{info, warn};

const INSTRUCTIONS: &str = "Crucible reviews code against skills, knowledge and assertions \
resolved from project, user and bundled directories. Call detect_domain or \
get_applicable_skills before editing a file, run_pattern_assertions after, and review \
for a full pass/fail report.";

/// Handler serving crucible tools
pub struct CrucibleServer {
    tools: ToolRegistry,
}

impl CrucibleServer {
    /// Create a server for the given tools
    #[must_use]
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }

    /// Registered tools
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run a tool call and shape the outcome as MCP content
    ///
    /// # Errors
    /// Unknown tools and bad arguments are protocol errors; a tool that fails
    /// while running returns an error result instead.
    pub async fn dispatch(&self, name: &str, args: Value) -> std::result::Result<CallToolResult, McpError> {
        match self.tools.execute(name, args).await {
            Ok(Value::String(text)) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value)
                    .map_err(|e| McpError::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e @ (ToolError::UnknownTool(_) | ToolError::InvalidArguments { .. })) => {
                warn!("Rejected tool call '{}': {}", name, e);
                Err(McpError::invalid_params(e.to_string(), None))
            }
            Err(e @ ToolError::Failed { .. }) => {
                warn!("{}", e);
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }

    /// Serve on stdin/stdout until the client disconnects
    ///
    /// # Errors
    /// Returns an error if the handshake fails or the session task panics
    pub async fn serve_stdio(self) -> Result<()> {
        info!("Starting crucible MCP server on stdio ({} tools)", self.tools.len());

        let service = self
            .serve(rmcp::transport::stdio())
            .await
            .map_err(|e| MCPError::Initialize(e.to_string()))?;

        let reason = service
            .waiting()
            .await
            .map_err(|e| MCPError::Session(e.to_string()))?;

        info!("MCP session ended: {:?}", reason);
        Ok(())
    }
}

impl ServerHandler for CrucibleServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "crucible".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("Crucible code review".into()),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.into()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools.definitions()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let args = request.arguments.map_or(Value::Null, Value::Object);
        self.dispatch(&request.name, args).await
    }
}
