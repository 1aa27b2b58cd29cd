//! Tool registry for the crucible MCP server

use crate::error::ToolError;
use async_trait::async_trait;
use rmcp::model::{JsonObject, Tool};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};

/// A callable tool with a JSON Schema for its arguments
#[async_trait]
pub trait ReviewTool: Send + Sync {
    /// Name, description and input schema advertised to clients
    fn definition(&self) -> Tool;

    /// Run the tool with already-decoded JSON arguments
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Build a tool definition from a `json!` schema
#[must_use]
pub fn tool_definition(
    name: &'static str,
    description: impl Into<Cow<'static, str>>,
    schema: &Value,
) -> Tool {
    let schema: JsonObject = schema.as_object().cloned().unwrap_or_default();
    Tool::new(name, description, Arc::new(schema))
}

/// Registered tools, in registration order
pub struct ToolRegistry {
    tools: Vec<(String, Box<dyn ReviewTool>)>,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Add a tool; a tool with the same name replaces the earlier one
    pub fn register(&mut self, tool: Box<dyn ReviewTool>) {
        let name = tool.definition().name.to_string();
        if let Some(slot) = self.tools.iter_mut().find(|(n, _)| *n == name) {
            debug!("Replacing tool '{}'", name);
            slot.1 = tool;
        } else {
            self.tools.push((name, tool));
        }
    }

    /// Definitions of every registered tool
    #[must_use]
    pub fn definitions(&self) -> Vec<Tool> {
        self.tools.iter().map(|(_, t)| t.definition()).collect()
    }

    /// Tool names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Execute a tool by name
    ///
    /// # Errors
    /// Returns [`ToolError::UnknownTool`] for an unregistered name, or the
    /// tool's own error.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let (_, tool) = self
            .tools
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| ToolError::UnknownTool(name.into()))?;

        info!("Executing tool '{}'", name);
        tool.execute(args).await
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo(&'static str);

    #[async_trait]
    impl ReviewTool for Echo {
        fn definition(&self) -> Tool {
            tool_definition("echo", self.0, &json!({"type": "object"}))
        }

        async fn execute(&self, args: Value) -> Result<Value, ToolError> {
            Ok(json!({"tool": self.0, "args": args}))
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo("first")));
        registry.register(Box::new(Echo("second")));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["echo"]);

        let out = registry.execute("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(out["tool"], "second");
        assert_eq!(out["args"]["x"], 1);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::default();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.execute("nope", Value::Null).await,
            Err(ToolError::UnknownTool(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_tool_definition_schema() {
        let tool = tool_definition("t", "d", &json!({"type": "object", "required": ["a"]}));
        assert_eq!(tool.name, "t");
        assert_eq!(tool.input_schema.get("required"), Some(&json!(["a"])));
    }
}
