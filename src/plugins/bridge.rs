//! Tool bridge
//!
//! Turns tool names declared by `type = "tool"` plugins into registry
//! entries that forward to the plugin over `tool/execute`.

use super::protocol::METHOD_TOOL_EXECUTE;
use crate::error::ToolError;
use crate::tools::{ToolContext, ToolDef, ToolHandler};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Handler for a tool served by an external plugin
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginToolHandler {
    pub plugin: String,
    pub tool: String,
}

impl PluginToolHandler {
    pub fn new(plugin: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            tool: tool.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for PluginToolHandler {
    async fn call(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError> {
        let host = ctx
            .plugins
            .as_ref()
            .ok_or_else(|| ToolError::Unavailable("plugin host not initialized".to_string()))?;

        let result = host
            .call(
                &self.plugin,
                METHOD_TOOL_EXECUTE,
                Some(json!({ "name": self.tool, "input": input })),
            )
            .await?;

        Ok(match result {
            Value::String(text) => text,
            other => other.to_string(),
        })
    }

    fn plugin_binding(&self) -> Option<(&str, &str)> {
        Some((self.plugin.as_str(), self.tool.as_str()))
    }
}

/// Registry entry for `tool` provided by `plugin`
pub fn plugin_tool_def(plugin: &str, tool: &str) -> ToolDef {
    ToolDef::new(
        tool,
        format!("Plugin tool ({}) provided by plugin {:?}", tool, plugin),
        json!({
            "type": "object",
            "properties": {
                "input": {"type": "object", "description": "Tool input"}
            },
            "required": []
        }),
    )
    .with_handler(PluginToolHandler::new(plugin, tool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    #[test]
    fn test_plugin_tool_def() {
        let def = plugin_tool_def("browser", "browser_open");

        assert_eq!(def.name, "browser_open");
        assert_eq!(
            def.description,
            r#"Plugin tool (browser_open) provided by plugin "browser""#
        );
        assert!(!def.builtin);
        assert_eq!(def.input_schema["properties"]["input"]["type"], "object");

        let handler = def.handler.unwrap();
        assert_eq!(handler.plugin_binding(), Some(("browser", "browser_open")));
    }

    #[test]
    fn test_handlers_compare_by_binding() {
        assert_eq!(
            PluginToolHandler::new("p", "t"),
            PluginToolHandler::new("p".to_string(), "t".to_string())
        );
        assert_ne!(PluginToolHandler::new("p", "t"), PluginToolHandler::new("q", "t"));
    }

    #[tokio::test]
    async fn test_call_without_host() {
        let ctx = ToolContext::new(Arc::new(Config::default()));
        let err = PluginToolHandler::new("p", "t")
            .call(&ctx, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));
    }
}
