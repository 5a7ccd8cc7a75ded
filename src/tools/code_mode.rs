//! Code Mode
//!
//! Once the tool catalogue grows past a threshold the agent no longer sees
//! every tool. It gets a fixed core set plus `search_tools` to discover the
//! rest and `execute_tool` to run them by name.

use super::registry::{ToolContext, ToolDef, ToolHandler, ToolRegistry};
use crate::config::ToolsConfig;
use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Tool count above which Code Mode activates
pub const CODE_MODE_THRESHOLD: usize = 10;

/// Default `search_tools` result cap
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

pub const SEARCH_TOOLS: &str = "search_tools";
pub const EXECUTE_TOOL: &str = "execute_tool";

/// Tools that stay directly visible even in Code Mode
pub const CORE_TOOLS: [&str; 9] = [
    "exec",
    "read",
    "write",
    "web_search",
    "web_fetch",
    "memory_search",
    "agent_dispatch",
    SEARCH_TOOLS,
    EXECUTE_TOOL,
];

pub fn is_core_tool(name: &str) -> bool {
    CORE_TOOLS.contains(&name)
}

/// Whether the registry is large enough to hide tools behind the meta-tools
pub fn should_use_code_mode(registry: Option<&ToolRegistry>) -> bool {
    registry.is_some_and(|r| r.len() > CODE_MODE_THRESHOLD)
}

/// The tool list to present to the agent
pub fn visible_tools(registry: Option<&ToolRegistry>) -> Vec<Arc<ToolDef>> {
    let Some(registry) = registry else {
        return Vec::new();
    };
    let tools = registry.list();
    if !should_use_code_mode(Some(registry)) {
        return tools;
    }
    debug!(total = tools.len(), "code mode active, exposing core tools only");
    tools.into_iter().filter(|t| is_core_tool(&t.name)).collect()
}

/// One `search_tools` hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

/// Case-insensitive substring search over tool names and descriptions, in
/// registry order, capped at `limit`
pub fn search_tools(
    registry: Option<&ToolRegistry>,
    query: &str,
    limit: usize,
) -> Result<Vec<ToolSummary>, ToolError> {
    if query.is_empty() {
        return Err(ToolError::InvalidInput("query is required".to_string()));
    }
    let Some(registry) = registry else {
        return Ok(Vec::new());
    };

    let query = query.to_lowercase();
    let results = registry
        .list()
        .iter()
        .filter(|t| {
            t.name.to_lowercase().contains(&query) || t.description.to_lowercase().contains(&query)
        })
        .take(limit)
        .map(|t| ToolSummary {
            name: t.name.clone(),
            description: t.description.clone(),
        })
        .collect();
    Ok(results)
}

/// Run a registered tool by name. Handler output and errors pass through
/// unchanged.
pub async fn execute_tool(ctx: &ToolContext, name: &str, input: Value) -> Result<String, ToolError> {
    let registry = ctx
        .registry
        .as_ref()
        .ok_or_else(|| ToolError::Unavailable("tool registry not initialized".to_string()))?;

    let tool = registry
        .get(name)
        .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
    let handler = tool
        .handler
        .as_ref()
        .ok_or_else(|| ToolError::NoHandler(name.to_string()))?;

    handler.call(ctx, input).await
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query: String,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ExecuteArgs {
    #[serde(default)]
    name: String,
    #[serde(default)]
    input: Value,
}

/// Handler behind the `search_tools` meta-tool
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchToolsHandler;

#[async_trait]
impl ToolHandler for SearchToolsHandler {
    async fn call(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError> {
        let args: SearchArgs =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        let limit = match args.limit {
            Some(n) if n > 0 => n as usize,
            _ => DEFAULT_SEARCH_LIMIT,
        };

        let results = search_tools(ctx.registry.as_deref(), &args.query, limit)?;
        serde_json::to_string(&results).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

/// Handler behind the `execute_tool` meta-tool
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteToolHandler;

#[async_trait]
impl ToolHandler for ExecuteToolHandler {
    async fn call(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError> {
        let args: ExecuteArgs =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        if args.name.is_empty() {
            return Err(ToolError::InvalidInput("name is required".to_string()));
        }
        execute_tool(ctx, &args.name, args.input).await
    }
}

/// Register `search_tools` and `execute_tool` unless disabled in config
pub fn register_meta_tools(registry: &ToolRegistry, tools: &ToolsConfig) {
    if tools.builtin_enabled(SEARCH_TOOLS) {
        registry.register(
            ToolDef::new(
                SEARCH_TOOLS,
                "Search available tools by keyword (name or description). Use when there are many tools and you need to find the right one.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Keyword to search for in tool names and descriptions"},
                        "limit": {"type": "number", "description": "Maximum results to return (default 10)"}
                    },
                    "required": ["query"]
                }),
            )
            .with_handler(SearchToolsHandler)
            .builtin(),
        );
    }

    if tools.builtin_enabled(EXECUTE_TOOL) {
        registry.register(
            ToolDef::new(
                EXECUTE_TOOL,
                "Execute any registered tool by name with given input. Use with search_tools to discover and run tools dynamically.",
                json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Tool name to execute"},
                        "input": {"type": "object", "description": "Input parameters for the tool"}
                    },
                    "required": ["name"]
                }),
            )
            .with_handler(ExecuteToolHandler)
            .builtin(),
        );
    }
}
