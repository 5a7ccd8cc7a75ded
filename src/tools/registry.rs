//! Tool registry
//!
//! Maps tool names to their schema and executable handler. Built-in tools,
//! the Code Mode meta-tools and plugin-backed tools all live here.

use crate::config::Config;
use crate::error::ToolError;
use crate::plugins::PluginHost;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Collaborators a handler may need, passed explicitly on every call
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<Config>,
    pub registry: Option<Arc<ToolRegistry>>,
    pub plugins: Option<Arc<PluginHost>>,
}

impl ToolContext {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            registry: None,
            plugins: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_plugins(mut self, plugins: Arc<PluginHost>) -> Self {
        self.plugins = Some(plugins);
        self
    }
}

/// Something that can execute a tool invocation
#[async_trait]
pub trait ToolHandler: Send + Sync + fmt::Debug {
    /// Run the tool with its raw JSON input
    async fn call(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError>;

    /// `(plugin, tool)` when the handler forwards to an external plugin
    fn plugin_binding(&self) -> Option<(&str, &str)> {
        None
    }
}

/// A tool the agent can call
#[derive(Clone)]
pub struct ToolDef {
    /// Unique tool name
    pub name: String,
    pub description: String,
    /// JSON schema of the input object
    pub input_schema: Value,
    pub handler: Option<Arc<dyn ToolHandler>>,
    /// Shipped with the daemon rather than provided by a plugin
    pub builtin: bool,
}

impl ToolDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: None,
            builtin: false,
        }
    }

    pub fn with_handler(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn builtin(mut self) -> Self {
        self.builtin = true;
        self
    }
}

impl fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("handler", &self.handler)
            .field("builtin", &self.builtin)
            .finish()
    }
}

/// Registered tools in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<Vec<Arc<ToolDef>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool of the same name in place
    pub fn register(&self, tool: ToolDef) {
        let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
        let tool = Arc::new(tool);
        match tools.iter_mut().find(|t| t.name == tool.name) {
            Some(slot) => *slot = tool,
            None => tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDef>> {
        self.read().iter().find(|t| t.name == name).cloned()
    }

    pub fn list(&self) -> Vec<Arc<ToolDef>> {
        self.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.read().iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Tool list as sent to an LLM provider: no handlers
    pub fn for_provider(&self) -> Vec<Value> {
        self.read()
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<ToolDef>>> {
        self.tools.read().unwrap_or_else(|e| e.into_inner())
    }
}
