//! Daemon lifecycle
//!
//! Wires configuration, the tool registry and the plugin host together and
//! runs until interrupted.

use crate::config::Config;
use crate::plugins::PluginHost;
use crate::tools::code_mode;
use crate::tools::{ToolContext, ToolDef, ToolRegistry};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Daemon {
    config: Arc<Config>,
    registry: Arc<ToolRegistry>,
    plugins: Arc<PluginHost>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(ToolRegistry::new());
        code_mode::register_meta_tools(&registry, &config.tools);

        let plugins = Arc::new(PluginHost::new(
            Arc::clone(&config),
            Some(Arc::clone(&registry)),
        ));

        Self {
            config,
            registry,
            plugins,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn plugins(&self) -> &Arc<PluginHost> {
        &self.plugins
    }

    /// Context handed to tool handlers
    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(Arc::clone(&self.config))
            .with_registry(Arc::clone(&self.registry))
            .with_plugins(Arc::clone(&self.plugins))
    }

    /// The tool list an agent turn would see
    pub fn visible_tools(&self) -> Vec<Arc<ToolDef>> {
        code_mode::visible_tools(Some(&self.registry))
    }

    /// Auto-start plugins and report what the agent will see
    pub async fn start(&self) -> usize {
        if let Err(e) = self.config.validate() {
            warn!("Configuration problem: {}", e);
        }

        let started = self.plugins.auto_start().await;
        info!(
            started = started,
            configured = self.config.plugins.len(),
            "plugins auto-started"
        );

        let code_mode = code_mode::should_use_code_mode(Some(&self.registry));
        info!(
            tools = self.registry.len(),
            visible = self.visible_tools().len(),
            code_mode = code_mode,
            "tool registry ready"
        );

        started
    }

    pub async fn shutdown(&self) {
        info!("shutting down plugins");
        self.plugins.stop_all().await;
    }

    /// Run until Ctrl-C, then stop every plugin
    pub async fn run(&self) -> std::io::Result<()> {
        self.start().await;
        info!("tetora daemon running, press Ctrl-C to stop");

        let signal = tokio::signal::ctrl_c().await;
        self.shutdown().await;
        signal
    }
}
