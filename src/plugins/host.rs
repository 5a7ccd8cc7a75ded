//! Plugin host
//!
//! Registry of live plugin sessions keyed by plugin name. Maps static
//! configuration to running processes and bridges tool plugins into the
//! tool registry.

use super::bridge::plugin_tool_def;
use super::protocol::METHOD_PING;
use super::session::{NotifyHandler, PluginSession};
use crate::config::{Config, PluginKind};
use crate::error::PluginError;
use crate::tools::ToolRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Timeout for the `ping` issued by `health`
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Derived status in `list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Stopped,
}

/// One configured plugin as reported by `list`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub command: String,
    pub auto_start: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    pub status: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Process state reported by `health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    NotRunning,
    Exited,
    Running,
}

/// Result of a health probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginHealth {
    pub name: String,
    pub status: HealthStatus,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginHealth {
    fn unhealthy(name: &str, status: HealthStatus, error: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            healthy: false,
            error,
        }
    }
}

/// Supervises every running plugin
pub struct PluginHost {
    config: Arc<Config>,
    registry: Option<Arc<ToolRegistry>>,
    plugins: RwLock<HashMap<String, Arc<PluginSession>>>,
}

impl PluginHost {
    /// Create a host. Tool plugins register into `registry` when given.
    pub fn new(config: Arc<Config>, registry: Option<Arc<ToolRegistry>>) -> Self {
        Self {
            config,
            registry,
            plugins: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> Option<&Arc<ToolRegistry>> {
        self.registry.as_ref()
    }

    /// Start a configured plugin by name
    pub async fn start(&self, name: &str) -> Result<(), PluginError> {
        let pcfg = self
            .config
            .plugins
            .get(name)
            .ok_or_else(|| PluginError::NotConfigured(name.to_string()))?;

        if pcfg.command.is_empty() {
            return Err(PluginError::MissingCommand(name.to_string()));
        }

        let kind = pcfg.kind().ok_or_else(|| PluginError::InvalidType {
            name: name.to_string(),
            kind: pcfg.plugin_type.clone(),
        })?;

        if self.is_running(name).await {
            return Err(PluginError::AlreadyRunning(name.to_string()));
        }

        let session = Arc::new(
            PluginSession::new(name, pcfg.clone()).with_notify_handler(notification_hook(name)),
        );
        session.start().await?;

        // Re-check: another start may have won while we were spawning
        let previous = {
            let mut plugins = self.plugins.write().await;
            if plugins.get(name).is_some_and(|s| s.is_running()) {
                drop(plugins);
                session.stop().await;
                return Err(PluginError::AlreadyRunning(name.to_string()));
            }
            plugins.insert(name.to_string(), Arc::clone(&session))
        };

        // A crashed session being replaced still needs its process reaped
        if let Some(previous) = previous {
            previous.stop().await;
        }

        info!(name = %name, kind = %kind, command = %pcfg.command, "plugin started");

        if kind == PluginKind::Tool && !pcfg.tools.is_empty() {
            if let Some(registry) = &self.registry {
                for tool in &pcfg.tools {
                    registry.register(plugin_tool_def(name, tool));
                }
                info!(plugin = %name, tools = pcfg.tools.len(), "plugin tools registered");
            }
        }

        Ok(())
    }

    /// Stop a running plugin
    pub async fn stop(&self, name: &str) -> Result<(), PluginError> {
        let session = self
            .plugins
            .write()
            .await
            .remove(name)
            .ok_or_else(|| PluginError::NotRunning(name.to_string()))?;

        info!(name = %name, "plugin stopping");
        session.stop().await;
        Ok(())
    }

    /// Stop every running plugin, logging failures
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.plugins.read().await.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.stop(&name).await {
                warn!(name = %name, error = %e, "stop plugin failed");
            }
        }
    }

    /// Call a plugin with the configured tool timeout
    pub async fn call(
        &self,
        name: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, PluginError> {
        self.call_with_timeout(name, method, params, self.config.tools.call_timeout())
            .await
    }

    pub async fn call_with_timeout(
        &self,
        name: &str,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, PluginError> {
        let session = self.live_session(name).await?;
        session.call(method, params, timeout).await
    }

    /// Send a notification to a plugin
    pub async fn notify(
        &self,
        name: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), PluginError> {
        let session = self.live_session(name).await?;
        session.notify(method, params).await
    }

    /// Every configured plugin with its current status, ordered by name
    pub async fn list(&self) -> Vec<PluginStatus> {
        let plugins = self.plugins.read().await;
        self.config
            .plugins
            .iter()
            .map(|(name, pcfg)| {
                let live = plugins.get(name).filter(|s| s.is_running());
                PluginStatus {
                    name: name.clone(),
                    plugin_type: pcfg.plugin_type.clone(),
                    command: pcfg.command.clone(),
                    auto_start: pcfg.auto_start,
                    tools: pcfg.tools.clone(),
                    status: if live.is_some() {
                        RunState::Running
                    } else {
                        RunState::Stopped
                    },
                    started_at: live.and_then(|s| s.started_at()),
                }
            })
            .collect()
    }

    /// Probe a plugin: process state plus a `ping` round trip
    pub async fn health(&self, name: &str) -> PluginHealth {
        let Some(session) = self.session(name).await else {
            return PluginHealth::unhealthy(name, HealthStatus::NotRunning, None);
        };
        if !session.is_running() {
            return PluginHealth::unhealthy(name, HealthStatus::Exited, None);
        }

        match session.call(METHOD_PING, None, HEALTH_TIMEOUT).await {
            Err(e) => PluginHealth::unhealthy(name, HealthStatus::Running, Some(e.to_string())),
            Ok(result) if is_error_payload(&result) => {
                let message = result
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("ping returned an error")
                    .to_string();
                PluginHealth::unhealthy(name, HealthStatus::Running, Some(message))
            }
            Ok(_) => PluginHealth {
                name: name.to_string(),
                status: HealthStatus::Running,
                healthy: true,
                error: None,
            },
        }
    }

    /// Start every plugin flagged `autoStart`; returns how many started
    pub async fn auto_start(&self) -> usize {
        let mut started = 0;
        for (name, pcfg) in &self.config.plugins {
            if !pcfg.auto_start {
                continue;
            }
            match self.start(name).await {
                Ok(()) => started += 1,
                Err(e) => warn!(name = %name, error = %e, "auto-start plugin failed"),
            }
        }
        started
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.session(name).await.is_some_and(|s| s.is_running())
    }

    /// Names of plugins with a session in the registry
    pub async fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) async fn session(&self, name: &str) -> Option<Arc<PluginSession>> {
        self.plugins.read().await.get(name).cloned()
    }

    async fn live_session(&self, name: &str) -> Result<Arc<PluginSession>, PluginError> {
        let session = self
            .session(name)
            .await
            .ok_or_else(|| PluginError::NotRunning(name.to_string()))?;
        if !session.is_running() {
            return Err(PluginError::Exited(name.to_string()));
        }
        Ok(session)
    }
}

/// Hook for plugin-initiated notifications; channel traffic would be routed
/// to dispatch from here
fn notification_hook(name: &str) -> NotifyHandler {
    let plugin = name.to_string();
    Arc::new(move |method: &str, _params: Option<Value>| {
        debug!(plugin = %plugin, method = %method, "no subscriber for plugin notification");
    })
}

fn is_error_payload(value: &Value) -> bool {
    value.get("isError").and_then(Value::as_bool).unwrap_or(false)
}
