//! Configuration management for tetora
//!
//! Handles loading and merging configuration from multiple sources:
//! 1. Compiled defaults
//! 2. System config (/etc/tetora/config.toml)
//! 3. User config (~/.tetora/config.toml)
//! 4. CLI-specified config
//! 5. Environment variables

use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-call timeout when `tools.timeout` is unset
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// `$VAR` or `${VAR}` references inside plugin env values
static ENV_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub tools: ToolsConfig,
    /// Plugins keyed by name
    pub plugins: BTreeMap<String, PluginConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Output format: text or json
    pub format: String,
}

/// Tool execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Plugin call timeout in seconds (0 means the default of 30)
    pub timeout: u64,
    /// Builtin tool name -> enabled; missing names are enabled
    pub builtin: HashMap<String, bool>,
}

/// A single external plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// channel, tool, sandbox, provider or memory
    #[serde(rename = "type")]
    pub plugin_type: String,
    /// Binary path or name
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables overlaid on the daemon's environment
    pub env: BTreeMap<String, String>,
    /// Start when the daemon starts
    #[serde(rename = "autoStart", alias = "auto_start")]
    pub auto_start: bool,
    /// Tool names provided by the plugin (type = "tool" only)
    pub tools: Vec<String>,
}

/// One config file as written. Keys left out keep the value from earlier
/// layers, so a file may set a value back to its default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    log: LogLayer,
    tools: ToolsLayer,
    plugins: BTreeMap<String, PluginConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogLayer {
    level: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolsLayer {
    timeout: Option<u64>,
    builtin: HashMap<String, bool>,
}

/// Recognized plugin types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Channel,
    Tool,
    Sandbox,
    Provider,
    Memory,
}

impl PluginKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PluginKind::Channel => "channel",
            PluginKind::Tool => "tool",
            PluginKind::Sandbox => "sandbox",
            PluginKind::Provider => "provider",
            PluginKind::Memory => "memory",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel" => Ok(PluginKind::Channel),
            "tool" => Ok(PluginKind::Tool),
            "sandbox" => Ok(PluginKind::Sandbox),
            "provider" => Ok(PluginKind::Provider),
            "memory" => Ok(PluginKind::Memory),
            _ => Err(()),
        }
    }
}

impl PluginConfig {
    /// Parsed plugin type, `None` if unrecognized
    pub fn kind(&self) -> Option<PluginKind> {
        self.plugin_type.parse().ok()
    }
}

// Default implementations

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TOOL_TIMEOUT_SECS,
            builtin: HashMap::new(),
        }
    }
}

impl ToolsConfig {
    /// Timeout applied to plugin calls that don't choose their own
    pub fn call_timeout(&self) -> Duration {
        if self.timeout > 0 {
            Duration::from_secs(self.timeout)
        } else {
            Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS)
        }
    }

    /// Whether a builtin tool is enabled
    pub fn builtin_enabled(&self, name: &str) -> bool {
        self.builtin.get(name).copied().unwrap_or(true)
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(cli_config: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let system_config = Path::new("/etc/tetora/config.toml");
        if system_config.exists() {
            debug!("Loading system config from {:?}", system_config);
            config.merge_from_file(system_config)?;
        }

        if let Some(user_config) = user_config_path() {
            if user_config.exists() {
                debug!("Loading user config from {:?}", user_config);
                config.merge_from_file(&user_config)?;
            }
        }

        if let Some(path) = cli_config {
            debug!("Loading CLI config from {:?}", path);
            config.merge_from_file(path)?;
        }

        config.apply_env_overrides();
        config.expand_plugin_env();

        Ok(config)
    }

    /// Merge configuration from a file
    fn merge_from_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;

        let layer: ConfigLayer = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

        self.merge(layer);
        Ok(())
    }

    /// Merge a file layer into this config (the layer takes precedence)
    fn merge(&mut self, layer: ConfigLayer) {
        if let Some(level) = layer.log.level {
            self.log.level = level;
        }
        if let Some(format) = layer.log.format {
            self.log.format = format;
        }

        if let Some(timeout) = layer.tools.timeout {
            self.tools.timeout = timeout;
        }
        self.tools.builtin.extend(layer.tools.builtin);

        // Plugins merge by name, whole entries replaced
        self.plugins.extend(layer.plugins);
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("TETORA_LOG") {
            self.log.level = level;
        }
        if let Ok(timeout) = std::env::var("TETORA_TOOL_TIMEOUT") {
            match timeout.parse() {
                Ok(secs) => self.tools.timeout = secs,
                Err(_) => warn!("Ignoring invalid TETORA_TOOL_TIMEOUT: {}", timeout),
            }
        }
    }

    /// Resolve `$VAR` references in plugin env values
    fn expand_plugin_env(&mut self) {
        for (name, plugin) in self.plugins.iter_mut() {
            for (key, value) in plugin.env.iter_mut() {
                *value = expand_env_refs(value, &format!("plugins.{}.env.{}", name, key));
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.log.format.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log.format must be one of: {:?}",
                valid_formats
            )));
        }

        for (name, plugin) in &self.plugins {
            if plugin.command.is_empty() {
                return Err(ConfigError::MissingField(format!("plugins.{}.command", name)));
            }
            if plugin.kind().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "plugins.{}.type {:?} is not one of channel, tool, sandbox, provider, memory",
                    name, plugin.plugin_type
                )));
            }
        }

        Ok(())
    }
}

/// Default user config location
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tetora/config.toml"))
}

/// Replace every `$VAR`/`${VAR}` in `value` with the variable's value.
/// Unset variables expand to an empty string.
fn expand_env_refs(value: &str, field: &str) -> String {
    ENV_REF
        .replace_all(value, |caps: &Captures| {
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match std::env::var(key) {
                Ok(resolved) => resolved,
                Err(_) => {
                    warn!(field = field, env_var = key, "env var reference not set");
                    String::new()
                }
            }
        })
        .into_owned()
}
