//! Error types for tetora

use thiserror::Error;

/// Main error type for tetora
#[derive(Error, Debug)]
pub enum TetoraError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Plugin host and session errors
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin {0:?} not found in config")]
    NotConfigured(String),

    #[error("plugin {0:?} has no command")]
    MissingCommand(String),

    #[error("plugin {name:?} has invalid type {kind:?}")]
    InvalidType { name: String, kind: String },

    #[error("plugin {0:?} is already running")]
    AlreadyRunning(String),

    #[error("plugin {0:?} is not running")]
    NotRunning(String),

    #[error("plugin {0:?} process has exited")]
    Exited(String),

    #[error("start plugin {name}: {reason}")]
    Launch { name: String, reason: String },

    #[error("write to plugin {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("marshal request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("plugin {name}: timeout waiting for response (method={method}, id={id})")]
    Timeout { name: String, method: String, id: u64 },

    #[error("plugin {0}: session closed before a response arrived (process crashed?)")]
    SessionClosed(String),
}

/// Tool registry and tool execution errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool {0:?} not found")]
    NotFound(String),

    #[error("tool {0:?} has no handler")]
    NoHandler(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("{0}")]
    Failed(String),
}

/// Result type alias using TetoraError
pub type Result<T> = std::result::Result<T, TetoraError>;
