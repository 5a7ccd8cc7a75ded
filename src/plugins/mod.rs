//! Plugin system for tetora
//!
//! External processes speaking JSON-RPC 2.0 over newline-delimited
//! stdin/stdout. The host supervises them and bridges tool plugins into
//! the tool registry.

mod bridge;
mod host;
pub mod protocol;
mod session;

#[cfg(all(test, unix))]
mod testutil;

pub use bridge::{plugin_tool_def, PluginToolHandler};
pub use host::{HealthStatus, PluginHealth, PluginHost, PluginStatus, RunState, HEALTH_TIMEOUT};
pub use session::{NotifyHandler, PluginSession};
