//! tetora - agent daemon with out-of-process plugins
//!
//! Plugins are external processes speaking JSON-RPC 2.0 over stdio. Tool
//! plugins surface as regular tools, and large tool catalogues switch the
//! agent to Code Mode.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod plugins;
pub mod tools;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Result, TetoraError};
