//! Command-line argument parsing for tetora

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tetora - agent daemon with out-of-process plugins
#[derive(Parser, Debug)]
#[command(name = "tetora")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true, env = "TETORA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the daemon (default)
    Serve,

    /// Inspect and exercise configured plugins
    #[command(subcommand)]
    Plugin(PluginCommand),
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum PluginCommand {
    /// List configured plugins
    List,

    /// Start a plugin, ping it and stop it again
    Health {
        name: String,
    },

    /// Start a plugin, send one request and print the result
    Call {
        name: String,
        method: String,
        /// Request params as JSON
        #[arg(value_name = "PARAMS_JSON")]
        params: Option<String>,
    },
}

impl Args {
    pub fn action(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Serve)
    }
}
