//! tetora - agent daemon with out-of-process plugins
//!
//! This is the main entry point for the tetora binary.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use tetora::cli::{Args, Command, PluginCommand};
use tetora::config::{Config, LogConfig};
use tetora::Daemon;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize logging
    init_logging(args.debug, &config.log);

    info!("Starting tetora v{}", env!("CARGO_PKG_VERSION"));

    let daemon = Daemon::new(config);
    match args.action() {
        Command::Serve => daemon.run().await.context("Waiting for shutdown signal")?,
        Command::Plugin(cmd) => {
            let ok = run_plugin_command(&daemon, cmd).await?;
            if !ok {
                std::process::exit(1);
            }
        }
    }

    info!("tetora exited");
    Ok(())
}

/// Run a one-shot plugin command; returns false when the outcome is a failure
async fn run_plugin_command(daemon: &Daemon, cmd: &PluginCommand) -> Result<bool> {
    let host = daemon.plugins();
    match cmd {
        PluginCommand::List => {
            print_json(&host.list().await)?;
            Ok(true)
        }
        PluginCommand::Health { name } => {
            if let Err(e) = host.start(name).await {
                anyhow::bail!("{}", e);
            }
            let health = host.health(name).await;
            host.stop_all().await;
            print_json(&health)?;
            Ok(health.healthy)
        }
        PluginCommand::Call {
            name,
            method,
            params,
        } => {
            let params: Option<Value> = params
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("params must be valid JSON")?;

            if let Err(e) = host.start(name).await {
                anyhow::bail!("{}", e);
            }
            let result = host.call(name, method, params).await;
            host.stop_all().await;
            print_json(&result?)?;
            Ok(true)
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize the logging/tracing subsystem
fn init_logging(debug: bool, log: &LogConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if log.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
