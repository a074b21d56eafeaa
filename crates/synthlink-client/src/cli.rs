//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ClientConfig;

/// synthlink - Talk to a running synthesis engine
#[derive(Debug, Parser)]
#[command(name = "synthlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "SYNTHLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Engine endpoint (PORT, HOST:PORT or unix:PATH)
    #[arg(long, short, env = "SYNTHLINK_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Reply timeout in milliseconds (0 waits forever)
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_overrides(&self, config: &mut ClientConfig) {
        if let Some(ref endpoint) = self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(ms) = self.timeout {
            config.client.request_timeout_ms = ms;
        }
        if self.debug {
            config.debug = true;
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send JSON payloads and print each reply
    ///
    /// All payloads go out over one connection before any reply is awaited.
    /// Replies are printed one JSON line each, in argument order.
    Send {
        /// JSON payloads, e.g. '{"type":"Ping"}'
        #[arg(required = true, value_name = "JSON")]
        payloads: Vec<String>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}
