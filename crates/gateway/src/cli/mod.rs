pub mod chat;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use vx_domain::config::Config;

/// VoxGate — a real-time voice agent gateway.
#[derive(Debug, Parser)]
#[command(name = "voxgate", version, about)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Interactive text session against the agent roster.
    Chat,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the config file (defaults when absent).
pub fn load_config(path: &std::path::Path) -> anyhow::Result<Config> {
    Config::load(path).map_err(|e| anyhow::anyhow!("loading {}: {e}", path.display()))
}
