//! CLI module for chatwire
//!
//! # Commands
//!
//! - `serve` - Start the chat server
//! - `config init` - Write an example configuration file
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Start with the echo source on port 9000
//! chatwire serve -p 9000
//!
//! # Proxy an OpenAI-compatible backend
//! CHATWIRE_SOURCE=upstream CHATWIRE_UPSTREAM_URL=http://localhost:11434 chatwire serve
//!
//! # Generate shell completions
//! chatwire completions bash > ~/.bash_completion.d/chatwire
//! ```

pub mod completions;
pub mod config;
pub mod serve;

pub use completions::handle_completions;
pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// chatwire - chat completions over JSON or SSE
#[derive(Parser, Debug)]
#[command(
    name = "chatwire",
    version,
    about = "Chat-completions server with negotiated JSON or SSE responses"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the chat server
    Serve(ServeArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "chatwire.toml")]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long, env = "CHATWIRE_PORT")]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long, env = "CHATWIRE_HOST")]
    pub host: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CHATWIRE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Completion source (echo, upstream)
    #[arg(short, long, env = "CHATWIRE_SOURCE")]
    pub source: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "chatwire.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
