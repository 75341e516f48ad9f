use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tlschat_cli::certs_cmd::GenCertsArgs;
use tlschat_cli::chat_cmd::{ConnectArgs, ListenArgs};
use tlschat_cli::history_cmd::HistoryArgs;
use tlschat_cli::{certs_cmd, chat_cmd, history_cmd, menu};
use tlschat_core::Config;
use tlschat_core::config::load_config;
use tlschat_core::tracing_init::{default_filter, init_tracing};

/// Two-party chat over mutually authenticated TLS, with an encrypted
/// local history.
#[derive(Debug, Parser)]
#[command(name = "tlschat", version, about)]
struct Cli {
    /// Configuration file layered over the global settings
    #[arg(long, global = true, env = "TLSCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level for tlschat crates (`RUST_LOG` takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Do not highlight received messages
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Dial a peer and start a session
    Connect(ConnectArgs),
    /// Wait for one peer and start a session
    Listen(ListenArgs),
    /// Decrypt and print the chat history
    History(HistoryArgs),
    /// Generate a development CA and peer certificates
    GenCerts(GenCertsArgs),
}

impl Cli {
    fn apply_flags(&self, config: &mut Config) {
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        if self.log_json {
            config.logging.json = true;
        }
        if self.no_color {
            config.logging.color = false;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_flags(&mut config);
    init_tracing(&default_filter(&config.logging.level), config.logging.json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting tlschat");

    match cli.command {
        Some(Commands::Connect(args)) => chat_cmd::run_connect(&args, &config),
        Some(Commands::Listen(args)) => chat_cmd::run_listen(&args, &config),
        Some(Commands::History(args)) => history_cmd::run(&args, &config),
        Some(Commands::GenCerts(args)) => certs_cmd::run(&args, &config).map(drop),
        None => menu::run(&config),
    }
}
