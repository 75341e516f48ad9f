//! `tlschat connect` / `tlschat listen`: one live session per run.

use std::io::{self, BufReader, Write};

use anyhow::{Context, Result};
use clap::Args;
use tlschat_core::Config;
use tlschat_crypto::HistoryLog;
use tlschat_session::{
    EXIT_COMMAND, PeerIdentity, Role, Session, TlsChannel, bind_responder,
    establish_as_initiator, run_session,
};

#[derive(Debug, Default, Args)]
pub struct ConnectArgs {
    /// Peer address as host:port (defaults to `network.peer_addr`)
    #[arg(long)]
    pub peer: Option<String>,

    /// Name the responder certificate must carry (defaults to the peer host)
    #[arg(long)]
    pub server_name: Option<String>,
}

#[derive(Debug, Default, Args)]
pub struct ListenArgs {
    /// Address to listen on (defaults to `network.bind_addr`)
    #[arg(long)]
    pub bind: Option<String>,
}

/// Dial the peer as initiator and chat until either side stops.
pub fn run_connect(args: &ConnectArgs, config: &Config) -> Result<()> {
    let addr = args.peer.as_deref().unwrap_or(&config.network.peer_addr);
    let server_name = args
        .server_name
        .as_deref()
        .or(config.network.server_name.as_deref());
    let identity = PeerIdentity::new(
        &config.tls.client_cert,
        &config.tls.client_key,
        config.tls.key_passphrase.as_str(),
    );

    let channel = establish_as_initiator(addr, server_name, &identity, &config.tls.ca_cert)
        .with_context(|| format!("Failed to start a session with {addr}"))?;
    writeln!(io::stdout(), "TLS handshake successful")?;

    chat(Session::new(Role::Initiator, channel), config)
}

/// Accept exactly one peer as responder and chat until either side stops.
pub fn run_listen(args: &ListenArgs, config: &Config) -> Result<()> {
    let addr = args.bind.as_deref().unwrap_or(&config.network.bind_addr);
    let identity = PeerIdentity::new(
        &config.tls.server_cert,
        &config.tls.server_key,
        config.tls.key_passphrase.as_str(),
    );

    let pending = bind_responder(addr, &identity, &config.tls.ca_cert)
        .with_context(|| format!("Failed to listen on {addr}"))?;
    writeln!(
        io::stdout(),
        "Listening on {}, waiting for a peer...",
        pending.local_addr()?
    )?;

    let channel = pending.accept().context("Failed to accept a peer")?;
    writeln!(io::stdout(), "Peer connected: {}", channel.peer_addr())?;

    chat(Session::new(Role::Responder, channel), config)
}

fn chat(session: Session<TlsChannel>, config: &Config) -> Result<()> {
    let log = HistoryLog::open(&config.history.path, &config.history.passphrase);
    writeln!(
        io::stdout(),
        "Type a message and press Enter; \"{EXIT_COMMAND}\" ends the session."
    )?;

    let report = run_session(
        session,
        BufReader::new(io::stdin()),
        io::stdout(),
        &log,
        config.logging.color,
    );

    let mut out = io::stdout();
    if let Some(e) = &report.close_error {
        writeln!(out, "TLS shutdown result: {e}")?;
    }
    writeln!(out, "Session ended ({}). All resources released.", report.cause())?;
    Ok(())
}
