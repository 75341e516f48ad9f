//! `tlschat gen-certs`: throwaway PKI for local sessions.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use tlschat_core::Config;
use tlschat_crypto::certs::{DevPkiPaths, generate_dev_pki, write_dev_pki};

#[derive(Debug, Args)]
pub struct GenCertsArgs {
    /// Output directory (defaults to the configured CA certificate's directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// DNS name or IP address for the responder certificate (repeatable)
    #[arg(long = "name", default_values = ["localhost", "127.0.0.1"])]
    pub names: Vec<String>,

    /// Overwrite existing certificate files
    #[arg(long)]
    pub force: bool,

    /// Write private keys unencrypted instead of protecting them with
    /// `tls.key_passphrase`
    #[arg(long)]
    pub plain_keys: bool,
}

/// Generate and write a CA plus responder and initiator certificates.
pub fn run(args: &GenCertsArgs, config: &Config) -> Result<DevPkiPaths> {
    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| cert_dir(&config.tls.ca_cert));
    let planned = DevPkiPaths::in_dir(&dir);

    if !args.force {
        let files = [
            &planned.ca_cert,
            &planned.server_cert,
            &planned.server_key,
            &planned.client_cert,
            &planned.client_key,
        ];
        if let Some(existing) = files.iter().find(|p| p.exists()) {
            bail!(
                "{} already exists; pass --force to overwrite",
                existing.display()
            );
        }
    }

    let names: Vec<&str> = args.names.iter().map(String::as_str).collect();
    let passphrase = (!args.plain_keys).then_some(config.tls.key_passphrase.as_str());
    let pki = generate_dev_pki(&names, passphrase).context("Failed to generate certificates")?;
    let paths = write_dev_pki(&dir, &pki).context("Failed to write certificates")?;

    writeln!(io::stdout(), "Certificates written to {}", dir.display())?;
    Ok(paths)
}

fn cert_dir(ca_cert: &Path) -> PathBuf {
    ca_cert
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
