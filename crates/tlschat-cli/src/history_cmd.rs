//! `tlschat history`: decrypt and print every stored record.

use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tlschat_core::Config;
use tlschat_crypto::{CryptoError, decrypt_log};
use tracing::debug;

use crate::menu::prompt_passphrase;

#[derive(Debug, Default, Args)]
pub struct HistoryArgs {
    /// History file (defaults to `history.path`)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Read the passphrase from this environment variable instead of
    /// prompting
    #[arg(long)]
    pub passphrase_env: Option<String>,
}

/// Counts from one pass over the history file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HistorySummary {
    pub decoded: usize,
    pub failed: usize,
}

pub fn run(args: &HistoryArgs, config: &Config) -> Result<()> {
    let path = args.file.as_deref().unwrap_or(&config.history.path);
    let passphrase = match &args.passphrase_env {
        Some(var) => std::env::var(var)
            .with_context(|| format!("Environment variable {var} is not set"))?,
        None => prompt_passphrase()?,
    };

    show_history(&mut io::stdout().lock(), path, &passphrase)?;
    Ok(())
}

/// Print every record of `path` that decrypts under `passphrase`.
///
/// Lines that fail to decrypt are counted and skipped; a missing file is
/// not an error.
pub fn show_history<W: Write>(out: &mut W, path: &Path, passphrase: &str) -> Result<HistorySummary> {
    let reader = match decrypt_log(path, passphrase) {
        Ok(reader) => reader,
        Err(CryptoError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
            writeln!(out, "No chat history found.")?;
            return Ok(HistorySummary::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open {}", path.display()));
        }
    };

    let mut summary = HistorySummary::default();
    writeln!(out, "\n--- Chat History ---")?;
    for item in reader {
        match item {
            Ok(text) => {
                out.write_all(text.as_bytes())?;
                summary.decoded += 1;
            }
            Err(CryptoError::DecryptionFailed(reason)) => {
                debug!(%reason, "Skipping history record");
                summary.failed += 1;
            }
            Err(e) => return Err(e).context("Failed to read chat history"),
        }
    }
    writeln!(out, "--------------------")?;
    if summary.failed > 0 {
        writeln!(
            out,
            "{} record(s) could not be decrypted. Wrong password?",
            summary.failed
        )?;
    }
    writeln!(out)?;
    Ok(summary)
}
