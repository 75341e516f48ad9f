//! Numeric start menu shown when no subcommand is given.

use std::io::{self, Write};

use anyhow::Result;
use dialoguer::{Input, Password};
use tlschat_core::Config;

use crate::chat_cmd::{self, ConnectArgs, ListenArgs};
use crate::history_cmd::{self, HistoryArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    StartChat,
    ViewHistory,
    WaitForPeer,
}

/// `1`, `2` or `3`, surrounding whitespace allowed.
pub fn parse_choice(input: &str) -> Option<MenuChoice> {
    match input.trim().parse::<u32>().ok()? {
        1 => Some(MenuChoice::StartChat),
        2 => Some(MenuChoice::ViewHistory),
        3 => Some(MenuChoice::WaitForPeer),
        _ => None,
    }
}

pub fn prompt_choice() -> Result<Option<MenuChoice>> {
    let mut out = io::stdout();
    writeln!(out, "1.start chat")?;
    writeln!(out, "2.load chat history")?;
    writeln!(out, "3.wait for a peer")?;
    let answer: String = Input::new()
        .with_prompt("Enter your choice")
        .interact_text()?;
    Ok(parse_choice(&answer))
}

/// Prompt for the history passphrase (hidden input).
pub fn prompt_passphrase() -> Result<String> {
    let passphrase: String = Password::new()
        .with_prompt("Enter password")
        .allow_empty_password(true)
        .interact()?;
    Ok(passphrase)
}

pub fn run(config: &Config) -> Result<()> {
    match prompt_choice()? {
        Some(MenuChoice::StartChat) => chat_cmd::run_connect(&ConnectArgs::default(), config),
        Some(MenuChoice::ViewHistory) => history_cmd::run(&HistoryArgs::default(), config),
        Some(MenuChoice::WaitForPeer) => chat_cmd::run_listen(&ListenArgs::default(), config),
        None => {
            writeln!(io::stdout(), "Invalid choice")?;
            Ok(())
        }
    }
}
