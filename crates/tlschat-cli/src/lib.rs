//! `tlschat` CLI library
//!
//! Subcommands behind the `tlschat` binary: live sessions in either
//! role, the history viewer, dev certificate generation, and the numeric
//! start menu shown when no subcommand is given.

pub mod certs_cmd;
pub mod chat_cmd;
pub mod history_cmd;
pub mod menu;
