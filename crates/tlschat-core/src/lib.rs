//! `tlschat` Core Library
//!
//! Shared functionality for `tlschat` components:
//! - Layered configuration resolution
//! - Tracing subscriber setup
//! - Common error types

pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
