//! Configuration resolution for tlschat.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`$XDG_CONFIG_HOME/tlschat/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! File layers are deep-merged: a layer only overrides the keys it names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Default TCP endpoint shared by both roles.
pub const DEFAULT_PORT: u16 = 4437;

/// Complete tlschat configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the initiator dials and where the responder listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub peer_addr: String,
    pub bind_addr: String,
    /// Name checked against the responder certificate. Defaults to the
    /// host part of `peer_addr`.
    pub server_name: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peer_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            server_name: None,
        }
    }
}

/// Identity and trust material for both roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsConfig {
    pub ca_cert: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    /// Passphrase protecting the private keys on disk.
    pub key_passphrase: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self::in_dir(Path::new("certs"))
    }
}

impl TlsConfig {
    /// Standard file names rooted at `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            ca_cert: dir.join("ca-cert.pem"),
            server_cert: dir.join("server-cert.pem"),
            server_key: dir.join("server-key.pem"),
            client_cert: dir.join("client-cert.pem"),
            client_key: dir.join("client-key.pem"),
            key_passphrase: "123456".to_string(),
        }
    }

    /// Re-root every certificate path in `dir`, keeping the passphrase.
    #[must_use]
    pub fn with_cert_dir(self, dir: &Path) -> Self {
        Self {
            key_passphrase: self.key_passphrase,
            ..Self::in_dir(dir)
        }
    }
}

/// Encrypted chat history settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    pub path: PathBuf,
    pub passphrase: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("chat_history.txt"),
            passphrase: "123456".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// Highlight received messages with ANSI colour.
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            color: true,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// `explicit` must exist when given; the global file is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let global = global_config_path().filter(|p| p.exists());
    let mut config = resolve_layers(global.as_deref(), explicit)?;
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tlschat").join("settings.json"))
}

fn resolve_layers(global: Option<&Path>, explicit: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    for path in [global, explicit].into_iter().flatten() {
        merge_json(&mut merged, load_layer(path)?);
    }
    serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))
}

fn load_layer(path: &Path) -> Result<Value> {
    debug!(path = %path.display(), "Loading config layer");
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `TLSCHAT_*` overrides using `lookup` to read variables.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("TLSCHAT_PEER_ADDR") {
        config.network.peer_addr = val;
    }
    if let Some(val) = lookup("TLSCHAT_BIND_ADDR") {
        config.network.bind_addr = val;
    }
    if let Some(val) = lookup("TLSCHAT_SERVER_NAME") {
        config.network.server_name = Some(val);
    }
    if let Some(val) = lookup("TLSCHAT_CERT_DIR") {
        config.tls = std::mem::take(&mut config.tls).with_cert_dir(Path::new(&val));
    }
    if let Some(val) = lookup("TLSCHAT_KEY_PASSPHRASE") {
        config.tls.key_passphrase = val;
    }
    if let Some(val) = lookup("TLSCHAT_HISTORY_PATH") {
        config.history.path = PathBuf::from(val);
    }
    if let Some(val) = lookup("TLSCHAT_HISTORY_PASSPHRASE") {
        config.history.passphrase = val;
    }
    if let Some(val) = lookup("TLSCHAT_LOG_LEVEL") {
        config.logging.level = val;
    }
    if let Some(val) = lookup("TLSCHAT_LOG_JSON") {
        config.logging.json = matches!(val.as_str(), "1" | "true");
    }
}
