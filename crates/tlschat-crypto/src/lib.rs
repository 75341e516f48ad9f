//! `tlschat` crypto library
//!
//! ## History log
//!
//! Every chat message is persisted as one line of uppercase hex:
//! `SM4-CBC(PKCS#7)` of `"[timestamp] label: message\n"`, keyed by
//! `SM3(passphrase)` split into a 16-byte key and a 16-byte IV.
//!
//! The IV is a pure function of the passphrase, so every record written
//! under one passphrase shares it. Changing that would change the on-disk
//! format; existing history files depend on it.
//!
//! ## Certificates
//!
//! With the `certs` feature: throwaway CA, responder and initiator
//! certificates for mutually authenticated local sessions.

#[cfg(feature = "certs")]
pub mod certs;
pub mod error;
pub mod history;
pub mod keys;

pub use error::CryptoError;
pub use history::{
    DerivedKey, HistoryLog, HistoryReader, append_record, decrypt_log, derive_key, encrypt_record,
    format_record,
};
pub use keys::decrypt_private_key_pem;
