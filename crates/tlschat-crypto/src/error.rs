//! Crypto error types.

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A history line that is valid hex but does not decrypt.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key decryption failed: {0}")]
    KeyDecryptionFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
