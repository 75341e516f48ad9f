//! Passphrase-protected private keys.
//!
//! Keys on disk may be plain PEM or `ENCRYPTED PRIVATE KEY` (PKCS#8 with
//! PBES2). This module only handles the encrypted form; plain keys are
//! parsed by the transport layer directly.

use pkcs8::{EncryptedPrivateKeyInfo, SecretDocument};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// PEM label of a PKCS#8 encrypted private key.
pub const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Locate the first `ENCRYPTED PRIVATE KEY` block in a PEM bundle.
pub fn find_encrypted_key_block(pem: &str) -> Option<&str> {
    let begin = format!("-----BEGIN {ENCRYPTED_KEY_LABEL}-----");
    let end = format!("-----END {ENCRYPTED_KEY_LABEL}-----");
    let start = pem.find(&begin)?;
    let stop = pem[start..].find(&end)? + start + end.len();
    Some(&pem[start..stop])
}

/// Decrypt the encrypted key in `pem` into PKCS#8 DER.
///
/// Returns `Ok(None)` when the bundle holds no encrypted key.
pub fn decrypt_private_key_pem(
    pem: &str,
    passphrase: &str,
) -> Result<Option<Zeroizing<Vec<u8>>>, CryptoError> {
    let Some(block) = find_encrypted_key_block(pem) else {
        return Ok(None);
    };
    let (label, document) = SecretDocument::from_pem(block)
        .map_err(|e| CryptoError::KeyDecryptionFailed(format!("Malformed PEM: {e}")))?;
    if label != ENCRYPTED_KEY_LABEL {
        return Err(CryptoError::KeyDecryptionFailed(format!(
            "Unexpected PEM label {label}"
        )));
    }
    let info = EncryptedPrivateKeyInfo::try_from(document.as_bytes())
        .map_err(|e| CryptoError::KeyDecryptionFailed(format!("Malformed key: {e}")))?;
    let decrypted = info
        .decrypt(passphrase)
        .map_err(|_| CryptoError::KeyDecryptionFailed("Wrong key passphrase".into()))?;
    Ok(Some(Zeroizing::new(decrypted.as_bytes().to_vec())))
}
