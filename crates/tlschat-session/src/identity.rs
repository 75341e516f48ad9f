//! Identity and trust material for both roles.
//!
//! Each peer presents a certificate chain and a private key; both load
//! the same CA bundle and require the other side to chain to it.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tracing::debug;

use crate::error::HandshakeError;

/// Certificate chain and private key files for one peer.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    pub cert_chain: PathBuf,
    pub private_key: PathBuf,
    /// Unlocks `ENCRYPTED PRIVATE KEY` files; ignored for plain keys.
    pub key_passphrase: String,
}

impl PeerIdentity {
    pub fn new(
        cert_chain: impl Into<PathBuf>,
        private_key: impl Into<PathBuf>,
        key_passphrase: impl Into<String>,
    ) -> Self {
        Self {
            cert_chain: cert_chain.into(),
            private_key: private_key.into(),
            key_passphrase: key_passphrase.into(),
        }
    }

    fn load(
        &self,
    ) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), HandshakeError> {
        let certs = load_certs(&self.cert_chain).map_err(HandshakeError::Identity)?;
        if certs.is_empty() {
            return Err(HandshakeError::Identity(format!(
                "No certificates in {}",
                self.cert_chain.display()
            )));
        }
        let key = load_private_key(&self.private_key, &self.key_passphrase)?;
        Ok((certs, key))
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, String> {
    let file =
        fs::File::open(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Malformed PEM in {}: {e}", path.display()))
}

/// Load a private key, decrypting it with `passphrase` when it is stored
/// as `ENCRYPTED PRIVATE KEY`.
pub fn load_private_key(
    path: &Path,
    passphrase: &str,
) -> Result<PrivateKeyDer<'static>, HandshakeError> {
    let pem = fs::read_to_string(path).map_err(|e| {
        HandshakeError::Identity(format!("Failed to read key {}: {e}", path.display()))
    })?;

    if let Some(der) = tlschat_crypto::decrypt_private_key_pem(&pem, passphrase)
        .map_err(|e| HandshakeError::Identity(format!("{}: {e}", path.display())))?
    {
        debug!(path = %path.display(), "Decrypted private key");
        return Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der.to_vec())));
    }

    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| HandshakeError::Identity(format!("Malformed key {}: {e}", path.display())))?
        .ok_or_else(|| {
            HandshakeError::Identity(format!("No private key found in {}", path.display()))
        })
}

/// Build a root store from every certificate in a CA bundle.
pub fn load_trust_roots(path: &Path) -> Result<RootCertStore, HandshakeError> {
    let certs = load_certs(path).map_err(HandshakeError::Trust)?;
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(HandshakeError::Trust(format!(
            "No usable CA certificates in {}",
            path.display()
        )));
    }
    debug!(path = %path.display(), added, ignored, "Loaded trust roots");
    Ok(roots)
}

/// TLS context for the initiator: presents `identity`, trusts `ca_bundle`.
pub fn client_config(
    identity: &PeerIdentity,
    ca_bundle: &Path,
) -> Result<Arc<ClientConfig>, HandshakeError> {
    let (certs, key) = identity.load()?;
    let roots = load_trust_roots(ca_bundle)?;

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| HandshakeError::TlsConfig(e.to_string()))?
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| HandshakeError::Identity(e.to_string()))?;
    Ok(Arc::new(config))
}

/// TLS context for the responder: presents `identity` and requires a
/// client certificate chaining to `ca_bundle`.
pub fn server_config(
    identity: &PeerIdentity,
    ca_bundle: &Path,
) -> Result<Arc<ServerConfig>, HandshakeError> {
    let (certs, key) = identity.load()?;
    let roots = load_trust_roots(ca_bundle)?;
    let provider = provider();

    let verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
            .build()
            .map_err(|e| HandshakeError::Trust(e.to_string()))?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| HandshakeError::TlsConfig(e.to_string()))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| HandshakeError::Identity(e.to_string()))?;
    Ok(Arc::new(config))
}
