//! Development PKI for mutually authenticated sessions.
//!
//! Generates a self-signed CA plus one responder (server) and one
//! initiator (client) certificate signed by it. Private keys can be
//! written passphrase-encrypted so they load the same way as
//! operator-supplied keys. NOT suitable for production use.
//!
//! Requires the `certs` feature to be enabled.

use std::path::{Path, PathBuf};

use pkcs8::pkcs5::pbes2;
use pkcs8::{LineEnding, PrivateKeyInfo};
use rand::RngCore;
use rand::rngs::OsRng;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair,
    KeyUsagePurpose,
};
use tracing::info;

use crate::keys::ENCRYPTED_KEY_LABEL;

/// PBKDF2 rounds for encrypted key files.
const PBKDF2_ITERATIONS: u32 = 2048;

/// CA material for signing peer certificates.
pub struct CaBundle {
    /// CA certificate parameters (needed for signing).
    pub params: CertificateParams,
    /// CA key pair.
    pub key_pair: KeyPair,
    /// PEM-encoded CA certificate.
    pub ca_cert_pem: String,
}

/// PEM-encoded certificate and private key for one peer.
pub struct PeerCertBundle {
    pub cert_pem: String,
    /// `PRIVATE KEY`, or `ENCRYPTED PRIVATE KEY` when a passphrase was given.
    pub key_pem: String,
}

/// Everything both peers need for a mutually authenticated session.
pub struct DevPki {
    pub ca_cert_pem: String,
    pub server: PeerCertBundle,
    pub client: PeerCertBundle,
}

/// Files written by [`write_dev_pki`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevPkiPaths {
    pub ca_cert: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

impl DevPkiPaths {
    /// Standard file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            ca_cert: dir.join("ca-cert.pem"),
            server_cert: dir.join("server-cert.pem"),
            server_key: dir.join("server-key.pem"),
            client_cert: dir.join("client-cert.pem"),
            client_key: dir.join("client-key.pem"),
        }
    }
}

/// Certificate generation errors.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// An error occurred during certificate generation or signing.
    #[error("Certificate generation error: {0}")]
    Generation(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Generate a self-signed CA suitable for signing peer certificates.
pub fn generate_ca(org_name: &str) -> Result<CaBundle, CertError> {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
        .distinguished_name
        .push(DnType::CommonName, format!("{org_name} CA"));
    params
        .distinguished_name
        .push(DnType::OrganizationName, org_name);
    params.key_usages.push(KeyUsagePurpose::KeyCertSign);
    params.key_usages.push(KeyUsagePurpose::CrlSign);

    let key_pair = KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
    let ca_cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Generation(e.to_string()))?;

    Ok(CaBundle {
        ca_cert_pem: ca_cert.pem(),
        params,
        key_pair,
    })
}

/// Generate a responder certificate for `server_names` signed by `ca`.
///
/// Names that parse as IP addresses become IP SANs.
pub fn generate_server_cert(
    ca: &CaBundle,
    server_names: &[&str],
    key_passphrase: Option<&str>,
) -> Result<PeerCertBundle, CertError> {
    let mut params = CertificateParams::new(
        server_names
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
    )
    .map_err(|e| CertError::Generation(e.to_string()))?;
    params
        .distinguished_name
        .push(DnType::CommonName, "tlschat responder");
    params
        .extended_key_usages
        .push(ExtendedKeyUsagePurpose::ServerAuth);

    sign_peer(ca, &params, key_passphrase)
}

/// Generate an initiator certificate with `common_name` as CN.
pub fn generate_client_cert(
    ca: &CaBundle,
    common_name: &str,
    key_passphrase: Option<&str>,
) -> Result<PeerCertBundle, CertError> {
    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params
        .extended_key_usages
        .push(ExtendedKeyUsagePurpose::ClientAuth);

    sign_peer(ca, &params, key_passphrase)
}

fn sign_peer(
    ca: &CaBundle,
    params: &CertificateParams,
    key_passphrase: Option<&str>,
) -> Result<PeerCertBundle, CertError> {
    let issuer = Issuer::from_params(&ca.params, &ca.key_pair);
    let key = KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
    let cert = params
        .signed_by(&key, &issuer)
        .map_err(|e| CertError::Generation(e.to_string()))?;

    let key_pem = match key_passphrase {
        Some(passphrase) => encrypt_key_der(&key.serialize_der(), passphrase)?,
        None => key.serialize_pem(),
    };
    Ok(PeerCertBundle {
        cert_pem: cert.pem(),
        key_pem,
    })
}

/// Wrap a PKCS#8 DER key as `ENCRYPTED PRIVATE KEY` PEM
/// (PBES2: PBKDF2-SHA256 + AES-256-CBC).
pub fn encrypt_key_der(key_der: &[u8], passphrase: &str) -> Result<String, CertError> {
    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(PBKDF2_ITERATIONS, &salt, &iv)
        .map_err(|e| CertError::Generation(e.to_string()))?;
    let info =
        PrivateKeyInfo::try_from(key_der).map_err(|e| CertError::Generation(e.to_string()))?;
    let document = info
        .encrypt_with_params(params, passphrase)
        .map_err(|e| CertError::Generation(e.to_string()))?;
    let pem = document
        .to_pem(ENCRYPTED_KEY_LABEL, LineEnding::LF)
        .map_err(|e| CertError::Generation(e.to_string()))?;
    Ok(pem.as_str().to_owned())
}

/// Generate a full dev PKI (CA + responder + initiator).
pub fn generate_dev_pki(
    server_names: &[&str],
    key_passphrase: Option<&str>,
) -> Result<DevPki, CertError> {
    let ca = generate_ca("tlschat Dev")?;
    let server = generate_server_cert(&ca, server_names, key_passphrase)?;
    let client = generate_client_cert(&ca, "tlschat initiator", key_passphrase)?;

    Ok(DevPki {
        ca_cert_pem: ca.ca_cert_pem,
        server,
        client,
    })
}

/// Write a dev PKI to disk using the standard file names.
pub fn write_dev_pki(dir: &Path, pki: &DevPki) -> Result<DevPkiPaths, CertError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| CertError::Io(format!("Failed to create cert dir: {e}")))?;

    let paths = DevPkiPaths::in_dir(dir);
    let files = [
        (&paths.ca_cert, &pki.ca_cert_pem),
        (&paths.server_cert, &pki.server.cert_pem),
        (&paths.server_key, &pki.server.key_pem),
        (&paths.client_cert, &pki.client.cert_pem),
        (&paths.client_key, &pki.client.key_pem),
    ];
    for (path, contents) in files {
        std::fs::write(path, contents)
            .map_err(|e| CertError::Io(format!("Failed to write {}: {e}", path.display())))?;
    }

    info!(
        dir = %dir.display(),
        "Dev certificates written"
    );

    Ok(paths)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::needless_pass_by_value
)]
mod tests {
    use super::*;
    use crate::keys::decrypt_private_key_pem;

    #[test]
    fn generate_ca_produces_valid_pem() {
        let ca = generate_ca("tlschat Test").unwrap();
        assert!(ca.ca_cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(ca.ca_cert_pem.contains("END CERTIFICATE"));
    }

    #[test]
    fn plain_keys_without_passphrase() {
        let pki = generate_dev_pki(&["localhost"], None).unwrap();
        assert!(pki.server.key_pem.contains("BEGIN PRIVATE KEY"));
        assert!(pki.client.key_pem.contains("BEGIN PRIVATE KEY"));
        assert_ne!(pki.server.cert_pem, pki.client.cert_pem);
        assert_ne!(pki.ca_cert_pem, pki.server.cert_pem);
    }

    #[test]
    fn encrypted_key_roundtrips_with_passphrase() {
        let ca = generate_ca("tlschat Test").unwrap();
        let bundle = generate_client_cert(&ca, "peer", Some("123456")).unwrap();
        assert!(bundle.key_pem.contains("BEGIN ENCRYPTED PRIVATE KEY"));

        let der = decrypt_private_key_pem(&bundle.key_pem, "123456")
            .unwrap()
            .expect("encrypted block present");
        assert!(PrivateKeyInfo::try_from(der.as_slice()).is_ok());
    }

    #[test]
    fn encrypted_key_rejects_wrong_passphrase() {
        let ca = generate_ca("tlschat Test").unwrap();
        let bundle = generate_server_cert(&ca, &["localhost"], Some("123456")).unwrap();
        assert!(decrypt_private_key_pem(&bundle.key_pem, "654321").is_err());
    }

    #[test]
    fn write_dev_pki_creates_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let pki = generate_dev_pki(&["localhost", "127.0.0.1"], Some("pw")).unwrap();
        let paths = write_dev_pki(dir.path(), &pki).unwrap();

        for path in [
            &paths.ca_cert,
            &paths.server_cert,
            &paths.server_key,
            &paths.client_cert,
            &paths.client_key,
        ] {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert_eq!(paths.ca_cert, dir.path().join("ca-cert.pem"));
    }
}
