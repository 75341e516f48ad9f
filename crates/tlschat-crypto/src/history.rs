//! Encrypted, append-only chat history.
//!
//! One record per line. A line is the uppercase hex rendering of the
//! SM4-CBC ciphertext of a formatted record; nothing else is written.
//! Readers skip blank and non-hex lines, and surface lines that fail to
//! decrypt as errors without stopping.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::{Local, NaiveDateTime};
use sm3::{Digest, Sm3};
use sm4::Sm4;
use tracing::trace;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

type Sm4CbcEnc = cbc::Encryptor<Sm4>;
type Sm4CbcDec = cbc::Decryptor<Sm4>;

/// SM4 key and CBC IV size.
pub const KEY_SIZE: usize = 16;

/// Timestamp layout inside a formatted record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Key and IV derived from a passphrase.
///
/// `SM3(passphrase)`: the first half is the key, the second half the IV.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_SIZE],
    iv: [u8; KEY_SIZE],
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey").finish_non_exhaustive()
    }
}

impl DerivedKey {
    pub const fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub const fn iv(&self) -> &[u8; KEY_SIZE] {
        &self.iv
    }

    /// Encrypt with PKCS#7 padding.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Sm4CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Decrypt and strip PKCS#7 padding.
    ///
    /// A wrong key almost always surfaces here as invalid padding.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Sm4CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}

/// Derive the history key material from a passphrase.
pub fn derive_key(passphrase: &str) -> DerivedKey {
    let mut digest = Sm3::digest(passphrase.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    let mut iv = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest[..KEY_SIZE]);
    iv.copy_from_slice(&digest[KEY_SIZE..]);
    digest.as_mut_slice().zeroize();
    DerivedKey { key, iv }
}

/// Render `"[timestamp] label: message"`, always newline-terminated.
pub fn format_record(timestamp: &NaiveDateTime, label: &str, message: &str) -> String {
    let mut text = format!("[{}] {label}: {message}", timestamp.format(TIMESTAMP_FORMAT));
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Encrypt one formatted record and render it as an uppercase hex line.
pub fn encrypt_record(
    key: &DerivedKey,
    label: &str,
    message: &str,
    timestamp: &NaiveDateTime,
) -> String {
    let record = format_record(timestamp, label, message);
    hex::encode_upper(key.encrypt(record.as_bytes()))
}

/// Append one hex line to the history file, creating it if needed.
///
/// The line and its terminator go out in a single append write, and the
/// handle is closed before returning.
pub fn append_record(path: &Path, hex_line: &str) -> Result<(), CryptoError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = String::with_capacity(hex_line.len() + 1);
    line.push_str(hex_line);
    line.push('\n');
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Open `path` for decoding with a key derived from `passphrase`.
///
/// Each call starts again from the top of the file. Fails only if the file
/// cannot be opened.
pub fn decrypt_log(path: &Path, passphrase: &str) -> Result<HistoryReader, CryptoError> {
    HistoryReader::open(path, derive_key(passphrase))
}

/// Lazy line-by-line decoder over a history file.
///
/// Yields `Ok(text)` for every recovered record and
/// `Err(CryptoError::DecryptionFailed)` for hex lines that do not decrypt.
/// Blank and non-hex lines are skipped. A read error is yielded once and
/// ends the sequence.
pub struct HistoryReader {
    lines: io::Split<BufReader<File>>,
    key: DerivedKey,
    line_no: usize,
    done: bool,
}

impl HistoryReader {
    fn open(path: &Path, key: DerivedKey) -> Result<Self, CryptoError> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).split(b'\n'),
            key,
            line_no: 0,
            done: false,
        })
    }
}

impl Iterator for HistoryReader {
    type Item = Result<String, CryptoError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let raw = match self.lines.next()? {
                Ok(raw) => raw,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };
            self.line_no += 1;

            let line = trim_line_end(&raw);
            if line.is_empty() {
                continue;
            }
            let Ok(ciphertext) = hex::decode(line) else {
                trace!(line = self.line_no, "Skipping non-hex history line");
                continue;
            };

            let line_no = self.line_no;
            return Some(
                self.key
                    .decrypt(&ciphertext)
                    .map(|plain| String::from_utf8_lossy(&plain).into_owned())
                    .map_err(|e| CryptoError::DecryptionFailed(format!("line {line_no}: {e}"))),
            );
        }
    }
}

fn trim_line_end(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\r' | b'\n'] = line {
        line = rest;
    }
    line
}

/// History file bound to one passphrase.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
    key: DerivedKey,
}

impl HistoryLog {
    /// No I/O happens until the first record is written or read.
    pub fn open(path: impl Into<PathBuf>, passphrase: &str) -> Self {
        Self {
            path: path.into(),
            key: derive_key(passphrase),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypt and append a record stamped with the current local time.
    pub fn record(&self, label: &str, message: &str) -> Result<(), CryptoError> {
        self.record_at(label, message, &Local::now().naive_local())
    }

    pub fn record_at(
        &self,
        label: &str,
        message: &str,
        timestamp: &NaiveDateTime,
    ) -> Result<(), CryptoError> {
        let line = encrypt_record(&self.key, label, message, timestamp);
        append_record(&self.path, &line)
    }

    /// Decode the file with this log's own key.
    pub fn read(&self) -> Result<HistoryReader, CryptoError> {
        HistoryReader::open(&self.path, self.key.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const VECTOR_HEX: &str = "19A8A865E9D37262929E1F9AE702D15F884DD3CB2F44A877735FC336F27ACC02A1FDDDC0BE38448BFA9D6B26AC966846";

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn derive_key_matches_sm3_halves() {
        let key = derive_key("123456");
        assert_eq!(hex::encode(key.key()), "207cf410532f92a47dee245ce9b11ff7");
        assert_eq!(hex::encode(key.iv()), "1f578ebd763eb3bbea44ebd043d018fb");
    }

    #[test]
    fn derive_key_is_deterministic() {
        assert_eq!(derive_key("correct horse"), derive_key("correct horse"));
        assert_ne!(derive_key("correct horse"), derive_key("correct horse "));
    }

    #[test]
    fn format_record_appends_newline_once() {
        let t = fixed_time();
        assert_eq!(
            format_record(&t, "Client", "hello"),
            "[2024-01-01 12:00:00] Client: hello\n"
        );
        assert_eq!(
            format_record(&t, "Client", "hello\n"),
            "[2024-01-01 12:00:00] Client: hello\n"
        );
    }

    #[test]
    fn encrypt_record_matches_reference_vector() {
        let key = derive_key("123456");
        let line = encrypt_record(&key, "Client", "hello\n", &fixed_time());
        assert_eq!(line, VECTOR_HEX);
    }

    #[test]
    fn encrypt_record_is_uppercase_hex_of_whole_blocks() {
        let key = derive_key("pw");
        let line = encrypt_record(&key, "Server", "multi\nline", &fixed_time());
        assert!(line.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(line.len() % 32, 0);
    }

    #[test]
    fn empty_plaintext_still_produces_a_padding_block() {
        let key = derive_key("123456");
        assert_eq!(hex::encode_upper(key.encrypt(b"")), "6EFE0AD108A8A86FFB577609FFB90EB3");
        assert_eq!(key.decrypt(&key.encrypt(b"")).unwrap(), b"");
    }

    #[test]
    fn decrypt_rejects_truncated_ciphertext() {
        let key = derive_key("123456");
        let ct = hex::decode(VECTOR_HEX).unwrap();
        assert!(key.decrypt(&ct[..ct.len() - 3]).is_err());
    }

    #[test]
    fn trim_line_end_strips_crlf() {
        assert_eq!(trim_line_end(b"ABCD\r\n"), b"ABCD");
        assert_eq!(trim_line_end(b"\r"), b"");
        assert_eq!(trim_line_end(b"AB"), b"AB");
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let rendered = format!("{:?}", derive_key("123456"));
        assert!(!rendered.contains("207cf410"));
    }
}
