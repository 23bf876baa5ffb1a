//! KeyMaterial Codec
//!
//! Converts certificates and RSA private keys to and from the on-disk PEM
//! format used for every artifact the bootstrap writes:
//!
//! - certificates as a `CERTIFICATE` block holding the DER certificate
//! - private keys as an `RSA PRIVATE KEY` block holding PKCS#1 DER
//!
//! Decoding distinguishes two failure modes. Input that is not a PEM block of
//! the expected label is [`CodecError::MalformedPem`]; a well-formed block
//! whose body does not parse is [`CodecError::MalformedKeyOrCert`].
//!
//! Files are written through a temporary file in the destination directory
//! and then persisted without clobbering, so a path either holds the complete
//! contents or does not exist.

use std::io::Write;
use std::path::{Path, PathBuf};

use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::X509;
use pem::{EncodeConfig, LineEnding, Pem};
use tempfile::NamedTempFile;

use crate::error::CodecError;

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";

const CERTIFICATE_EXTENSION: &str = "crt";
const PRIVATE_KEY_EXTENSION: &str = "key";

const PRIVATE_KEY_MODE: u32 = 0o600;

/// Encode a certificate as a PEM `CERTIFICATE` block.
pub fn encode_certificate(certificate: &X509) -> Result<String, CodecError> {
    let der = certificate
        .to_der()
        .map_err(|source| CodecError::Serialize {
            what: "certificate",
            source,
        })?;
    Ok(encode_block(CERTIFICATE_LABEL, der))
}

/// Encode an RSA private key as a PEM `RSA PRIVATE KEY` block (PKCS#1).
pub fn encode_private_key(private_key: &PKey<Private>) -> Result<String, CodecError> {
    let der = private_key
        .rsa()
        .and_then(|rsa| rsa.private_key_to_der())
        .map_err(|source| CodecError::Serialize {
            what: "RSA private key",
            source,
        })?;
    Ok(encode_block(RSA_PRIVATE_KEY_LABEL, der))
}

/// Decode a PEM `CERTIFICATE` block.
pub fn decode_certificate(input: &[u8]) -> Result<X509, CodecError> {
    let block = decode_block(input, CERTIFICATE_LABEL)?;
    X509::from_der(block.contents()).map_err(|source| CodecError::MalformedKeyOrCert {
        expected: "X.509 certificate",
        context: CERTIFICATE_LABEL.to_string(),
        source,
    })
}

/// Decode a PEM `RSA PRIVATE KEY` block.
pub fn decode_private_key(input: &[u8]) -> Result<PKey<Private>, CodecError> {
    let block = decode_block(input, RSA_PRIVATE_KEY_LABEL)?;
    Rsa::private_key_from_der(block.contents())
        .and_then(PKey::from_rsa)
        .map_err(|source| CodecError::MalformedKeyOrCert {
            expected: "PKCS#1 RSA private key",
            context: RSA_PRIVATE_KEY_LABEL.to_string(),
            source,
        })
}

fn encode_block(label: &str, der: Vec<u8>) -> String {
    let block = Pem::new(label, der);
    pem::encode_config(&block, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

fn decode_block(input: &[u8], expected_label: &str) -> Result<Pem, CodecError> {
    let block = pem::parse(input).map_err(|e| CodecError::MalformedPem {
        context: expected_label.to_string(),
        reason: e.to_string(),
    })?;
    if block.tag() != expected_label {
        return Err(CodecError::MalformedPem {
            context: expected_label.to_string(),
            reason: format!("expected `{}` block, found `{}`", expected_label, block.tag()),
        });
    }
    Ok(block)
}

/// Write `contents` to `path`, all or nothing.
///
/// The data goes to a temporary file next to `path` first and is then moved
/// into place. An already existing `path` is never replaced; that case is an
/// I/O error of kind `AlreadyExists`.
pub fn write_pem_file(path: &Path, contents: &str) -> Result<(), CodecError> {
    write_file(path, contents, None)
}

/// Like [`write_pem_file`], but the file is owner-readable only on Unix.
pub fn write_secret_file(path: &Path, contents: &str) -> Result<(), CodecError> {
    write_file(path, contents, Some(PRIVATE_KEY_MODE))
}

fn write_file(path: &Path, contents: &str, mode: Option<u32>) -> Result<(), CodecError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(parent).map_err(CodecError::io(parent))?;
    staged
        .write_all(contents.as_bytes())
        .and_then(|_| staged.as_file().sync_all())
        .map_err(CodecError::io(staged.path()))?;

    if let Some(mode) = mode {
        restrict_permissions(staged.as_file(), mode).map_err(CodecError::io(staged.path()))?;
    }

    staged
        .persist_noclobber(path)
        .map_err(|e| CodecError::Io {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>, CodecError> {
    std::fs::read(path).map_err(CodecError::io(path))
}

/// Read and decode a PEM certificate file.
pub fn read_certificate(path: &Path) -> Result<X509, CodecError> {
    decode_certificate(&read_file(path)?).map_err(|e| with_path(e, path))
}

/// Read and decode a PEM RSA private key file.
pub fn read_private_key(path: &Path) -> Result<PKey<Private>, CodecError> {
    decode_private_key(&read_file(path)?).map_err(|e| with_path(e, path))
}

fn with_path(err: CodecError, path: &Path) -> CodecError {
    let location = path.display().to_string();
    match err {
        CodecError::MalformedPem { reason, .. } => CodecError::MalformedPem {
            context: location,
            reason,
        },
        CodecError::MalformedKeyOrCert {
            expected, source, ..
        } => CodecError::MalformedKeyOrCert {
            expected,
            context: location,
            source,
        },
        other => other,
    }
}

/// A certificate together with the private key of its subject.
pub struct KeyMaterial {
    pub certificate: X509,
    pub private_key: PKey<Private>,
}

impl KeyMaterial {
    pub fn new(certificate: X509, private_key: PKey<Private>) -> Self {
        Self {
            certificate,
            private_key,
        }
    }

    /// Path of `<dir>/<name>.crt`.
    pub fn certificate_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.{}", name, CERTIFICATE_EXTENSION))
    }

    /// Path of `<dir>/<name>.key`.
    pub fn private_key_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.{}", name, PRIVATE_KEY_EXTENSION))
    }

    /// Persist as `<dir>/<name>.crt` and `<dir>/<name>.key`.
    ///
    /// Both encodings are produced before anything touches the disk. The key
    /// file is owner-readable only on Unix.
    pub fn save(&self, dir: &Path, name: &str) -> Result<(PathBuf, PathBuf), CodecError> {
        let certificate_pem = encode_certificate(&self.certificate)?;
        let private_key_pem = encode_private_key(&self.private_key)?;

        let certificate_path = Self::certificate_path(dir, name);
        let private_key_path = Self::private_key_path(dir, name);
        write_pem_file(&certificate_path, &certificate_pem)?;
        write_file(&private_key_path, &private_key_pem, Some(PRIVATE_KEY_MODE))?;

        Ok((certificate_path, private_key_path))
    }

    /// Load `<dir>/<name>.crt` and `<dir>/<name>.key`.
    pub fn load(dir: &Path, name: &str) -> Result<Self, CodecError> {
        let certificate = read_certificate(&Self::certificate_path(dir, name))?;
        let private_key = read_private_key(&Self::private_key_path(dir, name))?;
        Ok(Self::new(certificate, private_key))
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("subject", &self.certificate.subject_name())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
