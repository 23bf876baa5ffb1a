//! Error taxonomy for the bootstrap run.
//!
//! Every failure carries a distinct process exit code so scripts driving the
//! binary can tell a dirty destination apart from a broken `keytool`.

use std::path::PathBuf;
use std::time::Duration;

use openssl::error::ErrorStack;
use thiserror::Error;

use crate::keystore::PipelineStage;

/// Failures of the PEM codec and of reading/writing key material files.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input is not a PEM block of the expected label.
    #[error("malformed PEM ({context}): {reason}")]
    MalformedPem { context: String, reason: String },

    /// The PEM block decoded but its DER body is not the expected structure.
    #[error("malformed {expected} in PEM block ({context}): {source}")]
    MalformedKeyOrCert {
        expected: &'static str,
        context: String,
        #[source]
        source: ErrorStack,
    },

    /// Serialising in-memory material to DER failed.
    #[error("failed to serialise {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: ErrorStack,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for CA issuance, leaf issuance and keystore provisioning.
#[derive(Debug, Error)]
pub enum PkiError {
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Destination not creatable, not a directory, or not empty.
    #[error("precondition failed for {path}: {reason}")]
    PreconditionFailed { path: PathBuf, reason: String },

    #[error("key generation failed: {0}")]
    KeyGenerationFailed(#[source] ErrorStack),

    #[error("certificate construction failed ({step}): {source}")]
    CertificateConstructionFailed {
        step: &'static str,
        #[source]
        source: ErrorStack,
    },

    #[error(transparent)]
    PemCodec(#[from] CodecError),

    #[error("CA `{ca_name}` unavailable in {dir}: {source}")]
    CaUnavailable {
        ca_name: String,
        dir: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("issuance of `{leaf}` failed: {source}")]
    IssuanceFailed {
        leaf: String,
        #[source]
        source: Box<PkiError>,
    },

    #[error("keystore pipeline for `{role}` failed before reaching {stage}: `{tool}` {}", describe_status(.status))]
    ExternalToolFailed {
        role: String,
        stage: PipelineStage,
        tool: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("keystore pipeline for `{role}` timed out before reaching {stage}: `{tool}` ran longer than {timeout:?}")]
    ExternalToolTimeout {
        role: String,
        stage: PipelineStage,
        tool: String,
        timeout: Duration,
    },

    #[error("failed to read password: {0}")]
    InteractiveInputFailed(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exited with status {code}"),
        None => "did not complete".to_string(),
    }
}

impl PkiError {
    pub(crate) fn construction(step: &'static str) -> impl FnOnce(ErrorStack) -> PkiError {
        move |source| PkiError::CertificateConstructionFailed { step, source }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> PkiError {
        let path = path.into();
        move |source| PkiError::Io { path, source }
    }

    /// Process exit code for this failure category.
    pub fn exit_code(&self) -> i32 {
        match self {
            PkiError::Config(_) => 10,
            PkiError::PreconditionFailed { .. } => 11,
            PkiError::KeyGenerationFailed(_) => 12,
            PkiError::CertificateConstructionFailed { .. } => 13,
            PkiError::PemCodec(_) => 14,
            PkiError::CaUnavailable { .. } => 15,
            PkiError::IssuanceFailed { source, .. } => source.exit_code(),
            PkiError::ExternalToolFailed { .. } => 16,
            PkiError::ExternalToolTimeout { .. } => 17,
            PkiError::InteractiveInputFailed(_) => 18,
            PkiError::Io { .. } => 19,
        }
    }
}

impl CodecError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> CodecError {
        let path = path.into();
        move |source| CodecError::Io { path, source }
    }
}
