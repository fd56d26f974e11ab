//! Credential loading errors
//!
//! Every failure while building the server identity is fatal at startup, so
//! the variants carry enough context (file path, parser reason) to fix the
//! deployment without re-running with debug logging.

use std::path::PathBuf;
use thiserror::Error;

pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("environment variable {var_name} is not set: {hint}")]
    MissingEnvVar { var_name: String, hint: String },

    #[error("failed to read {path:?}: {source}")]
    CertificateReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid certificate in {path:?}: {reason}")]
    CertificateParseError { path: PathBuf, reason: String },

    #[error("invalid private key in {path:?}: {reason}")]
    PrivateKeyParseError { path: PathBuf, reason: String },

    #[error("private key {key_path:?} does not match certificate {cert_path:?}")]
    KeyMismatch { cert_path: PathBuf, key_path: PathBuf },

    #[error("CA bundle {path:?} contains no certificates")]
    EmptyTrustBundle { path: PathBuf },

    #[error("invalid CA bundle {path:?}: {reason}")]
    InvalidTrustBundle { path: PathBuf, reason: String },

    #[error("certificate expired {days_ago} days ago")]
    Expired { days_ago: i64 },

    #[error("TLS configuration rejected: {0}")]
    Tls(String),
}

impl From<pem::PemError> for CredentialError {
    fn from(err: pem::PemError) -> Self {
        CredentialError::CertificateParseError {
            path: "memory".into(),
            reason: err.to_string(),
        }
    }
}
