//! gRPC TLS Configuration Library with mTLS Support
//!
//! **Security Features**:
//! - Fail-closed loading of the server identity and client CA bundle
//! - Mandatory client certificate verification (mutual TLS)
//! - Certificate subject extraction for audit logging
//! - Certificate expiry check at load time
//! - Development certificate generation

pub mod cert_generation;
pub mod certificate;
pub mod client;
pub mod error;
pub mod identity;

pub use cert_generation::{
    bundle_env_hints, generate_certificate_bundle, generate_dev_certificates, write_cert_bundle,
    CertificateBundle,
};
pub use certificate::{certificate_subject, parse_pem_certificates, validate_cert_expiration};
pub use client::MtlsClientConfig;
pub use error::{CredentialError, CredentialResult};
pub use identity::{ServerIdentity, TlsConfigPaths};

/// Install aws-lc-rs as the process-wide rustls crypto provider.
///
/// rustls 0.23 requires selecting a CryptoProvider at runtime when more than
/// one backend is compiled in. Calling this more than once is harmless.
pub fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        // A concurrent caller may win the race; either provider install is fine.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}
