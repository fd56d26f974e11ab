//! X.509 helpers shared by the credential loader and the audit interceptor
//!
//! PEM input is parsed strictly: every PEM section must be a certificate that
//! decodes as X.509. Unlike a permissive trust-store loader, a damaged block
//! is an error rather than something to skip.

use crate::error::{CredentialError, CredentialResult};
use rustls::pki_types::CertificateDer;
use rustls_pemfile::Item;
use std::path::Path;
use tracing::{info, warn};
use x509_parser::prelude::*;

/// Parse every PEM section in `pem` as an X.509 certificate.
///
/// Returns an empty vector when the input holds no PEM sections at all; the
/// caller decides whether that is acceptable.
pub fn parse_pem_certificates(pem: &str) -> CredentialResult<Vec<CertificateDer<'static>>> {
    parse_certificates_from(pem, Path::new("memory"))
}

pub(crate) fn parse_certificates_from(
    pem: &str,
    path: &Path,
) -> CredentialResult<Vec<CertificateDer<'static>>> {
    let mut certificates = Vec::new();

    for item in rustls_pemfile::read_all(&mut pem.as_bytes()) {
        let item = item.map_err(|e| CredentialError::CertificateParseError {
            path: path.to_path_buf(),
            reason: format!("malformed PEM block: {}", e),
        })?;

        match item {
            Item::X509Certificate(der) => {
                X509Certificate::from_der(der.as_ref()).map_err(|e| {
                    CredentialError::CertificateParseError {
                        path: path.to_path_buf(),
                        reason: format!("X.509 parse failed: {}", e),
                    }
                })?;
                certificates.push(der);
            }
            _ => {
                return Err(CredentialError::CertificateParseError {
                    path: path.to_path_buf(),
                    reason: "unexpected non-certificate PEM section".to_string(),
                });
            }
        }
    }

    Ok(certificates)
}

/// Subject distinguished name of a DER certificate, e.g. `CN=client, O=Acme`.
pub fn certificate_subject(der: &[u8]) -> CredentialResult<String> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| CredentialError::CertificateParseError {
            path: "memory".into(),
            reason: format!("X.509 parse failed: {}", e),
        })?;

    Ok(cert.subject().to_string())
}

/// Validate certificate expiration
///
/// Fails once the certificate has expired and warns when fewer than
/// `warn_days_before` days remain. Returns the number of whole days left.
pub fn validate_cert_expiration(cert_pem: &str, warn_days_before: u64) -> CredentialResult<i64> {
    let pem = ::pem::parse(cert_pem)?;

    let (_, cert) = X509Certificate::from_der(pem.contents()).map_err(|e| {
        CredentialError::CertificateParseError {
            path: "memory".into(),
            reason: format!("X.509 parse failed: {}", e),
        }
    })?;

    let expiry_timestamp = cert.validity().not_after.timestamp();
    let now = chrono::Utc::now().timestamp();
    let days_until_expiry = (expiry_timestamp - now) / 86400;

    if expiry_timestamp < now {
        return Err(CredentialError::Expired {
            days_ago: -days_until_expiry,
        });
    }

    if days_until_expiry < warn_days_before as i64 {
        warn!(
            days_remaining = days_until_expiry,
            "Certificate expiring soon - rotation recommended"
        );
    }

    info!(
        days_until_expiry = days_until_expiry,
        "Certificate validity check passed"
    );

    Ok(days_until_expiry)
}
