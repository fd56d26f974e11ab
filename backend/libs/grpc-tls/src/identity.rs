//! Server identity for mutual TLS
//!
//! [`ServerIdentity::load`] reads the server certificate chain, its private
//! key and the client CA bundle, and refuses to construct an identity unless
//! all three are usable:
//!
//! - the certificate chain and key parse, and the key belongs to the leaf
//! - the CA bundle holds at least one certificate and no damaged PEM blocks
//! - a client certificate verifier can be built over the CA set
//! - the server certificate has not expired
//!
//! The resulting [`ServerTlsConfig`] always requires and verifies a client
//! certificate; clients without one are dropped during the handshake.
//!
//! ```rust,no_run
//! use grpc_tls::{ServerIdentity, TlsConfigPaths};
//!
//! # fn example() -> Result<(), grpc_tls::CredentialError> {
//! let identity = ServerIdentity::load(&TlsConfigPaths::from_env()?)?;
//! let tls_config = identity.server_tls_config();
//! # Ok(())
//! # }
//! ```

use crate::certificate::{certificate_subject, parse_certificates_from, validate_cert_expiration};
use crate::error::{CredentialError, CredentialResult};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::sign::CertifiedKey;
use rustls::RootCertStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tonic::transport::{Certificate, Identity, ServerTlsConfig};
use tracing::{debug, info};

/// Days before expiry at which loading starts warning.
const EXPIRY_WARN_DAYS: u64 = 30;

/// Certificate file paths configuration
#[derive(Debug, Clone)]
pub struct TlsConfigPaths {
    /// CA bundle used to verify client certificates
    pub ca_cert_path: PathBuf,
    /// Server certificate chain
    pub server_cert_path: PathBuf,
    /// Server private key
    pub server_key_path: PathBuf,
}

impl TlsConfigPaths {
    /// Load configuration from environment variables
    ///
    /// Required variables:
    /// - `GRPC_CA_CERT_PATH`: client CA bundle
    /// - `GRPC_SERVER_CERT_PATH`: server certificate
    /// - `GRPC_SERVER_KEY_PATH`: server private key
    pub fn from_env() -> CredentialResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`TlsConfigPaths::from_env`] with a caller supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> CredentialResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var_name: &str, hint: &str| {
            lookup(var_name)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| CredentialError::MissingEnvVar {
                    var_name: var_name.to_string(),
                    hint: hint.to_string(),
                })
        };

        Ok(Self {
            ca_cert_path: required(
                "GRPC_CA_CERT_PATH",
                "Set to the CA bundle that signs client certificates",
            )?,
            server_cert_path: required("GRPC_SERVER_CERT_PATH", "Set to server certificate path")?,
            server_key_path: required("GRPC_SERVER_KEY_PATH", "Set to server private key path")?,
        })
    }
}

/// Validated server credential: certificate chain, private key and the
/// trusted client CA set. Immutable once loaded.
#[derive(Clone)]
pub struct ServerIdentity {
    cert_pem: String,
    key_pem: String,
    ca_pem: String,
    subject: String,
    trust_anchors: usize,
}

impl std::fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("subject", &self.subject)
            .field("trust_anchors", &self.trust_anchors)
            .finish_non_exhaustive()
    }
}

impl ServerIdentity {
    /// Load and validate the identity from disk. No retries: a failure here
    /// is meant to abort process start.
    pub fn load(paths: &TlsConfigPaths) -> CredentialResult<Self> {
        let cert_pem = read_pem_file(&paths.server_cert_path)?;
        let key_pem = read_pem_file(&paths.server_key_path)?;
        let ca_pem = read_pem_file(&paths.ca_cert_path)?;

        let identity = Self::validate(cert_pem, key_pem, ca_pem, paths)?;

        info!(
            ca_cert = ?paths.ca_cert_path,
            server_cert = ?paths.server_cert_path,
            subject = %identity.subject,
            trust_anchors = identity.trust_anchors,
            "mTLS server identity loaded with client certificate verification"
        );

        Ok(identity)
    }

    /// Validate an identity held in memory. Errors report the path `memory`.
    pub fn from_pem(
        cert_pem: impl Into<String>,
        key_pem: impl Into<String>,
        ca_pem: impl Into<String>,
    ) -> CredentialResult<Self> {
        let paths = TlsConfigPaths {
            ca_cert_path: "memory".into(),
            server_cert_path: "memory".into(),
            server_key_path: "memory".into(),
        };
        Self::validate(cert_pem.into(), key_pem.into(), ca_pem.into(), &paths)
    }

    fn validate(
        cert_pem: String,
        key_pem: String,
        ca_pem: String,
        paths: &TlsConfigPaths,
    ) -> CredentialResult<Self> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

        let chain = parse_certificates_from(&cert_pem, &paths.server_cert_path)?;
        if chain.is_empty() {
            return Err(CredentialError::CertificateParseError {
                path: paths.server_cert_path.clone(),
                reason: "no certificate found".to_string(),
            });
        }

        let key = parse_private_key(&key_pem, &paths.server_key_path)?;
        check_key_matches(&provider, chain.clone(), key, paths)?;

        let trust_anchors = build_client_verifier(&provider, &ca_pem, &paths.ca_cert_path)?;

        validate_cert_expiration(&cert_pem, EXPIRY_WARN_DAYS)?;
        let subject = certificate_subject(chain[0].as_ref())?;

        Ok(Self {
            cert_pem,
            key_pem,
            ca_pem,
            subject,
            trust_anchors,
        })
    }

    /// Build Tonic ServerTlsConfig with mandatory client cert verification
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(Identity::from_pem(&self.cert_pem, &self.key_pem))
            .client_ca_root(Certificate::from_pem(&self.ca_pem))
            .client_auth_optional(false)
    }

    /// Subject of the server's leaf certificate.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Number of CA certificates trusted for client verification.
    pub fn trust_anchors(&self) -> usize {
        self.trust_anchors
    }
}

fn read_pem_file(path: &Path) -> CredentialResult<String> {
    fs::read_to_string(path).map_err(|e| CredentialError::CertificateReadError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn parse_private_key(key_pem: &str, path: &Path) -> CredentialResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut key_pem.as_bytes())
        .map_err(|e| CredentialError::PrivateKeyParseError {
            path: path.to_path_buf(),
            reason: format!("malformed PEM block: {}", e),
        })?
        .ok_or_else(|| CredentialError::PrivateKeyParseError {
            path: path.to_path_buf(),
            reason: "no private key found".to_string(),
        })
}

fn check_key_matches(
    provider: &CryptoProvider,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    paths: &TlsConfigPaths,
) -> CredentialResult<()> {
    let signing_key = provider.key_provider.load_private_key(key).map_err(|e| {
        CredentialError::PrivateKeyParseError {
            path: paths.server_key_path.clone(),
            reason: e.to_string(),
        }
    })?;

    match CertifiedKey::new(chain, signing_key).keys_match() {
        Ok(()) => Ok(()),
        // The provider cannot derive a public key for this key type; the
        // handshake itself will still fail on a mismatched pair.
        Err(rustls::Error::InconsistentKeys(rustls::InconsistentKeys::Unknown)) => {
            debug!("Key/certificate consistency could not be checked for this key type");
            Ok(())
        }
        Err(_) => Err(CredentialError::KeyMismatch {
            cert_path: paths.server_cert_path.clone(),
            key_path: paths.server_key_path.clone(),
        }),
    }
}

/// Builds the client verifier to prove the CA set is usable and returns the
/// number of trust anchors.
fn build_client_verifier(
    provider: &Arc<CryptoProvider>,
    ca_pem: &str,
    path: &Path,
) -> CredentialResult<usize> {
    let ca_certs = parse_certificates_from(ca_pem, path).map_err(|e| match e {
        CredentialError::CertificateParseError { path, reason } => {
            CredentialError::InvalidTrustBundle { path, reason }
        }
        other => other,
    })?;

    if ca_certs.is_empty() {
        return Err(CredentialError::EmptyTrustBundle {
            path: path.to_path_buf(),
        });
    }

    let mut roots = RootCertStore::empty();
    for cert in ca_certs {
        roots
            .add(cert)
            .map_err(|e| CredentialError::InvalidTrustBundle {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
    }
    let trust_anchors = roots.len();

    WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| CredentialError::Tls(e.to_string()))?;

    Ok(trust_anchors)
}
