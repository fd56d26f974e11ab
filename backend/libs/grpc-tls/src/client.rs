//! Client-side TLS configuration
//!
//! Used by callers of a mutual-TLS service: trusts the server's CA and
//! presents a client certificate when one is configured.

use crate::error::{CredentialError, CredentialResult};
use std::fs;
use std::path::Path;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use tracing::info;

/// TLS configuration for gRPC client
#[derive(Clone)]
pub struct MtlsClientConfig {
    /// Server CA certificate to trust (PEM format)
    server_ca_cert: String,
    /// Client certificate and key for mTLS (PEM format)
    identity: Option<(String, String)>,
    /// Server domain name for certificate validation
    domain_name: String,
}

impl MtlsClientConfig {
    /// Client that trusts `server_ca_cert` but presents no certificate.
    pub fn new(server_ca_cert: impl Into<String>, domain_name: impl Into<String>) -> Self {
        Self {
            server_ca_cert: server_ca_cert.into(),
            identity: None,
            domain_name: domain_name.into(),
        }
    }

    /// Present `cert_pem`/`key_pem` during the handshake.
    pub fn with_identity(mut self, cert_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        self.identity = Some((cert_pem.into(), key_pem.into()));
        self
    }

    /// Load CA, client certificate and client key from disk.
    pub fn from_paths(
        ca_cert_path: &Path,
        client_cert_path: &Path,
        client_key_path: &Path,
        domain_name: impl Into<String>,
    ) -> CredentialResult<Self> {
        let config = Self::new(read(ca_cert_path)?, domain_name)
            .with_identity(read(client_cert_path)?, read(client_key_path)?);

        info!(
            ca_cert = ?ca_cert_path,
            client_cert = ?client_cert_path,
            domain = %config.domain_name,
            "mTLS client configuration loaded"
        );

        Ok(config)
    }

    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    /// Build tonic ClientTlsConfig
    pub fn build_client_tls(&self) -> ClientTlsConfig {
        let mut tls_config = ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(&self.server_ca_cert))
            .domain_name(&self.domain_name);

        if let Some((cert, key)) = &self.identity {
            tls_config = tls_config.identity(Identity::from_pem(cert, key));
        }

        tls_config
    }
}

fn read(path: &Path) -> CredentialResult<String> {
    fs::read_to_string(path).map_err(|e| CredentialError::CertificateReadError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert_generation::{generate_dev_certificates, write_cert_bundle};
    use tempfile::TempDir;

    #[test]
    fn test_client_config_from_paths() {
        let bundle = generate_dev_certificates().unwrap();
        let temp_dir = TempDir::new().unwrap();
        write_cert_bundle(&bundle, temp_dir.path()).unwrap();

        let config = MtlsClientConfig::from_paths(
            &temp_dir.path().join("ca.crt"),
            &temp_dir.path().join("client.crt"),
            &temp_dir.path().join("client.key"),
            "localhost",
        )
        .unwrap();

        assert_eq!(config.domain_name(), "localhost");
        assert!(config.identity.is_some());
        let _tls = config.build_client_tls();
    }

    #[test]
    fn test_client_config_missing_key() {
        let bundle = generate_dev_certificates().unwrap();
        let temp_dir = TempDir::new().unwrap();
        write_cert_bundle(&bundle, temp_dir.path()).unwrap();

        let result = MtlsClientConfig::from_paths(
            &temp_dir.path().join("ca.crt"),
            &temp_dir.path().join("client.crt"),
            &temp_dir.path().join("missing.key"),
            "localhost",
        );

        assert!(matches!(
            result,
            Err(CredentialError::CertificateReadError { .. })
        ));
    }
}
