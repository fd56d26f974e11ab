//! Integration tests for loading the mTLS server identity from disk
//!
//! Each test corrupts exactly one of the three inputs and expects the loader
//! to fail closed.

use grpc_tls::{
    cert_generation::{generate_dev_certificates, write_cert_bundle},
    CredentialError, MtlsClientConfig, ServerIdentity, TlsConfigPaths,
};
use std::fs;
use tempfile::TempDir;

/// Setup test environment with certificates
fn setup_test_env() -> (TempDir, TlsConfigPaths) {
    let temp_dir = TempDir::new().unwrap();
    let bundle = generate_dev_certificates().unwrap();

    write_cert_bundle(&bundle, temp_dir.path()).unwrap();

    let paths = TlsConfigPaths {
        ca_cert_path: temp_dir.path().join("ca.crt"),
        server_cert_path: temp_dir.path().join("server.crt"),
        server_key_path: temp_dir.path().join("server.key"),
    };

    (temp_dir, paths)
}

#[test]
fn test_well_formed_triple_loads() {
    let (_temp, paths) = setup_test_env();

    let identity = ServerIdentity::load(&paths).expect("identity should load");
    let _tls = identity.server_tls_config();
}

#[test]
fn test_corrupted_certificate_fails() {
    let (_temp, paths) = setup_test_env();
    let original = fs::read_to_string(&paths.server_cert_path).unwrap();
    let truncated: String = original.lines().take(4).collect::<Vec<_>>().join("\n");
    fs::write(&paths.server_cert_path, truncated).unwrap();

    let result = ServerIdentity::load(&paths);
    assert!(matches!(
        result,
        Err(CredentialError::CertificateParseError { .. })
    ));
}

#[test]
fn test_corrupted_key_fails() {
    let (_temp, paths) = setup_test_env();
    fs::write(&paths.server_key_path, "this is not a key").unwrap();

    let result = ServerIdentity::load(&paths);
    assert!(matches!(
        result,
        Err(CredentialError::PrivateKeyParseError { .. })
    ));
}

#[test]
fn test_key_from_another_bundle_fails() {
    let (_temp, paths) = setup_test_env();
    let other = generate_dev_certificates().unwrap();
    fs::write(&paths.server_key_path, &other.server_key).unwrap();

    let result = ServerIdentity::load(&paths);
    assert!(matches!(result, Err(CredentialError::KeyMismatch { .. })));
}

#[test]
fn test_ca_bundle_without_certificates_fails() {
    let (_temp, paths) = setup_test_env();
    fs::write(&paths.ca_cert_path, "# no certificates here\n").unwrap();

    let result = ServerIdentity::load(&paths);
    assert!(matches!(
        result,
        Err(CredentialError::EmptyTrustBundle { .. })
    ));
}

#[test]
fn test_ca_bundle_with_invalid_block_fails() {
    let (_temp, paths) = setup_test_env();
    let mut ca = fs::read_to_string(&paths.ca_cert_path).unwrap();
    ca.push_str("-----BEGIN CERTIFICATE-----\nAAECAwQFBgcICQ==\n-----END CERTIFICATE-----\n");
    fs::write(&paths.ca_cert_path, ca).unwrap();

    let result = ServerIdentity::load(&paths);
    assert!(matches!(
        result,
        Err(CredentialError::InvalidTrustBundle { .. })
    ));
}

#[test]
fn test_invalid_certificate_path() {
    let paths = TlsConfigPaths {
        ca_cert_path: "/nonexistent/ca.crt".into(),
        server_cert_path: "/nonexistent/server.crt".into(),
        server_key_path: "/nonexistent/server.key".into(),
    };

    match ServerIdentity::load(&paths).unwrap_err() {
        CredentialError::CertificateReadError { path, .. } => {
            assert_eq!(path, std::path::PathBuf::from("/nonexistent/server.crt"));
        }
        other => panic!("Expected CertificateReadError, got {other:?}"),
    }
}

#[test]
fn test_client_config_from_written_bundle() {
    let (temp, _paths) = setup_test_env();

    let config = MtlsClientConfig::from_paths(
        &temp.path().join("ca.crt"),
        &temp.path().join("client.crt"),
        &temp.path().join("client.key"),
        "localhost",
    )
    .expect("client config should load");

    let _tls = config.build_client_tls();
}
