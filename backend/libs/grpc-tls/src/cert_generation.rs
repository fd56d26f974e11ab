//! Certificate Generation for Development and Testing
//!
//! Generates a throwaway CA plus a server and a client certificate signed by
//! it, enough to run the thumbnail service with mutual TLS locally.
//! **WARNING**: NEVER use in production - use proper CA-signed certificates.

use anyhow::{Context, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, SanType,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const DEV_ORGANIZATION: &str = "Thumbnailer Development";

/// Bundle of certificates for development
#[derive(Clone)]
pub struct CertificateBundle {
    /// CA certificate (PEM)
    pub ca_cert: String,
    /// CA private key (PEM)
    pub ca_key: String,
    /// Server certificate signed by CA (PEM)
    pub server_cert: String,
    /// Server private key (PEM)
    pub server_key: String,
    /// Client certificate for mTLS (PEM)
    pub client_cert: String,
    /// Client private key (PEM)
    pub client_key: String,
}

/// Generate development certificates (CA, server, client)
///
/// **Subject**: CN=Thumbnailer Development CA / CN=localhost / CN=client
pub fn generate_dev_certificates() -> Result<CertificateBundle> {
    generate_certificate_bundle("client")
}

/// Generate a CA, a `localhost` server certificate and a client certificate
/// whose common name is `client_common_name`.
pub fn generate_certificate_bundle(client_common_name: &str) -> Result<CertificateBundle> {
    // 1. CA
    let mut ca_params = CertificateParams::default();
    ca_params.distinguished_name = distinguished_name("Thumbnailer Development CA");
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

    let ca_keypair = KeyPair::generate()?;
    let ca_cert = ca_params
        .self_signed(&ca_keypair)
        .context("Failed to generate CA certificate")?;

    // 2. Server certificate signed by CA
    let mut server_params = CertificateParams::default();
    server_params.distinguished_name = distinguished_name("localhost");
    server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    server_params.subject_alt_names.push(SanType::DnsName(
        "localhost"
            .try_into()
            .context("Failed to create SAN for localhost")?,
    ));
    server_params
        .subject_alt_names
        .push(SanType::IpAddress(std::net::IpAddr::V4(
            std::net::Ipv4Addr::new(127, 0, 0, 1),
        )));

    let server_keypair = KeyPair::generate()?;
    let server_cert = server_params
        .signed_by(&server_keypair, &ca_cert, &ca_keypair)
        .context("Failed to sign server certificate")?;

    // 3. Client certificate for mTLS
    let mut client_params = CertificateParams::default();
    client_params.distinguished_name = distinguished_name(client_common_name);
    client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

    let client_keypair = KeyPair::generate()?;
    let client_cert = client_params
        .signed_by(&client_keypair, &ca_cert, &ca_keypair)
        .context("Failed to sign client certificate")?;

    info!(
        client_common_name = client_common_name,
        "Generated development certificates (CA, server, client)"
    );

    Ok(CertificateBundle {
        ca_cert: ca_cert.pem(),
        ca_key: ca_keypair.serialize_pem(),
        server_cert: server_cert.pem(),
        server_key: server_keypair.serialize_pem(),
        client_cert: client_cert.pem(),
        client_key: client_keypair.serialize_pem(),
    })
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    name.push(DnType::OrganizationName, DEV_ORGANIZATION);
    name
}

/// Write certificate bundle to files
///
/// Creates directory structure:
/// ```text
/// certs/
///   ca.crt        (CA certificate)
///   ca.key        (CA private key)
///   server.crt    (Server certificate)
///   server.key    (Server private key)
///   client.crt    (Client certificate)
///   client.key    (Client private key)
/// ```
pub fn write_cert_bundle(bundle: &CertificateBundle, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory: {:?}", output_dir))?;

    let files = [
        ("ca.crt", &bundle.ca_cert),
        ("ca.key", &bundle.ca_key),
        ("server.crt", &bundle.server_cert),
        ("server.key", &bundle.server_key),
        ("client.crt", &bundle.client_cert),
        ("client.key", &bundle.client_key),
    ];

    for (name, contents) in files {
        fs::write(output_dir.join(name), contents)
            .with_context(|| format!("Failed to write {}", name))?;
    }

    info!(output_dir = ?output_dir, "Certificate bundle written to disk");
    Ok(())
}

/// Environment variables pointing the server and client at a bundle
/// written by [`write_cert_bundle`] into `output_dir`.
pub fn bundle_env_hints(output_dir: &Path) -> Vec<(&'static str, PathBuf)> {
    [
        ("GRPC_CA_CERT_PATH", "ca.crt"),
        ("GRPC_SERVER_CERT_PATH", "server.crt"),
        ("GRPC_SERVER_KEY_PATH", "server.key"),
        ("GRPC_CLIENT_CERT_PATH", "client.crt"),
        ("GRPC_CLIENT_KEY_PATH", "client.key"),
    ]
    .into_iter()
    .map(|(var, file)| (var, output_dir.join(file)))
    .collect()
}
