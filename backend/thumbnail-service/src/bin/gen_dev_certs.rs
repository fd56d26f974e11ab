//! Generate a development CA plus server and client certificates
//!
//! Usage: gen-dev-certs [output-dir]   (default `./certs`)
//!
//! **WARNING**: for local development only.

use anyhow::Result;
use grpc_tls::{bundle_env_hints, generate_dev_certificates, write_cert_bundle};
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("certs"));

    let bundle = generate_dev_certificates()?;
    write_cert_bundle(&bundle, &output_dir)?;

    for (var, path) in bundle_env_hints(&output_dir) {
        info!(var = var, path = %path.display(), "Export to use the generated bundle");
    }
    Ok(())
}
