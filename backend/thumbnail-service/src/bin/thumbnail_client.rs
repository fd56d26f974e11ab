//! Send an image to a running thumbnail service and write the PNG thumbnail
//!
//! Usage: thumbnail-client <input-image> <output.png>
//!
//! Environment:
//! - `THUMBNAIL_SERVICE_URL` (default `https://localhost:50051`)
//! - `GRPC_CA_CERT_PATH`, `GRPC_CLIENT_CERT_PATH`, `GRPC_CLIENT_KEY_PATH`
//! - `GRPC_TLS_DOMAIN_NAME` (default `localhost`)

use anyhow::{bail, Context, Result};
use grpc_tls::MtlsClientConfig;
use std::path::PathBuf;
use thumbnail_service::ThumbnailClient;
use tracing::info;

fn env_path(name: &str) -> Result<PathBuf> {
    std::env::var(name)
        .map(PathBuf::from)
        .with_context(|| format!("{name} must be set"))
}

#[tokio::main]
async fn main() -> Result<()> {
    grpc_tls::install_crypto_provider();

    if cfg!(debug_assertions) {
        let _ = dotenvy::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [input, output] = args.as_slice() else {
        bail!("usage: thumbnail-client <input-image> <output.png>");
    };

    let url = std::env::var("THUMBNAIL_SERVICE_URL")
        .unwrap_or_else(|_| "https://localhost:50051".into());
    let domain = std::env::var("GRPC_TLS_DOMAIN_NAME").unwrap_or_else(|_| "localhost".into());

    let tls = MtlsClientConfig::from_paths(
        &env_path("GRPC_CA_CERT_PATH")?,
        &env_path("GRPC_CLIENT_CERT_PATH")?,
        &env_path("GRPC_CLIENT_KEY_PATH")?,
        domain,
    )?;

    let content = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {input}"))?;

    let mut client = ThumbnailClient::connect(url.clone(), &tls).await?;
    let thumbnail = client
        .generate_thumbnail(content)
        .await
        .with_context(|| format!("GenerateThumbnail failed against {url}"))?;

    tokio::fs::write(output, &thumbnail)
        .await
        .with_context(|| format!("Failed to write {output}"))?;

    info!(output = %output, bytes = thumbnail.len(), "Thumbnail written");
    Ok(())
}
