//! Thin mTLS client for `ThumbnailService`
use crate::grpc::thumbnailer::ThumbnailRequest;
use crate::grpc::ThumbnailServiceClient;
use anyhow::{Context, Result};
use grpc_tls::MtlsClientConfig;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

#[derive(Clone)]
pub struct ThumbnailClient {
    inner: ThumbnailServiceClient<Channel>,
}

impl ThumbnailClient {
    /// Connect to `endpoint` (e.g. `https://localhost:50051`).
    pub async fn connect(endpoint: impl Into<String>, tls: &MtlsClientConfig) -> Result<Self> {
        let endpoint = endpoint.into();
        let channel = Endpoint::from_shared(endpoint.clone())
            .with_context(|| format!("Invalid endpoint {endpoint}"))?
            .connect_timeout(Duration::from_secs(5))
            .tls_config(tls.build_client_tls())
            .context("Failed to configure client TLS")?
            .connect()
            .await
            .with_context(|| format!("Failed to connect to {endpoint}"))?;

        Ok(Self {
            inner: ThumbnailServiceClient::new(channel)
                .max_decoding_message_size(crate::config::DEFAULT_MAX_MESSAGE_BYTES)
                .max_encoding_message_size(crate::config::DEFAULT_MAX_MESSAGE_BYTES),
        })
    }

    /// Send `content` and return the encoded thumbnail.
    pub async fn generate_thumbnail(&mut self, content: Vec<u8>) -> Result<Vec<u8>, Status> {
        let response = self
            .inner
            .generate_thumbnail(ThumbnailRequest { content })
            .await?;
        Ok(response.into_inner().thumbnail)
    }
}
