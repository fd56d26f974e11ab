//! Shared fixtures: a throwaway PKI on disk and an in-process server on an
//! ephemeral port.
#![allow(dead_code)]

use grpc_tls::{
    generate_certificate_bundle, generate_dev_certificates, write_cert_bundle, CertificateBundle,
    MtlsClientConfig, ServerIdentity, TlsConfigPaths,
};
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thumbnail_service::processor::{PngEncoder, ProcessedImage, ThumbnailProcessor};
use thumbnail_service::{
    ImageProcessor, LifecycleState, ProcessingError, ServerError, ServerSettings,
    ThumbnailClient, ThumbnailOptions, ThumbnailServer, ThumbnailServiceImpl,
};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TestPki {
    pub dir: TempDir,
    pub bundle: CertificateBundle,
}

impl TestPki {
    pub fn new() -> Self {
        grpc_tls::install_crypto_provider();
        let dir = TempDir::new().unwrap();
        let bundle = generate_dev_certificates().unwrap();
        write_cert_bundle(&bundle, dir.path()).unwrap();
        Self { dir, bundle }
    }

    pub fn paths(&self) -> TlsConfigPaths {
        TlsConfigPaths {
            ca_cert_path: self.dir.path().join("ca.crt"),
            server_cert_path: self.dir.path().join("server.crt"),
            server_key_path: self.dir.path().join("server.key"),
        }
    }

    /// Client presenting the certificate issued by this PKI's CA.
    pub fn client_config(&self) -> MtlsClientConfig {
        MtlsClientConfig::new(self.bundle.ca_cert.clone(), "localhost")
            .with_identity(self.bundle.client_cert.clone(), self.bundle.client_key.clone())
    }

    /// Client that trusts the server but presents no certificate.
    pub fn anonymous_client_config(&self) -> MtlsClientConfig {
        MtlsClientConfig::new(self.bundle.ca_cert.clone(), "localhost")
    }

    /// Client presenting a certificate from an unrelated CA.
    pub fn foreign_client_config(&self) -> MtlsClientConfig {
        let foreign = generate_certificate_bundle("intruder").unwrap();
        MtlsClientConfig::new(self.bundle.ca_cert.clone(), "localhost")
            .with_identity(foreign.client_cert, foreign.client_key)
    }
}

pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub states: watch::Receiver<LifecycleState>,
    pub handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn endpoint(&self) -> String {
        format!("https://{}", self.addr)
    }

    pub async fn connect(&self, tls: &MtlsClientConfig) -> anyhow::Result<ThumbnailClient> {
        ThumbnailClient::connect(self.endpoint(), tls).await
    }
}

pub fn test_settings() -> ServerSettings {
    ServerSettings {
        addr: "127.0.0.1:0".parse().unwrap(),
        drain_timeout: Duration::from_secs(10),
        ..ServerSettings::default()
    }
}

pub async fn spawn_server(
    pki: &TestPki,
    settings: ServerSettings,
    handler: ThumbnailServiceImpl,
) -> RunningServer {
    let identity = ServerIdentity::load(&pki.paths()).unwrap();
    let mut server = ThumbnailServer::new(settings, identity, handler);
    let addr = server.bind().await.unwrap();
    let shutdown = server.shutdown_token();
    let mut states = server.subscribe();

    let handle = tokio::spawn(server.serve());
    states
        .wait_for(|s| *s == LifecycleState::Listening)
        .await
        .unwrap();

    RunningServer {
        addr,
        shutdown,
        states,
        handle,
    }
}

pub fn handler_with(processor: Arc<dyn ImageProcessor>) -> ThumbnailServiceImpl {
    ThumbnailServiceImpl::new(processor, Arc::new(PngEncoder), ThumbnailOptions::default())
}

pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 64u8])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}

/// Counts invocations before delegating to the real processor.
#[derive(Default)]
pub struct CountingProcessor {
    pub calls: AtomicUsize,
}

impl CountingProcessor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageProcessor for CountingProcessor {
    fn process(
        &self,
        content: &[u8],
        options: &ThumbnailOptions,
    ) -> Result<ProcessedImage, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ThumbnailProcessor.process(content, options)
    }
}

/// Signals when a call starts, then blocks for `delay` before processing.
pub struct SlowProcessor {
    pub started: Arc<Notify>,
    pub delay: Duration,
}

impl SlowProcessor {
    pub fn new(delay: Duration) -> Self {
        Self {
            started: Arc::new(Notify::new()),
            delay,
        }
    }
}

impl ImageProcessor for SlowProcessor {
    fn process(
        &self,
        content: &[u8],
        options: &ThumbnailOptions,
    ) -> Result<ProcessedImage, ProcessingError> {
        self.started.notify_one();
        std::thread::sleep(self.delay);
        ThumbnailProcessor.process(content, options)
    }
}
