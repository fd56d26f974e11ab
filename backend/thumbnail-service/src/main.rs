/// Thumbnail Service Main Entry Point
///
/// Starts the mTLS gRPC server with:
/// - Server identity and client CA loaded from disk (fail-closed)
/// - Audit logging of client certificate subjects
/// - Graceful drain on SIGINT/SIGTERM
use anyhow::{Context, Result};
use grpc_tls::ServerIdentity;
use std::time::Duration;
use thumbnail_service::{
    config::Settings,
    server::{shutdown_signal, ThumbnailServer},
    ThumbnailServiceImpl,
};
use tracing::{error, info};

/// Upper bound on runtime teardown once serving has returned. Blocking work
/// abandoned at the drain deadline is not waited for beyond this.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    let result = runtime.block_on(run());

    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

async fn run() -> Result<()> {
    // rustls 0.23 requires selecting a CryptoProvider at runtime
    grpc_tls::install_crypto_provider();

    if cfg!(debug_assertions) {
        let _ = dotenvy::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "thumbnail_service=info,grpc_tls=info,audit=info,info".into()),
        )
        .json()
        .init();

    info!("Starting Thumbnail Service");

    let settings = Settings::from_env().context("Failed to load configuration")?;
    info!(
        addr = %settings.server.addr,
        width = settings.thumbnail.width,
        height = settings.thumbnail.height,
        "Configuration loaded successfully"
    );

    let identity = match ServerIdentity::load(&settings.tls) {
        Ok(identity) => identity,
        Err(e) => {
            error!(error = %e, "Failed to load server credentials");
            return Err(e).context("mTLS credentials are required");
        }
    };

    let handler = ThumbnailServiceImpl::with_defaults(settings.thumbnail);
    let mut server = ThumbnailServer::new(settings.server, identity, handler);
    server.bind().await.context("Failed to bind gRPC listener")?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    server.serve().await.context("gRPC server error")?;

    info!("Thumbnail service shutdown complete");
    Ok(())
}
