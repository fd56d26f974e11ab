//! Service lifecycle
//!
//! ```text
//! Unstarted -> Listening -> Draining -> Stopped
//! ```
//!
//! The listener is bound with the validated server identity, accepts calls
//! until the shutdown token is cancelled, then stops accepting and gives
//! in-flight calls up to the drain deadline to finish. Once the deadline
//! elapses the abort token is cancelled, so calls still waiting on the image
//! collaborator fail with `UNAVAILABLE`, the server future is dropped and
//! [`ThumbnailServer::serve`] returns.

use crate::config::ServerSettings;
use crate::error::ServerError;
use crate::grpc::{ThumbnailServiceImpl, ThumbnailServiceServer};
use crate::interceptor::AuditLayer;
use futures::Stream;
use grpc_tls::ServerIdentity;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic_health::ServingStatus;
use tracing::{debug, error, info, warn};

/// Fully qualified gRPC service name, as reported by the health service.
pub const SERVICE_NAME: &str = "thumbnailer.ThumbnailService";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, not yet serving
    Unstarted,
    /// Accepting connections and calls
    Listening,
    /// Refusing new connections, waiting for in-flight calls
    Draining,
    /// Serve loop has returned
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unstarted => write!(f, "unstarted"),
            Self::Listening => write!(f, "listening"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// mTLS gRPC server for `ThumbnailService`.
pub struct ThumbnailServer {
    settings: ServerSettings,
    identity: ServerIdentity,
    handler: ThumbnailServiceImpl,
    listener: Option<TcpListener>,
    shutdown: CancellationToken,
    abort: CancellationToken,
    state: watch::Sender<LifecycleState>,
}

impl ThumbnailServer {
    /// Requires an already validated [`ServerIdentity`], so a server with a
    /// bad credential can never be constructed.
    pub fn new(
        settings: ServerSettings,
        identity: ServerIdentity,
        handler: ThumbnailServiceImpl,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Unstarted);
        Self {
            settings,
            identity,
            handler,
            listener: None,
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
            state,
        }
    }

    /// Token that triggers the drain when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions; stays valid after `serve` consumes the server.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Bind the configured address and return the local address.
    ///
    /// Calling `serve` without `bind` binds implicitly.
    pub async fn bind(&mut self) -> Result<SocketAddr, ServerError> {
        if self.listener.is_some() || self.state() != LifecycleState::Unstarted {
            return Err(ServerError::AlreadyStarted);
        }

        let addr = self.settings.addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.listener = Some(listener);
        Ok(local_addr)
    }

    /// Serve until the shutdown token is cancelled and the drain finishes.
    pub async fn serve(mut self) -> Result<(), ServerError> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self.listener.take().ok_or(ServerError::AlreadyStarted)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                addr: self.settings.addr,
                source,
            })?;

        let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_service_status(SERVICE_NAME, ServingStatus::Serving)
            .await;

        let handler = self.handler.clone().with_abort_token(self.abort.clone());
        let thumbnail_service = ThumbnailServiceServer::new(handler)
            .max_decoding_message_size(self.settings.max_request_bytes)
            .max_encoding_message_size(self.settings.max_response_bytes);

        let mut builder = Server::builder().tls_config(self.identity.server_tls_config())?;
        if let Some(timeout) = self.settings.request_timeout {
            builder = builder.timeout(timeout);
        }

        let token = self.shutdown.clone();
        let serve = builder
            .layer(AuditLayer)
            .add_service(health_service)
            .add_service(thumbnail_service)
            .serve_with_incoming_shutdown(
                incoming(listener, token.clone()),
                token.clone().cancelled_owned(),
            );
        tokio::pin!(serve);

        self.state.send_replace(LifecycleState::Listening);
        info!(
            addr = %local_addr,
            server_subject = %self.identity.subject(),
            client_trust_anchors = self.identity.trust_anchors(),
            max_request_bytes = self.settings.max_request_bytes,
            max_response_bytes = self.settings.max_response_bytes,
            "Thumbnail service listening (mTLS required)"
        );

        let finished_early = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = &mut serve => Some(result),
        };

        let result = match finished_early {
            Some(result) => {
                if let Err(e) = &result {
                    error!(error = %e, "gRPC server stopped unexpectedly");
                }
                token.cancel();
                result.map_err(ServerError::from)
            }
            None => {
                self.state.send_replace(LifecycleState::Draining);
                health_reporter
                    .set_service_status("", ServingStatus::NotServing)
                    .await;
                health_reporter
                    .set_service_status(SERVICE_NAME, ServingStatus::NotServing)
                    .await;
                info!(
                    drain_timeout_secs = self.settings.drain_timeout.as_secs_f64(),
                    "Shutdown requested, draining in-flight calls"
                );

                match tokio::time::timeout(self.settings.drain_timeout, &mut serve).await {
                    Ok(result) => result.map_err(ServerError::from),
                    Err(_) => {
                        warn!(
                            drain_timeout_secs = self.settings.drain_timeout.as_secs_f64(),
                            "Drain deadline elapsed, aborting remaining calls"
                        );
                        self.abort.cancel();
                        Ok(())
                    }
                }
            }
        };

        self.state.send_replace(LifecycleState::Stopped);
        info!("Thumbnail service stopped");
        result
    }
}

/// Connections accepted before shutdown are queued up to this many deep.
const ACCEPT_QUEUE: usize = 128;

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after `failures` consecutive accept errors (EMFILE and friends).
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1u32 << failures.min(8))
        .min(ACCEPT_BACKOFF_MAX)
}

/// Accept connections on a dedicated task until `token` is cancelled. The
/// task owns the listener and drops it on cancellation, so connection
/// attempts made while draining are refused.
fn incoming(
    listener: TcpListener,
    token: CancellationToken,
) -> Pin<Box<dyn Stream<Item = io::Result<TcpStream>> + Send>> {
    let (tx, rx) = mpsc::channel::<TcpStream>(ACCEPT_QUEUE);

    tokio::spawn(async move {
        let mut failures = 0u32;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        failures = 0;
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(error = %e, peer_addr = %peer_addr, "Failed to set TCP_NODELAY");
                        }
                        if tx.send(stream).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let delay = accept_backoff(failures);
                        failures = failures.saturating_add(1);
                        warn!(
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Failed to accept connection"
                        );
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                },
            }
        }
        debug!("Listener closed");
    });

    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|stream| (Ok::<_, io::Error>(stream), rx))
    }))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
