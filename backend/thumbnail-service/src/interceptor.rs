//! Audit interceptor
//!
//! Tower layer placed in front of every gRPC route. It logs the verified
//! subject of every certificate the peer presented during the mutual-TLS
//! handshake, together with the called method path, then forwards the call
//! untouched. It never rejects a call: authentication already happened in
//! the transport.

use grpc_tls::certificate_subject;
use std::task::{Context, Poll};
use tonic::transport::server::{TcpConnectInfo, TlsConnectInfo};
use tower::{Layer, Service};
use tracing::{info, warn};

/// Log target for audit entries.
pub const AUDIT_TARGET: &str = "audit";

/// One certificate of the peer chain as seen by the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Position in the chain, 0 being the client's own certificate.
    pub position: usize,
    /// Subject DN, `None` if the certificate could not be parsed.
    pub subject: Option<String>,
}

/// Build audit entries for a DER certificate chain.
pub fn audit_entries<C: AsRef<[u8]>>(chain: &[C]) -> Vec<AuditEntry> {
    chain
        .iter()
        .enumerate()
        .map(|(position, der)| AuditEntry {
            position,
            subject: certificate_subject(der.as_ref()).ok(),
        })
        .collect()
}

/// Write audit entries for `request`. Requests that did not arrive over a
/// TLS connection carry no peer info and are skipped.
pub fn record<B>(request: &http::Request<B>) {
    let Some(conn) = request
        .extensions()
        .get::<TlsConnectInfo<TcpConnectInfo>>()
    else {
        return;
    };
    let Some(chain) = conn.peer_certs() else {
        return;
    };

    let peer_addr = conn
        .get_ref()
        .remote_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_default();
    let method = request.uri().path();

    let ders: Vec<&[u8]> = chain.iter().map(|cert| cert.as_ref()).collect();
    for entry in audit_entries(&ders) {
        match entry.subject {
            Some(subject) => info!(
                target: AUDIT_TARGET,
                peer_addr = %peer_addr,
                method = %method,
                position = entry.position,
                subject = %subject,
                "client certificate subject"
            ),
            None => warn!(
                target: AUDIT_TARGET,
                peer_addr = %peer_addr,
                method = %method,
                position = entry.position,
                der_len = ders[entry.position].len(),
                "client certificate could not be parsed"
            ),
        }
    }
}

/// Tower layer for audit logging
#[derive(Clone, Copy, Debug, Default)]
pub struct AuditLayer;

impl<S> Layer<S> for AuditLayer {
    type Service = AuditService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AuditService { inner: service }
    }
}

#[derive(Clone, Debug)]
pub struct AuditService<S> {
    inner: S,
}

impl<S, B> Service<http::Request<B>> for AuditService<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        record(&req);
        self.inner.call(req)
    }
}
