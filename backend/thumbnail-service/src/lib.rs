//! Thumbnail service
//!
//! Accepts image bytes over gRPC and returns a bounded-size PNG thumbnail.
//! Every connection is mutually authenticated with TLS; the subjects of the
//! presented client certificates are written to the `audit` log target.
//!
//! - [`processor`]: decode, resize and re-encode images
//! - [`grpc`]: `GenerateThumbnail` handler
//! - [`interceptor`]: client certificate audit logging (tower layer)
//! - [`server`]: bind, serve and graceful drain
//! - [`config`]: environment configuration

pub mod client;
pub mod config;
pub mod error;
pub mod grpc;
pub mod interceptor;
pub mod processor;
pub mod server;

pub use client::ThumbnailClient;
pub use config::{ServerSettings, Settings};
pub use error::{EncodingError, ProcessingError, ServerError, ThumbnailError};
pub use grpc::ThumbnailServiceImpl;
pub use interceptor::{AuditLayer, AuditService};
pub use processor::{ImageEncoder, ImageProcessor, ThumbnailOptions};
pub use server::{LifecycleState, ThumbnailServer};
