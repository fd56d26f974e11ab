//! Error types for the thumbnail service
//!
//! Processing and encoding failures are kept in separate taxonomies all the
//! way to the wire: besides the status code, every error status carries an
//! `x-thumbnail-error` metadata entry naming which stage failed.

use std::net::SocketAddr;
use thiserror::Error;
use tonic::metadata::MetadataValue;
use tonic::{Code, Status};

/// Metadata key naming the failing stage on error statuses.
pub const ERROR_KIND_METADATA: &str = "x-thumbnail-error";

/// The image collaborator rejected or failed on the input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("empty image content")]
    EmptyInput,

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed image: {0}")]
    Malformed(String),

    #[error("image processing failed: {0}")]
    Internal(String),
}

/// Re-encoding the produced raster image failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to encode thumbnail: {reason}")]
pub struct EncodingError {
    pub reason: String,
}

impl EncodingError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Per-call failure of `GenerateThumbnail`.
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("thumbnail task failed: {0}")]
    TaskFailed(String),

    #[error("call aborted: server is shutting down")]
    Aborted,
}

impl ThumbnailError {
    /// Stage label written to [`ERROR_KIND_METADATA`].
    pub fn kind(&self) -> &'static str {
        match self {
            ThumbnailError::Processing(_)
            | ThumbnailError::TaskFailed(_)
            | ThumbnailError::Aborted => "processing",
            ThumbnailError::Encoding(_) => "encoding",
        }
    }

    /// Convert to gRPC Status for wire protocol
    pub fn to_status(&self) -> Status {
        let code = match self {
            ThumbnailError::Processing(
                ProcessingError::EmptyInput
                | ProcessingError::UnsupportedFormat(_)
                | ProcessingError::Malformed(_),
            ) => Code::InvalidArgument,
            ThumbnailError::Processing(ProcessingError::Internal(_)) => Code::Internal,
            ThumbnailError::Encoding(_) => Code::Internal,
            ThumbnailError::TaskFailed(_) => Code::Internal,
            ThumbnailError::Aborted => Code::Unavailable,
        };

        let mut status = Status::new(code, self.to_string());
        status
            .metadata_mut()
            .insert(ERROR_KIND_METADATA, MetadataValue::from_static(self.kind()));
        status
    }
}

impl From<ThumbnailError> for Status {
    fn from(err: ThumbnailError) -> Self {
        err.to_status()
    }
}

/// Lifecycle failures of the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server already started")]
    AlreadyStarted,

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_input_maps_to_invalid_argument() {
        for err in [
            ProcessingError::EmptyInput,
            ProcessingError::UnsupportedFormat("unknown".into()),
            ProcessingError::Malformed("truncated".into()),
        ] {
            let status = ThumbnailError::from(err).to_status();
            assert_eq!(status.code(), Code::InvalidArgument);
            assert_eq!(
                status.metadata().get(ERROR_KIND_METADATA).unwrap(),
                "processing"
            );
        }
    }

    #[test]
    fn test_internal_processing_failure_maps_to_internal() {
        let status =
            ThumbnailError::from(ProcessingError::Internal("decoder crashed".into())).to_status();
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(
            status.metadata().get(ERROR_KIND_METADATA).unwrap(),
            "processing"
        );
    }

    #[test]
    fn test_encoding_failure_is_distinct() {
        let status = ThumbnailError::from(EncodingError::new("png writer failed")).to_status();
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(
            status.metadata().get(ERROR_KIND_METADATA).unwrap(),
            "encoding"
        );
        assert!(status.message().contains("png writer failed"));
    }

    #[test]
    fn test_aborted_call_is_unavailable() {
        let status = ThumbnailError::Aborted.to_status();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(
            status.metadata().get(ERROR_KIND_METADATA).unwrap(),
            "processing"
        );
    }

    #[test]
    fn test_message_is_preserved_verbatim() {
        let status = ThumbnailError::from(ProcessingError::EmptyInput).to_status();
        assert_eq!(status.message(), "empty image content");
    }
}
