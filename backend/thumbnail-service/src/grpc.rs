// gRPC service implementation for the thumbnail service
use crate::error::ThumbnailError;
use crate::processor::{
    ImageEncoder, ImageProcessor, PngEncoder, ThumbnailOptions, ThumbnailProcessor,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

pub mod thumbnailer {
    tonic::include_proto!("thumbnailer");
}

use thumbnailer::thumbnail_service_server::ThumbnailService;
use thumbnailer::{ThumbnailRequest, ThumbnailResponse};

pub use thumbnailer::thumbnail_service_client::ThumbnailServiceClient;
pub use thumbnailer::thumbnail_service_server::ThumbnailServiceServer;

/// Request handler for `GenerateThumbnail`.
///
/// Holds no per-call state; clones share the same collaborators.
#[derive(Clone)]
pub struct ThumbnailServiceImpl {
    processor: Arc<dyn ImageProcessor>,
    encoder: Arc<dyn ImageEncoder>,
    options: ThumbnailOptions,
    abort: CancellationToken,
}

impl ThumbnailServiceImpl {
    pub fn new(
        processor: Arc<dyn ImageProcessor>,
        encoder: Arc<dyn ImageEncoder>,
        options: ThumbnailOptions,
    ) -> Self {
        Self {
            processor,
            encoder,
            options,
            abort: CancellationToken::new(),
        }
    }

    /// Calls still running when `token` is cancelled fail with
    /// [`ThumbnailError::Aborted`] instead of waiting for the collaborator.
    pub fn with_abort_token(mut self, token: CancellationToken) -> Self {
        self.abort = token;
        self
    }

    /// Handler backed by the `image` crate, producing PNG thumbnails.
    pub fn with_defaults(options: ThumbnailOptions) -> Self {
        Self::new(Arc::new(ThumbnailProcessor), Arc::new(PngEncoder), options)
    }

    pub fn options(&self) -> ThumbnailOptions {
        self.options
    }

    /// Process and re-encode `content` on the blocking pool.
    pub async fn generate(&self, content: Vec<u8>) -> Result<Vec<u8>, ThumbnailError> {
        let processor = self.processor.clone();
        let encoder = self.encoder.clone();
        let options = self.options;

        let task = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ThumbnailError> {
            let processed = processor.process(&content, &options)?;
            debug!(
                source_format = ?processed.metadata.source_format,
                source_width = processed.metadata.source_width,
                source_height = processed.metadata.source_height,
                "Source image decoded"
            );
            Ok(encoder.encode(&processed.image)?)
        });

        // An aborted call leaves the blocking task detached; its result is dropped.
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => Err(ThumbnailError::Aborted),
            joined = task => joined.map_err(|e| ThumbnailError::TaskFailed(e.to_string()))?,
        }
    }
}

#[tonic::async_trait]
impl ThumbnailService for ThumbnailServiceImpl {
    async fn generate_thumbnail(
        &self,
        request: Request<ThumbnailRequest>,
    ) -> Result<Response<ThumbnailResponse>, Status> {
        let content = request.into_inner().content;
        let content_len = content.len();

        let thumbnail = self.generate(content).await.map_err(|e| {
            warn!(
                error = %e,
                kind = e.kind(),
                content_len = content_len,
                "Thumbnail generation failed"
            );
            e.to_status()
        })?;

        debug!(
            content_len = content_len,
            thumbnail_len = thumbnail.len(),
            "Thumbnail generated"
        );

        Ok(Response::new(ThumbnailResponse { thumbnail }))
    }
}
