//! Request-processing pipeline.
//!
//! One logical pipeline instance serves each request: admission check,
//! upload validation, timed transform. Every failure short-circuits into a
//! [`PipelineError`] with a fixed HTTP status and a generic, non-leaking
//! message; underlying causes go to the log only.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::http::response::ResponseMode;
use crate::observability::metrics;
use crate::security::rate_limit::{Admission, SlidingWindowLimiter};
use crate::transform::{MattingSession, TransformError, TransformGateway};
use crate::upload::{UploadError, UploadValidator, UploadedImage};

/// Terminal failure of one request attempt. No category triggers a retry.
#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("Too many requests")]
    RateLimited,

    #[error("File size exceeds maximum limit of {limit_mb}MB")]
    TooLarge { limit_mb: f64 },

    #[error("File type not supported. Allowed types: {allowed}")]
    UnsupportedType { allowed: String },

    #[error("Error processing image")]
    ProcessingFailed,

    #[error("Internal server error")]
    Internal,
}

impl PipelineError {
    /// The 413 rejection for a given policy limit, also used when an
    /// oversized upload is caught by the transport body cap before the
    /// validator ever sees it.
    pub fn too_large(max_bytes: usize) -> Self {
        Self::TooLarge {
            limit_mb: max_bytes as f64 / (1024.0 * 1024.0),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::ProcessingFailed | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<UploadError> for PipelineError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::TooLarge { max_bytes, .. } => Self::too_large(max_bytes),
            UploadError::UnsupportedType { allowed, .. } => Self::UnsupportedType { allowed },
        }
    }
}

/// Output of a successful pipeline run.
#[derive(Debug)]
pub struct ProcessingResult {
    /// PNG-encoded image with an alpha channel.
    pub png: Vec<u8>,
    /// Wall-clock duration of the transform-and-encode phase.
    pub elapsed: Duration,
    /// Response mode the caller asked for.
    pub mode: ResponseMode,
}

/// Orchestrates admission, validation, and the transform for each request.
///
/// Owned state, shared via `Arc` in the server; nothing here is
/// process-global.
pub struct RequestPipeline {
    limiter: SlidingWindowLimiter,
    validator: UploadValidator,
    gateway: TransformGateway,
}

impl RequestPipeline {
    pub fn new(config: &ServiceConfig, session: Box<dyn MattingSession>) -> Self {
        Self {
            limiter: SlidingWindowLimiter::new(&config.rate_limit),
            validator: UploadValidator::new(&config.upload),
            gateway: TransformGateway::new(session),
        }
    }

    /// Run one request through the pipeline.
    ///
    /// Rate-limit and validation rejections return before the transform is
    /// ever invoked.
    pub async fn handle(
        &self,
        client_id: &str,
        upload: UploadedImage,
        mode: ResponseMode,
    ) -> Result<ProcessingResult, PipelineError> {
        if self.limiter.admit(client_id) == Admission::Rejected {
            tracing::warn!(client = %client_id, "Rate limit exceeded");
            metrics::record_rate_limited();
            return Err(PipelineError::RateLimited);
        }

        if let Err(err) = self.validator.check(&upload) {
            tracing::debug!(client = %client_id, error = %err, "Upload rejected");
            return Err(err.into());
        }

        let started = Instant::now();
        let png = self.gateway.process(upload.bytes).await.map_err(|err| {
            // Cause stays server-side; the caller gets the generic message.
            tracing::error!(client = %client_id, error = %err, "Error processing image");
            match err {
                // A lost worker is not an image problem; it is the
                // orchestration failing out from under the request.
                TransformError::Worker => PipelineError::Internal,
                _ => PipelineError::ProcessingFailed,
            }
        })?;

        Ok(ProcessingResult {
            png,
            elapsed: started.elapsed(),
            mode,
        })
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    pub fn upload_limit_bytes(&self) -> usize {
        self.validator.max_bytes()
    }

    pub fn gateway(&self) -> &TransformGateway {
        &self.gateway
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::SessionError;
    use image::{DynamicImage, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Session that counts invocations, to prove short-circuiting.
    struct CountingSession {
        calls: Arc<AtomicUsize>,
    }

    impl MattingSession for CountingSession {
        fn remove_background(
            &mut self,
            image: &DynamicImage,
        ) -> Result<RgbaImage, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(image.to_rgba8())
        }
    }

    fn pipeline_with_counter(
        config: &ServiceConfig,
    ) -> (RequestPipeline, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let session = CountingSession {
            calls: calls.clone(),
        };
        (RequestPipeline::new(config, Box::new(session)), calls)
    }

    fn png_upload() -> UploadedImage {
        UploadedImage::new(
            TransformGateway::probe_png().unwrap(),
            Some("image/png".to_string()),
        )
    }

    #[tokio::test]
    async fn happy_path_returns_timed_png() {
        let (pipeline, calls) = pipeline_with_counter(&ServiceConfig::default());
        let result = pipeline
            .handle("1.1.1.1", png_upload(), ResponseMode::Direct)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.mode, ResponseMode::Direct);
        assert_eq!(&result.png[0..8], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn oversized_upload_rejected_before_transform() {
        let mut config = ServiceConfig::default();
        config.upload.max_file_size = 16;
        let (pipeline, calls) = pipeline_with_counter(&config);

        let err = pipeline
            .handle("1.1.1.1", png_upload(), ResponseMode::Base64)
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_type_rejected_before_transform() {
        let (pipeline, calls) = pipeline_with_counter(&ServiceConfig::default());

        let upload = UploadedImage::new(vec![1, 2, 3], Some("text/plain".to_string()));
        let err = pipeline
            .handle("1.1.1.1", upload, ResponseMode::Base64)
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rate_limit_rejects_before_validation_and_transform() {
        let mut config = ServiceConfig::default();
        config.rate_limit.max_requests = 1;
        let (pipeline, calls) = pipeline_with_counter(&config);

        pipeline
            .handle("2.2.2.2", png_upload(), ResponseMode::Base64)
            .await
            .unwrap();
        let err = pipeline
            .handle("2.2.2.2", png_upload(), ResponseMode::Base64)
            .await
            .unwrap_err();

        assert_eq!(err, PipelineError::RateLimited);
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Session that dies mid-inference, taking the blocking task with it.
    struct CrashingSession;

    impl MattingSession for CrashingSession {
        fn remove_background(
            &mut self,
            _image: &DynamicImage,
        ) -> Result<RgbaImage, SessionError> {
            panic!("session crashed");
        }
    }

    #[tokio::test]
    async fn lost_worker_maps_to_internal_error() {
        let pipeline =
            RequestPipeline::new(&ServiceConfig::default(), Box::new(CrashingSession));

        let err = pipeline
            .handle("5.5.5.5", png_upload(), ResponseMode::Base64)
            .await
            .unwrap_err();

        assert_eq!(err, PipelineError::Internal);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[tokio::test]
    async fn undecodable_upload_maps_to_processing_failed() {
        let (pipeline, _) = pipeline_with_counter(&ServiceConfig::default());
        let upload = UploadedImage::new(vec![0u8; 64], Some("image/png".to_string()));

        let err = pipeline
            .handle("3.3.3.3", upload, ResponseMode::Base64)
            .await
            .unwrap_err();

        assert_eq!(err, PipelineError::ProcessingFailed);
        assert_eq!(err.to_string(), "Error processing image");
    }

    #[test]
    fn error_messages_state_policy_without_leaking() {
        let err = PipelineError::from(UploadError::TooLarge {
            size: 15 * 1024 * 1024,
            max_bytes: 10 * 1024 * 1024,
        });
        assert_eq!(err.to_string(), "File size exceeds maximum limit of 10MB");

        let err = PipelineError::from(UploadError::UnsupportedType {
            declared: Some("text/plain".to_string()),
            allowed: "image/png, image/jpeg, image/jpg".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "File type not supported. Allowed types: image/png, image/jpeg, image/jpg"
        );
    }
}
