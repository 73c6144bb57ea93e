//! HTTP endpoint handlers.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::http::response::{self, ResponseMode};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::pipeline::PipelineError;
use crate::transform::TransformGateway;
use crate::upload::UploadedImage;

/// Root endpoint providing API information.
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Background Removal API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "active",
        "endpoints": {
            "/remove-background": "POST - Remove background from image",
            "/health": "GET - Health check",
        },
    }))
}

/// Health check endpoint.
///
/// Runs a small synthetic image through the live transform so a broken
/// session is reported before real traffic hits it.
pub async fn health(State(state): State<AppState>) -> Response {
    let self_test = async {
        let probe = TransformGateway::probe_png()?;
        state.pipeline.gateway().process(probe).await
    };
    match self_test.await {
        Ok(_) => Json(json!({ "status": "healthy", "transform": "ok" })).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Health self-test failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": "transform self-test failed",
                })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveBackgroundQuery {
    pub return_type: Option<String>,
}

/// Remove the background from an uploaded image.
///
/// Multipart field `file` carries the upload; `return_type` may come as a
/// form field or query parameter (the form field wins). The client is
/// identified by its peer IP for rate limiting.
pub async fn remove_background(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<RemoveBackgroundQuery>,
    mut multipart: Multipart,
) -> Response {
    let started = Instant::now();

    let mut upload: Option<UploadedImage> = None;
    let mut form_return_type: Option<String> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return multipart_failure(&state, addr, started, err),
        };
        match field.name() {
            Some("file") => {
                let content_type = field.content_type().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) => upload = Some(UploadedImage::new(bytes.to_vec(), content_type)),
                    Err(err) => return multipart_failure(&state, addr, started, err),
                }
            }
            Some("return_type") => {
                form_return_type = field.text().await.ok();
            }
            _ => {}
        }
    }
    let Some(upload) = upload else {
        return bad_request(started, "Missing multipart field 'file'");
    };

    let mode = ResponseMode::from_param(
        form_return_type
            .as_deref()
            .or(query.return_type.as_deref()),
    );
    let client_id = addr.ip().to_string();

    match state.pipeline.handle(&client_id, upload, mode).await {
        Ok(result) => {
            metrics::record_request("/remove-background", 200, started);
            response::render(result)
        }
        Err(err) => {
            metrics::record_request("/remove-background", err.status().as_u16(), started);
            err.into_response()
        }
    }
}

/// Map a failed multipart read. An upload big enough to trip the transport
/// body cap never reaches the validator, but it is still an oversized upload
/// and gets the policy 413 rather than a generic 400.
fn multipart_failure(
    state: &AppState,
    addr: SocketAddr,
    started: Instant,
    err: axum::extract::multipart::MultipartError,
) -> Response {
    tracing::debug!(client = %addr, error = %err, "Failed to read multipart body");
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let err = PipelineError::too_large(state.pipeline.upload_limit_bytes());
        metrics::record_request("/remove-background", err.status().as_u16(), started);
        return err.into_response();
    }
    bad_request(started, "Malformed multipart body")
}

fn bad_request(started: Instant, detail: &str) -> Response {
    metrics::record_request("/remove-background", 400, started);
    (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
}
