//! Response-format negotiation and encoding.

use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Json, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;

use crate::pipeline::ProcessingResult;

/// Header carrying the transform-and-encode duration in seconds on direct
/// responses; base64 responses carry the same value as `process_time`.
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// How the processed image is returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// JSON envelope with a base64 payload.
    #[default]
    Base64,
    /// Raw PNG body.
    Direct,
}

impl ResponseMode {
    /// Parse the `return_type` parameter. Only the exact value `"direct"`
    /// selects the raw response; anything else, absent or unrecognized,
    /// falls back to base64 for compatibility with existing clients.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("direct") => Self::Direct,
            _ => Self::Base64,
        }
    }
}

/// Render a processing result in the caller-selected mode.
pub fn render(result: ProcessingResult) -> Response {
    let seconds = result.elapsed.as_secs_f64();
    match result.mode {
        ResponseMode::Direct => {
            let mut response =
                ([(header::CONTENT_TYPE, "image/png")], result.png).into_response();
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(PROCESS_TIME_HEADER, value);
            }
            response
        }
        ResponseMode::Base64 => Json(json!({
            "image": BASE64.encode(&result.png),
            "process_time": seconds,
        }))
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::time::Duration;

    fn result(mode: ResponseMode) -> ProcessingResult {
        ProcessingResult {
            png: vec![1, 2, 3, 4],
            elapsed: Duration::from_millis(250),
            mode,
        }
    }

    #[test]
    fn unrecognized_return_type_falls_back_to_base64() {
        assert_eq!(ResponseMode::from_param(None), ResponseMode::Base64);
        assert_eq!(ResponseMode::from_param(Some("base64")), ResponseMode::Base64);
        assert_eq!(ResponseMode::from_param(Some("direct")), ResponseMode::Direct);
        assert_eq!(ResponseMode::from_param(Some("raw")), ResponseMode::Base64);
        assert_eq!(ResponseMode::from_param(Some("DIRECT")), ResponseMode::Base64);
    }

    #[tokio::test]
    async fn direct_mode_returns_png_body_with_timing_header() {
        let response = render(result(ResponseMode::Direct));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
        let timing: f64 = response
            .headers()
            .get(PROCESS_TIME_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((timing - 0.25).abs() < 1e-9);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn base64_mode_returns_json_envelope() {
        let response = render(result(ResponseMode::Base64));
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let decoded = BASE64.decode(value["image"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 4]);
        assert!((value["process_time"].as_f64().unwrap() - 0.25).abs() < 1e-9);
    }
}
