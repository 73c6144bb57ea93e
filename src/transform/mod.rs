//! Image transform gateway.
//!
//! Adapts an uploaded byte buffer to the matting session: decode into a
//! bitmap, invoke the session, re-encode as PNG with an alpha channel. Any
//! failure along the way collapses into one [`TransformError`] whose text is
//! for server-side logs only.

pub mod session;

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageFormat};
use thiserror::Error;

pub use session::{ChromaMatteSession, MattingSession, SessionError};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("image decode failed: {0}")]
    Decode(image::ImageError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("PNG encode failed: {0}")]
    Encode(image::ImageError),

    #[error("transform worker terminated")]
    Worker,
}

/// Gateway to the matting session shared across concurrent requests.
pub struct TransformGateway {
    /// The mutex is the single-slot execution queue: sessions are not
    /// assumed safe for concurrent invocation, so calls into one are
    /// serialized at the cost of throughput.
    session: Arc<Mutex<Box<dyn MattingSession>>>,
}

impl TransformGateway {
    pub fn new(session: Box<dyn MattingSession>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// Decode, matte, and re-encode as RGBA PNG.
    ///
    /// The whole of the CPU-bound work runs on the blocking pool so the
    /// async runtime never stalls on it. One attempt only; a failure is
    /// terminal for the request.
    pub async fn process(&self, bytes: Vec<u8>) -> Result<Vec<u8>, TransformError> {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let decoded = image::load_from_memory(&bytes).map_err(TransformError::Decode)?;
            let matted = {
                let mut session = session.lock().expect("matting session mutex poisoned");
                session.remove_background(&decoded)?
            };
            let mut buf = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(matted)
                .write_to(&mut buf, ImageFormat::Png)
                .map_err(TransformError::Encode)?;
            Ok(buf.into_inner())
        })
        .await
        .map_err(|_| TransformError::Worker)?
    }

    /// Small synthetic image for the health self-test.
    pub fn probe_png() -> Result<Vec<u8>, TransformError> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(8, 8)
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(TransformError::Encode)?;
        Ok(buf.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ColorType;

    fn gateway() -> TransformGateway {
        TransformGateway::new(Box::new(ChromaMatteSession::default()))
    }

    #[tokio::test]
    async fn produces_png_with_alpha() {
        let input = TransformGateway::probe_png().unwrap();
        let output = gateway().process(input).await.unwrap();

        assert_eq!(&output[0..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgba8);
        assert_eq!(decoded.width(), 8);
    }

    #[tokio::test]
    async fn undecodable_bytes_fail_with_decode_error() {
        let err = gateway()
            .process(b"definitely not an image".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }

    #[tokio::test]
    async fn jpeg_input_is_accepted() {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(16, 16)
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        let output = gateway().process(buf.into_inner()).await.unwrap();
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgba8);
    }
}
