//! Matting session seam.
//!
//! The background-removal model is opaque to the rest of the service: bitmap
//! in, RGBA bitmap out. A real model runtime (ONNX session, remote worker)
//! implements [`MattingSession`]; the built-in [`ChromaMatteSession`] keeps
//! the service runnable without one.

use image::{DynamicImage, RgbaImage};
use thiserror::Error;

/// Failure inside the model session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("inference failed: {0}")]
    Inference(String),
}

/// A loaded background-matting model.
///
/// Takes `&mut self` because model runtimes are not assumed safe for
/// concurrent invocation; the gateway serializes access.
pub trait MattingSession: Send {
    fn remove_background(&mut self, image: &DynamicImage) -> Result<RgbaImage, SessionError>;
}

/// Border-sampling chroma matte.
///
/// Estimates the background color as the mean of the border pixels and
/// clears the alpha of pixels within `tolerance` of it per channel. A crude
/// stand-in for a segmentation model, but byte-in/byte-out compatible with
/// one.
pub struct ChromaMatteSession {
    tolerance: u32,
}

impl ChromaMatteSession {
    pub fn new(tolerance: u32) -> Self {
        Self { tolerance }
    }
}

impl Default for ChromaMatteSession {
    fn default() -> Self {
        Self { tolerance: 48 }
    }
}

impl MattingSession for ChromaMatteSession {
    fn remove_background(&mut self, image: &DynamicImage) -> Result<RgbaImage, SessionError> {
        let mut rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(SessionError::Inference("empty image".to_string()));
        }

        let (mut r, mut g, mut b, mut count) = (0u64, 0u64, 0u64, 0u64);
        let mut sample = |px: &image::Rgba<u8>| {
            r += u64::from(px.0[0]);
            g += u64::from(px.0[1]);
            b += u64::from(px.0[2]);
            count += 1;
        };
        for x in 0..width {
            sample(rgba.get_pixel(x, 0));
            sample(rgba.get_pixel(x, height - 1));
        }
        for y in 0..height {
            sample(rgba.get_pixel(0, y));
            sample(rgba.get_pixel(width - 1, y));
        }
        let background = [
            (r / count) as i32,
            (g / count) as i32,
            (b / count) as i32,
        ];

        let tolerance = self.tolerance as i32;
        for px in rgba.pixels_mut() {
            let matches = px.0[..3]
                .iter()
                .zip(background)
                .all(|(&channel, bg)| (i32::from(channel) - bg).abs() <= tolerance);
            if matches {
                px.0[3] = 0;
            }
        }
        Ok(rgba)
    }
}
