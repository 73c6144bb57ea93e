//! Upload acceptance policy.

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::UploadConfig;

/// A single uploaded file. Exists only for the duration of one request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    /// Content type as declared by the client; never sniffed here. Actual
    /// decode failures surface later in the transform gateway.
    pub content_type: Option<String>,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            bytes,
            content_type,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Reason an upload was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("upload of {size} bytes exceeds the {max_bytes} byte limit")]
    TooLarge { size: usize, max_bytes: usize },

    #[error("declared content type {declared:?} not in [{allowed}]")]
    UnsupportedType {
        declared: Option<String>,
        allowed: String,
    },
}

/// Checks uploads against the immutable [`UploadConfig`] policy.
pub struct UploadValidator {
    max_bytes: usize,
    allowed: HashSet<String>,
    /// Configured order, for error messages.
    allowed_display: String,
}

impl UploadValidator {
    pub fn new(config: &UploadConfig) -> Self {
        let allowed: Vec<String> = config
            .allowed_content_types
            .iter()
            .map(|ct| ct.trim().to_ascii_lowercase())
            .collect();
        let allowed_display = allowed.join(", ");
        Self {
            max_bytes: config.max_file_size,
            allowed: allowed.into_iter().collect(),
            allowed_display,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Size is checked before content type; when both are wrong the caller
    /// sees the size error.
    pub fn check(&self, upload: &UploadedImage) -> Result<(), UploadError> {
        if upload.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: upload.len(),
                max_bytes: self.max_bytes,
            });
        }
        let declared = upload
            .content_type
            .as_deref()
            .map(|ct| ct.trim().to_ascii_lowercase());
        match declared {
            Some(ref ct) if self.allowed.contains(ct) => Ok(()),
            declared => Err(UploadError::UnsupportedType {
                declared,
                allowed: self.allowed_display.clone(),
            }),
        }
    }
}
