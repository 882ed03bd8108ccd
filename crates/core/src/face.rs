//! Face analysis: the opaque detection + embedding service.
//!
//! Given raw image bytes the service yields zero or one usable face. When the
//! image contains several faces the implementation picks the first one it
//! detected.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::FaceServiceError;

/// Pixel rectangle of a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One detected face and its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,

    /// Fixed-length embedding vector (not necessarily normalised).
    pub embedding: Vec<f32>,
}

#[async_trait]
pub trait FaceAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Detect a face and embed it. `Ok(None)` means no usable face.
    async fn analyze(&self, image: &[u8]) -> std::result::Result<Option<FaceObservation>, FaceServiceError>;
}
