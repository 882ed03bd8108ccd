//! HTTP client for the face detection + embedding service.
//!
//! The service accepts raw image bytes on `POST {base_url}/embed` and answers
//! with every face it found:
//!
//! ```json
//! {"faces": [{"box": [x, y, w, h], "embedding": [0.01, ...]}]}
//! ```
//!
//! The first detected face wins; an empty list means no usable face.

use async_trait::async_trait;
use mimir_core::error::FaceServiceError;
use mimir_core::face::{BoundingBox, FaceAnalyzer, FaceObservation};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpFaceAnalyzer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpFaceAnalyzer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl FaceAnalyzer for HttpFaceAnalyzer {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(&self, image: &[u8]) -> Result<Option<FaceObservation>, FaceServiceError> {
        if image.is_empty() {
            return Ok(None);
        }

        let url = format!("{}/embed", self.base_url);
        debug!(bytes = image.len(), "Requesting face embedding");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| FaceServiceError::Unreachable(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 400 || status == 415 || status == 422 {
            let body = response.text().await.unwrap_or_default();
            return Err(FaceServiceError::InvalidImage(body));
        }
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            warn!(status, "Face service returned error");
            return Err(FaceServiceError::BadResponse { status_code: status, message });
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| FaceServiceError::BadResponse {
            status_code: 200,
            message: format!("Failed to parse face service response: {e}"),
        })?;

        Ok(first_face(parsed))
    }
}

fn first_face(response: EmbedResponse) -> Option<FaceObservation> {
    let face_count = response.faces.len();
    let face = response.faces.into_iter().find(|f| !f.embedding.is_empty())?;
    if face_count > 1 {
        debug!(face_count, "Multiple faces detected, using the first");
    }
    Some(FaceObservation {
        bounding_box: face.bounding_box.map(|[x, y, width, height]| BoundingBox { x, y, width, height }),
        embedding: face.embedding,
    })
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    faces: Vec<ApiFace>,
}

#[derive(Debug, Deserialize)]
struct ApiFace {
    #[serde(rename = "box", default)]
    bounding_box: Option<[f32; 4]>,
    #[serde(default)]
    embedding: Vec<f32>,
}
