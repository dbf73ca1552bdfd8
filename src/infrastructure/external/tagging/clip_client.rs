//! ClipServerTagger - vectorised tagging via a CLIP embedding server
//!
//! Talks to a sidecar that loads an OpenCLIP model once and scores a
//! whole batch of images per request. This is the GPU-efficient path:
//! one model load amortised over up to a full batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::infrastructure::external::tagging::backend::{
    apply_limits, InferenceBackend, TagPrediction,
};
use crate::shared::error::TaggingError;

/// Request body for the batch tagging endpoint
#[derive(Debug, Serialize)]
struct TagBatchRequest<'a> {
    images: &'a [String],
    threshold: f64,
    max_tags: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Per-image predictions in the server response
#[derive(Debug, Deserialize)]
struct TagBatchResponse {
    results: HashMap<String, Vec<ServerPrediction>>,
}

#[derive(Debug, Deserialize)]
struct ServerPrediction {
    tag: String,
    confidence: f64,
}

/// CLIP-server tagging backend
pub struct ClipServerTagger {
    base_url: String,
    model: Option<String>,
    http_client: reqwest::Client,
}

impl ClipServerTagger {
    /// Creates a new CLIP server tagger
    ///
    /// # Arguments
    /// * `base_url` - Tagging server URL (e.g., "http://localhost:8093")
    /// * `model` - Optional model override (e.g., "ViT-B-32")
    pub fn new(base_url: &str, model: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    async fn request_batch(
        &self,
        paths: &[String],
        threshold: f64,
        max_tags: usize,
    ) -> Result<HashMap<String, Vec<TagPrediction>>, TaggingError> {
        let url = format!("{}/tag", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&TagBatchRequest {
                images: paths,
                threshold,
                max_tags,
                model: self.model.as_deref(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TaggingError::InferenceFailed(format!(
                "tagging server returned {}",
                response.status()
            )));
        }

        let body: TagBatchResponse = response
            .json()
            .await
            .map_err(|e| TaggingError::ParseError(e.to_string()))?;

        let mut results = HashMap::with_capacity(body.results.len());
        for (path, predictions) in body.results {
            let predictions = predictions
                .into_iter()
                .map(|p| TagPrediction {
                    name: p.tag,
                    confidence: p.confidence,
                })
                .collect();
            results.insert(path, apply_limits(predictions, threshold, max_tags));
        }
        Ok(results)
    }
}

#[async_trait]
impl InferenceBackend for ClipServerTagger {
    fn name(&self) -> &str {
        "clip"
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn tag_batch(
        &self,
        paths: &[String],
        threshold: f64,
        max_tags: usize,
    ) -> Result<HashMap<String, Vec<TagPrediction>>, TaggingError> {
        self.request_batch(paths, threshold, max_tags).await
    }

    async fn tag_image(
        &self,
        path: &str,
        threshold: f64,
        max_tags: usize,
    ) -> Result<Vec<TagPrediction>, TaggingError> {
        let mut results = self
            .request_batch(&[path.to_string()], threshold, max_tags)
            .await?;
        Ok(results.remove(path).unwrap_or_default())
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        self.http_client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn cleanup(&self) {
        // The model lives in the sidecar; asking it to unload frees GPU
        // memory between batches. Failure to unload is not an error.
        let url = format!("{}/unload", self.base_url);
        let _ = self
            .http_client
            .post(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        info!("Released CLIP tagging backend");
    }
}
