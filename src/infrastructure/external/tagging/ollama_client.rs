//! OllamaTagger - per-image tagging via an Ollama vision model
//!
//! Asks a multimodal model (llava by default) to describe each image as a
//! comma-separated tag list. Inherently item-by-item: the API scores one
//! image per generate call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::infrastructure::external::tagging::backend::{
    apply_limits, InferenceBackend, TagPrediction,
};
use crate::shared::error::TaggingError;

const DEFAULT_MODEL: &str = "llava";

/// Ollama generate request body
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    /// Unload the model right after the request; batch-end cleanup keeps
    /// the GPU free for other jobs
    keep_alive: i32,
}

/// Ollama generate response body
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Ollama tagging backend
pub struct OllamaTagger {
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl OllamaTagger {
    /// Creates a new Ollama tagger
    ///
    /// # Arguments
    /// * `base_url` - Ollama API URL (e.g., "http://localhost:11434")
    /// * `model` - Model name (defaults to "llava")
    pub fn new(base_url: &str, model: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Parses a comma-separated tag list into predictions
    ///
    /// The model does not report calibrated confidences; earlier tags rank
    /// higher, decaying from 0.9 in steps of 0.05.
    fn parse_tag_list(response: &str) -> Vec<TagPrediction> {
        response
            .split(',')
            .map(|tag| tag.trim().trim_matches('.').to_lowercase())
            .filter(|tag| !tag.is_empty() && tag.len() <= 64)
            .enumerate()
            .map(|(i, name)| TagPrediction {
                name,
                confidence: (0.9 - 0.05 * i as f64).max(0.1),
            })
            .collect()
    }
}

#[async_trait]
impl InferenceBackend for OllamaTagger {
    fn name(&self) -> &str {
        "ollama"
    }

    fn supports_batch(&self) -> bool {
        false
    }

    async fn tag_batch(
        &self,
        paths: &[String],
        threshold: f64,
        max_tags: usize,
    ) -> Result<HashMap<String, Vec<TagPrediction>>, TaggingError> {
        let mut results = HashMap::with_capacity(paths.len());
        for path in paths {
            results.insert(path.clone(), self.tag_image(path, threshold, max_tags).await?);
        }
        Ok(results)
    }

    async fn tag_image(
        &self,
        path: &str,
        threshold: f64,
        max_tags: usize,
    ) -> Result<Vec<TagPrediction>, TaggingError> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&OllamaRequest {
                model: &self.model,
                prompt: format!(
                    "List up to {} short descriptive tags for the photo at {}. \
                     Reply with a comma-separated list only.",
                    max_tags, path
                ),
                stream: false,
                keep_alive: 0,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TaggingError::InferenceFailed(format!(
                "ollama returned {}",
                response.status()
            )));
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| TaggingError::ParseError(e.to_string()))?;

        Ok(apply_limits(
            Self::parse_tag_list(&body.response),
            threshold,
            max_tags,
        ))
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        self.http_client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn cleanup(&self) {
        // keep_alive=0 already unloads after each generate call
        info!("Released Ollama tagging backend");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_tag_list() {
        let tags = OllamaTagger::parse_tag_list("Dog, park, Golden Retriever, ");
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].name, "dog");
        assert_eq!(tags[2].name, "golden retriever");
        assert!(tags[0].confidence > tags[2].confidence);
    }

    #[tokio::test]
    async fn test_tag_image_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "beach, sunset, ocean",
                "done": true
            })))
            .mount(&server)
            .await;

        let tagger = OllamaTagger::new(&server.uri(), None);
        let tags = tagger.tag_image("/photos/a.jpg", 0.1, 10).await.unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].name, "beach");
    }
}
