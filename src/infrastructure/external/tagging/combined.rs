//! CombinedTagger - CLIP recall plus Ollama descriptions
//!
//! Runs the vectorised CLIP pass for throughput and merges in Ollama's
//! per-image tags, keeping the higher confidence when both predict the
//! same tag.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::infrastructure::external::tagging::backend::{
    apply_limits, InferenceBackend, TagPrediction,
};
use crate::infrastructure::external::tagging::clip_client::ClipServerTagger;
use crate::infrastructure::external::tagging::ollama_client::OllamaTagger;
use crate::shared::error::TaggingError;

/// Combined tagging backend
pub struct CombinedTagger {
    clip: ClipServerTagger,
    ollama: OllamaTagger,
}

impl CombinedTagger {
    pub fn new(clip: ClipServerTagger, ollama: OllamaTagger) -> Self {
        Self { clip, ollama }
    }

    fn merge(
        primary: Vec<TagPrediction>,
        secondary: Vec<TagPrediction>,
        threshold: f64,
        max_tags: usize,
    ) -> Vec<TagPrediction> {
        let mut by_name: HashMap<String, f64> = HashMap::new();
        for p in primary.into_iter().chain(secondary) {
            let entry = by_name.entry(p.name).or_insert(0.0);
            if p.confidence > *entry {
                *entry = p.confidence;
            }
        }
        let merged = by_name
            .into_iter()
            .map(|(name, confidence)| TagPrediction { name, confidence })
            .collect();
        apply_limits(merged, threshold, max_tags)
    }
}

#[async_trait]
impl InferenceBackend for CombinedTagger {
    fn name(&self) -> &str {
        "combined"
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
        let mut clip_results = self.clip.tag_batch(paths, threshold, max_tags).await?;

        let mut results = HashMap::with_capacity(paths.len());
        for path in paths {
            let clip_tags = clip_results.remove(path).unwrap_or_default();
            // Ollama is best-effort here; CLIP alone is still a result.
            let ollama_tags = self
                .ollama
                .tag_image(path, threshold, max_tags)
                .await
                .unwrap_or_default();
            results.insert(
                path.clone(),
                Self::merge(clip_tags, ollama_tags, threshold, max_tags),
            );
        }
        Ok(results)
    }

    async fn tag_image(
        &self,
        path: &str,
        threshold: f64,
        max_tags: usize,
    ) -> Result<Vec<TagPrediction>, TaggingError> {
        let clip_tags = self.clip.tag_image(path, threshold, max_tags).await?;
        let ollama_tags = self
            .ollama
            .tag_image(path, threshold, max_tags)
            .await
            .unwrap_or_default();
        Ok(Self::merge(clip_tags, ollama_tags, threshold, max_tags))
    }

    async fn is_available(&self) -> bool {
        self.clip.is_available().await
    }

    async fn cleanup(&self) {
        self.clip.cleanup().await;
        self.ollama.cleanup().await;
    }
}
