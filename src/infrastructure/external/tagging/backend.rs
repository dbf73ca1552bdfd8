//! Inference backend interface for auto-tagging
//!
//! A backend turns image files into tag predictions. Backends are
//! acquired at batch start and released at batch end, including on
//! failure; the vectorised ones amortise model load across a whole batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::shared::error::TaggingError;

/// One predicted tag for an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPrediction {
    pub name: String,
    /// Confidence in 0.0..=1.0
    pub confidence: f64,
}

/// Inference backend contract
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend identifier, stored as the tag source
    fn name(&self) -> &str;

    /// Whether `tag_batch` runs vectorised over many images at once
    fn supports_batch(&self) -> bool;

    /// Tags a whole batch of images, keyed by path
    async fn tag_batch(
        &self,
        paths: &[String],
        threshold: f64,
        max_tags: usize,
    ) -> Result<HashMap<String, Vec<TagPrediction>>, TaggingError>;

    /// Tags a single image
    async fn tag_image(
        &self,
        path: &str,
        threshold: f64,
        max_tags: usize,
    ) -> Result<Vec<TagPrediction>, TaggingError>;

    /// Quick reachability probe
    async fn is_available(&self) -> bool;

    /// Releases backend resources (model handles, sessions)
    async fn cleanup(&self);
}

/// Filters and truncates predictions to the configured limits
pub fn apply_limits(
    mut predictions: Vec<TagPrediction>,
    threshold: f64,
    max_tags: usize,
) -> Vec<TagPrediction> {
    predictions.retain(|p| p.confidence >= threshold);
    predictions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    predictions.truncate(max_tags);
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_limits_filters_and_sorts() {
        let predictions = vec![
            TagPrediction { name: "dog".into(), confidence: 0.9 },
            TagPrediction { name: "cat".into(), confidence: 0.1 },
            TagPrediction { name: "park".into(), confidence: 0.5 },
        ];
        let limited = apply_limits(predictions, 0.25, 10);
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].name, "dog");
        assert_eq!(limited[1].name, "park");
    }

    #[test]
    fn test_apply_limits_truncates() {
        let predictions = (0..20)
            .map(|i| TagPrediction {
                name: format!("tag-{}", i),
                confidence: 0.5,
            })
            .collect();
        assert_eq!(apply_limits(predictions, 0.0, 5).len(), 5);
    }
}
