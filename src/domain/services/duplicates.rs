//! Duplicate grouping
//!
//! Pure grouping logic over checksums and perceptual hashes. No database
//! access; callers supply the hash records and persist the groups.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::services::hashing::hamming_distance;
use crate::shared::error::AnalysisError;

/// Hash fields of one image, as loaded for grouping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageHashRecord {
    pub id: String,
    pub checksum: Option<String>,
    pub dhash: Option<String>,
    pub ahash: Option<String>,
    pub whash: Option<String>,
    pub quality_score: Option<f64>,
    pub size_bytes: Option<i64>,
}

/// How a group's members relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityType {
    /// Byte-identical content (same checksum)
    Exact,
    /// Perceptually similar (Hamming distance within threshold)
    Perceptual,
}

impl SimilarityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityType::Exact => "exact",
            SimilarityType::Perceptual => "perceptual",
        }
    }
}

/// One group of duplicate or similar images
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub image_ids: Vec<String>,
    pub similarity_type: SimilarityType,
    /// 100 for exact groups; derived from average pairwise distance for
    /// perceptual groups
    pub confidence: u8,
}

/// Groups images by exact checksum match
///
/// Only groups with more than one member are returned.
pub fn group_by_exact_match(images: &[ImageHashRecord]) -> Vec<DuplicateGroup> {
    let mut by_checksum: HashMap<&str, Vec<&str>> = HashMap::new();
    for img in images {
        if let Some(checksum) = img.checksum.as_deref() {
            by_checksum.entry(checksum).or_default().push(&img.id);
        }
    }

    let mut groups: Vec<DuplicateGroup> = by_checksum
        .into_values()
        .filter(|ids| ids.len() > 1)
        .map(|ids| DuplicateGroup {
            image_ids: ids.into_iter().map(String::from).collect(),
            similarity_type: SimilarityType::Exact,
            confidence: 100,
        })
        .collect();

    // Deterministic output order for persistence and tests
    groups.sort_by(|a, b| a.image_ids.cmp(&b.image_ids));
    groups
}

/// Finds sets of similar hashes via union-find over all pairs within the
/// Hamming threshold
pub fn find_similar_hashes(
    hashes: &HashMap<String, String>,
    threshold: u32,
) -> Result<Vec<Vec<String>>, AnalysisError> {
    let ids: Vec<&String> = {
        let mut ids: Vec<&String> = hashes.keys().collect();
        ids.sort();
        ids
    };

    let mut parent: Vec<usize> = (0..ids.len()).collect();

    fn find(parent: &mut Vec<usize>, x: usize) -> usize {
        if parent[x] != x {
            let up = parent[x];
            let root = find(parent, up);
            parent[x] = root;
        }
        parent[x]
    }

    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let distance = hamming_distance(&hashes[ids[i]], &hashes[ids[j]])?;
            if distance <= threshold {
                let pi = find(&mut parent, i);
                let pj = find(&mut parent, j);
                if pi != pj {
                    parent[pi] = pj;
                }
            }
        }
    }

    let mut groups: HashMap<usize, Vec<String>> = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push((*id).clone());
    }

    let mut result: Vec<Vec<String>> = groups
        .into_values()
        .filter(|g| g.len() > 1)
        .collect();
    for group in &mut result {
        group.sort();
    }
    result.sort();
    Ok(result)
}

/// Groups images by perceptual-hash similarity
///
/// Uses the given hash field (dhash by default upstream); confidence is
/// `100 - floor(100 * avg_pairwise_distance / 64)` clamped to 0..=100.
pub fn group_by_similarity(
    images: &[ImageHashRecord],
    hash_of: impl Fn(&ImageHashRecord) -> Option<&str>,
    threshold: u32,
) -> Result<Vec<DuplicateGroup>, AnalysisError> {
    let mut hashes: HashMap<String, String> = HashMap::new();
    for img in images {
        if let Some(hash) = hash_of(img) {
            hashes.insert(img.id.clone(), hash.to_string());
        }
    }

    if hashes.is_empty() {
        return Ok(Vec::new());
    }

    let similar_sets = find_similar_hashes(&hashes, threshold)?;

    let mut groups = Vec::with_capacity(similar_sets.len());
    for ids in similar_sets {
        let mut total_distance = 0u64;
        let mut comparisons = 0u64;
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                total_distance += hamming_distance(&hashes[&ids[i]], &hashes[&ids[j]])? as u64;
                comparisons += 1;
            }
        }
        let avg_distance = if comparisons > 0 {
            total_distance / comparisons
        } else {
            0
        };
        let confidence = 100u64.saturating_sub(100 * avg_distance / 64).min(100) as u8;

        groups.push(DuplicateGroup {
            image_ids: ids,
            similarity_type: SimilarityType::Perceptual,
            confidence,
        });
    }
    Ok(groups)
}

/// Selects the primary image of a duplicate group
///
/// Ordering: highest quality score, then largest file, then lowest id for
/// a deterministic tie-break.
pub fn select_primary_image(images: &[ImageHashRecord]) -> Result<String, AnalysisError> {
    if images.is_empty() {
        return Err(AnalysisError::EmptyInput(
            "cannot select a primary image from an empty group".into(),
        ));
    }

    let best = images
        .iter()
        .max_by(|a, b| {
            let qa = a.quality_score.unwrap_or(0.0);
            let qb = b.quality_score.unwrap_or(0.0);
            // Ascending id, so a full quality+size tie resolves to the
            // largest id
            qa.partial_cmp(&qb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.size_bytes.unwrap_or(0).cmp(&b.size_bytes.unwrap_or(0)))
                .then_with(|| a.id.cmp(&b.id))
        })
        .expect("non-empty checked above");
    Ok(best.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, checksum: Option<&str>, dhash: Option<&str>) -> ImageHashRecord {
        ImageHashRecord {
            id: id.to_string(),
            checksum: checksum.map(String::from),
            dhash: dhash.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_groups_require_multiple_members() {
        let images = vec![
            record("a", Some("c1"), None),
            record("b", Some("c1"), None),
            record("c", Some("c2"), None),
            record("d", None, None),
        ];
        let groups = group_by_exact_match(&images);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].image_ids, vec!["a", "b"]);
        assert_eq!(groups[0].confidence, 100);
        assert_eq!(groups[0].similarity_type, SimilarityType::Exact);
    }

    #[test]
    fn test_find_similar_hashes_transitive() {
        // a~b and b~c within threshold unions all three even though a and c
        // are further apart.
        let mut hashes = HashMap::new();
        hashes.insert("a".to_string(), "0000000000000000".to_string());
        hashes.insert("b".to_string(), "0000000000000003".to_string());
        hashes.insert("c".to_string(), "000000000000000f".to_string());
        hashes.insert("far".to_string(), "ffffffffffffffff".to_string());

        let groups = find_similar_hashes(&hashes, 2).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0], vec!["a", "b", "c"]);
    }

    #[test]
    fn test_group_by_similarity_confidence() {
        let images = vec![
            record("a", None, Some("0000000000000000")),
            record("b", None, Some("0000000000000000")),
        ];
        let groups = group_by_similarity(&images, |i| i.dhash.as_deref(), 5).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].confidence, 100);
        assert_eq!(groups[0].similarity_type, SimilarityType::Perceptual);
    }

    #[test]
    fn test_group_by_similarity_skips_missing_hashes() {
        let images = vec![
            record("a", None, Some("0000000000000000")),
            record("b", None, None),
        ];
        let groups = group_by_similarity(&images, |i| i.dhash.as_deref(), 5).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_select_primary_prefers_quality_then_size() {
        let mut a = record("a", None, None);
        a.quality_score = Some(0.5);
        a.size_bytes = Some(100);
        let mut b = record("b", None, None);
        b.quality_score = Some(0.9);
        b.size_bytes = Some(10);
        let mut c = record("c", None, None);
        c.quality_score = Some(0.9);
        c.size_bytes = Some(50);

        let primary = select_primary_image(&[a, b, c]).unwrap();
        assert_eq!(primary, "c");
    }

    #[test]
    fn test_select_primary_full_tie_breaks_on_largest_id() {
        let mut a = record("a", None, None);
        a.quality_score = Some(0.5);
        a.size_bytes = Some(100);
        let mut b = record("b", None, None);
        b.quality_score = Some(0.5);
        b.size_bytes = Some(100);
        let mut c = record("c", None, None);
        c.quality_score = Some(0.5);
        c.size_bytes = Some(100);

        assert_eq!(select_primary_image(&[a, b, c]).unwrap(), "c");
    }

    #[test]
    fn test_select_primary_empty_errors() {
        assert!(select_primary_image(&[]).is_err());
    }
}
