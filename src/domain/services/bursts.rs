//! Burst sequence detection
//!
//! Detects runs of images taken in rapid succession based on capture
//! timestamps and camera identity. Pure algorithmic approach - no ML,
//! no database access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AnalysisError;

/// Image fields needed for burst detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstImage {
    pub id: String,
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    /// Camera identity ("Make Model"); images from different cameras never
    /// share a burst
    pub camera: Option<String>,
    pub quality_score: f64,
}

/// A detected burst sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Burst {
    /// Member image ids in capture order
    pub image_ids: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub camera: Option<String>,
    /// Representative image chosen by `select_best_in_burst`
    pub best_image_id: Option<String>,
}

/// Method for choosing the representative image of a burst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BestSelection {
    /// Highest quality score
    Quality,
    /// First by capture order
    First,
    /// Middle of the sequence
    Middle,
}

impl BestSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            BestSelection::Quality => "quality",
            BestSelection::First => "first",
            BestSelection::Middle => "middle",
        }
    }
}

/// Detects burst sequences
///
/// A burst is a maximal run of images from the same camera where
/// consecutive captures differ by at most `gap_threshold` seconds, with at
/// least `min_size` members.
pub fn detect_bursts(
    images: &[BurstImage],
    gap_threshold: f64,
    min_size: usize,
) -> Vec<Burst> {
    if images.len() < min_size || min_size == 0 {
        return Vec::new();
    }

    // Partition by camera; bursts never cross camera boundaries.
    let mut by_camera: std::collections::BTreeMap<String, Vec<&BurstImage>> =
        std::collections::BTreeMap::new();
    for img in images {
        let camera = img.camera.clone().unwrap_or_else(|| "unknown".to_string());
        by_camera.entry(camera).or_default().push(img);
    }

    let mut all_bursts = Vec::new();
    for (_camera, mut camera_images) in by_camera {
        camera_images.sort_by_key(|img| img.timestamp);
        all_bursts.extend(find_sequences(&camera_images, gap_threshold, min_size));
    }

    all_bursts.sort_by_key(|b| b.start_time);
    all_bursts
}

/// Finds qualifying runs in time-sorted images from one camera
fn find_sequences(
    sorted_images: &[&BurstImage],
    gap_threshold: f64,
    min_size: usize,
) -> Vec<Burst> {
    let mut bursts = Vec::new();
    let mut current: Vec<&BurstImage> = vec![sorted_images[0]];

    for pair in sorted_images.windows(2) {
        let gap = (pair[1].timestamp - pair[0].timestamp)
            .num_milliseconds() as f64
            / 1000.0;
        if gap <= gap_threshold {
            current.push(pair[1]);
        } else {
            if current.len() >= min_size {
                bursts.push(make_burst(&current));
            }
            current = vec![pair[1]];
        }
    }

    if current.len() >= min_size {
        bursts.push(make_burst(&current));
    }

    bursts
}

fn make_burst(images: &[&BurstImage]) -> Burst {
    let start = images.first().expect("burst is non-empty").timestamp;
    let end = images.last().expect("burst is non-empty").timestamp;
    Burst {
        image_ids: images.iter().map(|img| img.id.clone()).collect(),
        start_time: start,
        end_time: end,
        duration_seconds: (end - start).num_milliseconds() as f64 / 1000.0,
        camera: images[0].camera.clone(),
        best_image_id: None,
    }
}

/// Merges bursts that span batch boundaries
///
/// When the parallel workers each scanned a contiguous time slice, a burst
/// ending at the tail of slice N may continue at the head of slice N+1.
/// Input must be ordered by start time; two adjacent bursts merge when they
/// share a camera and the boundary gap is within `gap_threshold`. Groups
/// below `min_size` after merging are dropped.
pub fn merge_adjacent_bursts(
    bursts: Vec<Burst>,
    gap_threshold: f64,
    min_size: usize,
) -> Vec<Burst> {
    if bursts.len() <= 1 {
        return bursts
            .into_iter()
            .filter(|b| b.image_ids.len() >= min_size)
            .collect();
    }

    let mut merged = Vec::new();
    let mut iter = bursts.into_iter();
    let mut current = iter.next().expect("len > 1 checked above");

    for next in iter {
        let gap = (next.start_time - current.end_time).num_milliseconds() as f64 / 1000.0;
        let same_camera = current.camera == next.camera;

        if same_camera && gap <= gap_threshold {
            current.image_ids.extend(next.image_ids);
            current.end_time = next.end_time;
            current.duration_seconds =
                (current.end_time - current.start_time).num_milliseconds() as f64 / 1000.0;
        } else {
            if current.image_ids.len() >= min_size {
                merged.push(current);
            }
            current = next;
        }
    }

    if current.image_ids.len() >= min_size {
        merged.push(current);
    }

    merged
}

/// Selects the representative image of a burst
///
/// # Errors
/// Returns `EmptyInput` when called with no images.
pub fn select_best_in_burst(
    images: &[BurstImage],
    method: BestSelection,
) -> Result<String, AnalysisError> {
    if images.is_empty() {
        return Err(AnalysisError::EmptyInput(
            "cannot select the best image of an empty burst".into(),
        ));
    }

    let best = match method {
        BestSelection::First => &images[0],
        BestSelection::Middle => &images[images.len() / 2],
        BestSelection::Quality => {
            // Strict greater-than keeps the earliest image on tied
            // scores, which matters when a whole burst has the default
            // quality of 0
            let mut best = &images[0];
            for img in &images[1..] {
                if img.quality_score > best.quality_score {
                    best = img;
                }
            }
            best
        }
    };
    Ok(best.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn img(id: &str, offset_secs: f64, camera: &str, quality: f64) -> BurstImage {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        BurstImage {
            id: id.to_string(),
            timestamp: base + chrono::Duration::milliseconds((offset_secs * 1000.0) as i64),
            camera: Some(camera.to_string()),
            quality_score: quality,
        }
    }

    #[test]
    fn test_detects_simple_burst() {
        let images = vec![
            img("a", 0.0, "Canon R5", 0.5),
            img("b", 0.5, "Canon R5", 0.9),
            img("c", 1.0, "Canon R5", 0.7),
            img("d", 60.0, "Canon R5", 0.4),
        ];
        let bursts = detect_bursts(&images, 2.0, 3);
        assert_eq!(bursts.len(), 1);
        assert_eq!(bursts[0].image_ids, vec!["a", "b", "c"]);
        assert!((bursts[0].duration_seconds - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_rule_splits_sequences() {
        let images = vec![
            img("a", 0.0, "X", 0.0),
            img("b", 1.0, "X", 0.0),
            img("c", 2.0, "X", 0.0),
            img("d", 10.0, "X", 0.0),
            img("e", 11.0, "X", 0.0),
            img("f", 12.0, "X", 0.0),
        ];
        let bursts = detect_bursts(&images, 2.0, 3);
        assert_eq!(bursts.len(), 2);
        assert_eq!(bursts[0].image_ids, vec!["a", "b", "c"]);
        assert_eq!(bursts[1].image_ids, vec!["d", "e", "f"]);
    }

    #[test]
    fn test_cameras_never_share_a_burst() {
        let images = vec![
            img("a", 0.0, "X", 0.0),
            img("b", 0.5, "Y", 0.0),
            img("c", 1.0, "X", 0.0),
            img("d", 1.5, "Y", 0.0),
            img("e", 2.0, "X", 0.0),
            img("f", 2.5, "Y", 0.0),
        ];
        let bursts = detect_bursts(&images, 2.0, 3);
        assert_eq!(bursts.len(), 2);
        for burst in &bursts {
            let cameras: std::collections::HashSet<_> = burst
                .image_ids
                .iter()
                .map(|id| {
                    images
                        .iter()
                        .find(|i| &i.id == id)
                        .unwrap()
                        .camera
                        .clone()
                })
                .collect();
            assert_eq!(cameras.len(), 1);
        }
    }

    #[test]
    fn test_min_size_enforced() {
        let images = vec![img("a", 0.0, "X", 0.0), img("b", 0.5, "X", 0.0)];
        assert!(detect_bursts(&images, 2.0, 3).is_empty());
    }

    #[test]
    fn test_merge_adjacent_bursts_across_boundary() {
        let first = Burst {
            image_ids: vec!["a".into(), "b".into(), "c".into()],
            start_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 2).unwrap(),
            duration_seconds: 2.0,
            camera: Some("X".into()),
            best_image_id: None,
        };
        let second = Burst {
            image_ids: vec!["d".into(), "e".into(), "f".into()],
            start_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 3).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 5).unwrap(),
            duration_seconds: 2.0,
            camera: Some("X".into()),
            best_image_id: None,
        };
        let merged = merge_adjacent_bursts(vec![first, second], 2.0, 3);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].image_ids.len(), 6);
        assert!((merged[0].duration_seconds - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_respects_camera_identity() {
        let first = Burst {
            image_ids: vec!["a".into(), "b".into(), "c".into()],
            start_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 2).unwrap(),
            duration_seconds: 2.0,
            camera: Some("X".into()),
            best_image_id: None,
        };
        let second = Burst {
            image_ids: vec!["d".into(), "e".into(), "f".into()],
            start_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 3).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 5).unwrap(),
            duration_seconds: 2.0,
            camera: Some("Y".into()),
            best_image_id: None,
        };
        let merged = merge_adjacent_bursts(vec![first, second], 2.0, 3);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_select_best_methods() {
        let images = vec![
            img("a", 0.0, "X", 0.3),
            img("b", 0.5, "X", 0.9),
            img("c", 1.0, "X", 0.6),
        ];
        assert_eq!(
            select_best_in_burst(&images, BestSelection::Quality).unwrap(),
            "b"
        );
        assert_eq!(
            select_best_in_burst(&images, BestSelection::First).unwrap(),
            "a"
        );
        assert_eq!(
            select_best_in_burst(&images, BestSelection::Middle).unwrap(),
            "b"
        );
        assert!(select_best_in_burst(&[], BestSelection::Quality).is_err());
    }

    #[test]
    fn test_select_best_quality_tie_keeps_first() {
        let images = vec![
            img("a", 0.0, "X", 0.0),
            img("b", 0.5, "X", 0.0),
            img("c", 1.0, "X", 0.0),
        ];
        assert_eq!(
            select_best_in_burst(&images, BestSelection::Quality).unwrap(),
            "a"
        );
    }
}
