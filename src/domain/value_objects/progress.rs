//! Progress value objects
//!
//! A `ProgressSnapshot` is the unit published to the progress channel and
//! stored on the job row. `AggregateProgress` is the grouped view computed
//! over a job's batch rows.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Point-in-time progress of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSnapshot {
    /// Items processed so far
    pub current: u64,
    /// Total items discovered
    pub total: u64,
    /// `floor(100 * current / total)`, 0 when total is 0
    pub percent: u8,
    /// Human-readable progress message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Coarse phase label (e.g. "batching", "processing", "finalizing")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Additional metadata merged into the published payload
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressSnapshot {
    /// Creates a snapshot, computing `percent` from the counts
    pub fn new(current: u64, total: u64) -> Self {
        Self {
            current,
            total,
            percent: Self::percent_of(current, total),
            message: None,
            phase: None,
            extra: Map::new(),
        }
    }

    /// Percent as `floor(100 * current / total)`; 0 when `total == 0`
    pub fn percent_of(current: u64, total: u64) -> u8 {
        if total == 0 {
            0
        } else {
            ((current.saturating_mul(100)) / total).min(100) as u8
        }
    }

    /// Sets the progress message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the phase label
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Adds an extra metadata key to the published payload
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Aggregate progress over all batches of one job
///
/// Computed by a single grouped query over the `job_batches` table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateProgress {
    pub total_batches: u64,
    pub completed_batches: u64,
    pub failed_batches: u64,
    pub total_items: u64,
    pub success_items: u64,
    pub error_items: u64,
}

impl AggregateProgress {
    /// Items with a settled outcome (success or error)
    pub fn processed_items(&self) -> u64 {
        self.success_items + self.error_items
    }

    /// Batches with a terminal outcome
    pub fn settled_batches(&self) -> u64 {
        self.completed_batches + self.failed_batches
    }
}
