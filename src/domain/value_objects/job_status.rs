//! JobStatus value object
//!
//! Wire-visible status of a job. The uppercase string forms are part of
//! the HTTP contract and must not change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job status enum
///
/// Transitions form a monotonic DAG: `PENDING -> PROGRESS -> {SUCCESS, FAILURE}`.
/// Retries never walk a job backwards; a requeue creates a fresh job instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Created, not yet picked up by the controller
    Pending,
    /// Controller is running the job
    Progress,
    /// Terminal: completed (possibly with per-item errors)
    Success,
    /// Terminal: failed, cancelled, or requeued
    Failure,
}

impl JobStatus {
    /// Returns the wire string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Progress => "PROGRESS",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
        }
    }

    /// Checks whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }

    /// Checks whether the transition `self -> next` is allowed
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(
                next,
                JobStatus::Progress | JobStatus::Success | JobStatus::Failure
            ),
            JobStatus::Progress => matches!(next, JobStatus::Success | JobStatus::Failure),
            JobStatus::Success | JobStatus::Failure => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = crate::shared::error::DomainError;

    /// Parses a wire status string.
    ///
    /// `STARTED` is a historical alias for `PROGRESS` published by the
    /// tagging job once its batches are spawned; accept it here so older
    /// rows and clients keep working.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROGRESS" | "STARTED" => Ok(JobStatus::Progress),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILURE" => Ok(JobStatus::Failure),
            _ => Err(crate::shared::error::DomainError::InvalidInput(format!(
                "Invalid job status: {}",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Progress.is_terminal());
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failure.is_terminal());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Progress));
        assert!(JobStatus::Progress.can_transition_to(JobStatus::Success));
        assert!(JobStatus::Progress.can_transition_to(JobStatus::Failure));
        assert!(!JobStatus::Success.can_transition_to(JobStatus::Progress));
        assert!(!JobStatus::Failure.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Success.can_transition_to(JobStatus::Failure));
    }

    #[test]
    fn test_started_alias_parses_as_progress() {
        assert_eq!("STARTED".parse::<JobStatus>().unwrap(), JobStatus::Progress);
        assert_eq!("PROGRESS".parse::<JobStatus>().unwrap(), JobStatus::Progress);
    }

    #[test]
    fn test_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Progress,
            JobStatus::Success,
            JobStatus::Failure,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }
}
