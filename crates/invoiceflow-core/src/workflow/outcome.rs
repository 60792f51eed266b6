//! Stage outcomes — the canonical record of one stage attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::stage::{StageId, StageSuccess};

/// Status of one stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    TimedOut,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::TimedOut => "timed_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(StageStatus::Succeeded),
            "failed" => Some(StageStatus::Failed),
            "timed_out" => Some(StageStatus::TimedOut),
            _ => None,
        }
    }
}

/// Classifies what went wrong when an attempt did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The stage itself reported a domain failure.
    StageFailure,
    /// The stage did not respond within its allotted time.
    StageTimeout,
    /// An internal fault in the coordinator or runtime, not attributable
    /// to the stage. Consumes a retry attempt like any other failure.
    OrchestrationFault,
}

/// Structured description of a non-success, recorded on the outcome
/// instead of propagating an unstructured error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: FaultKind,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::StageFailure,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::StageTimeout,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::OrchestrationFault,
            message: message.into(),
        }
    }
}

/// Result of one stage invocation. Immutable once produced; appended to the
/// processing result in strict attempt order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: StageId,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    pub status: StageStatus,
    /// Present exactly when `status` is `succeeded`.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Stage-specific data, opaque to the orchestrator.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Present exactly when `status` is not `succeeded`.
    #[serde(default)]
    pub error: Option<ErrorDescriptor>,
    /// Wall-clock duration of this attempt.
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl StageOutcome {
    pub fn succeeded(stage: StageId, attempt: u32, success: StageSuccess, duration_ms: u64) -> Self {
        Self {
            stage,
            attempt,
            status: StageStatus::Succeeded,
            confidence: Some(success.confidence),
            payload: Some(success.payload),
            warnings: success.warnings,
            error: None,
            duration_ms,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(stage: StageId, attempt: u32, error: ErrorDescriptor, duration_ms: u64) -> Self {
        Self {
            stage,
            attempt,
            status: StageStatus::Failed,
            confidence: None,
            payload: None,
            warnings: Vec::new(),
            error: Some(error),
            duration_ms,
            recorded_at: Utc::now(),
        }
    }

    pub fn timed_out(stage: StageId, attempt: u32, timeout_secs: u64, duration_ms: u64) -> Self {
        Self {
            stage,
            attempt,
            status: StageStatus::TimedOut,
            confidence: None,
            payload: None,
            warnings: Vec::new(),
            error: Some(ErrorDescriptor::timeout(format!(
                "Stage '{}' did not respond within {}s",
                stage, timeout_secs
            ))),
            duration_ms,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }

    /// Whether a successful outcome meets the given confidence threshold.
    /// The comparison is inclusive: a confidence exactly on the threshold
    /// counts as meeting it.
    pub fn meets(&self, threshold: f64) -> bool {
        self.is_success() && self.confidence.is_some_and(|c| c >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let outcome =
            StageOutcome::succeeded(StageId::DataExtraction, 1, StageSuccess::new(0.8), 12);
        assert!(outcome.meets(0.8));
        assert!(!outcome.meets(0.81));
    }

    #[test]
    fn test_failed_outcome_carries_descriptor() {
        let outcome = StageOutcome::failed(
            StageId::Validation,
            2,
            ErrorDescriptor::failure("totals do not reconcile"),
            5,
        );
        assert_eq!(outcome.status, StageStatus::Failed);
        assert!(outcome.confidence.is_none());
        assert_eq!(outcome.error.unwrap().kind, FaultKind::StageFailure);
    }

    #[test]
    fn test_timeout_outcome_distinct_from_failure() {
        let outcome = StageOutcome::timed_out(StageId::DataExtraction, 1, 45, 45_000);
        assert_eq!(outcome.status, StageStatus::TimedOut);
        assert_eq!(outcome.error.as_ref().unwrap().kind, FaultKind::StageTimeout);
        assert!(!outcome.meets(0.0));
    }
}
