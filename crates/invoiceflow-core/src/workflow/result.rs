//! Processing result — the sealed, append-only record of one workflow run.
//!
//! While a run is in flight its trail lives in a crate-private
//! [`TrailBuilder`] owned exclusively by the workflow manager. Sealing
//! produces the immutable [`ProcessingResult`] handed to the caller and the
//! audit sink; the public type exposes no mutators, so "sealed" is enforced
//! by construction rather than by a runtime flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::document::DocumentContext;
use crate::workflow::outcome::{StageOutcome, StageStatus};
use crate::workflow::schema::WorkflowDefinition;
use crate::workflow::stage::StageId;

/// Why a run ended in `aborted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// A stage exhausted its attempt budget; the trail's final entry for
    /// this stage is the terminating cause.
    RetriesExhausted { stage: StageId },
    /// The caller cancelled the run between stage invocations.
    Cancelled,
}

/// Terminal state of a run. `completed` and `aborted` are the only two ways
/// a run ends; an aborted result is a complete, valid return, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalStatus {
    Completed,
    Aborted { reason: AbortReason },
}

impl TerminalStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, TerminalStatus::Completed)
    }
}

/// The sealed record of one workflow run: every stage attempt in execution
/// order, the terminal state, and the aggregate confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Unique identifier of this run.
    pub run_id: String,
    /// Processing identifier of the document context that was run.
    pub processing_id: String,
    pub variant: String,
    pub variant_version: String,
    pub terminal: TerminalStatus,
    /// Aggregate confidence: the minimum over all succeeded outcomes'
    /// confidences, 0.0 when no stage succeeded.
    pub confidence: f64,
    /// Every stage attempt, including retries and failures, in order.
    pub outcomes: Vec<StageOutcome>,
    /// Warnings from all stages, prefixed with the reporting stage.
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn is_completed(&self) -> bool {
        self.terminal.is_completed()
    }

    /// Number of attempts recorded for a given stage.
    pub fn attempts_for(&self, stage: StageId) -> usize {
        self.outcomes.iter().filter(|o| o.stage == stage).count()
    }

    /// The last recorded outcome — for aborted runs, the terminating cause.
    pub fn final_outcome(&self) -> Option<&StageOutcome> {
        self.outcomes.last()
    }

    /// The ordered status sequence, useful for comparing deterministic runs.
    pub fn status_sequence(&self) -> Vec<(StageId, StageStatus)> {
        self.outcomes.iter().map(|o| (o.stage, o.status)).collect()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Compact summary for logs and history listings.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id,
            "variant": self.variant,
            "terminal": self.terminal,
            "confidence": self.confidence,
            "outcome_count": self.outcomes.len(),
            "warning_count": self.warnings.len(),
            "duration_ms": self.duration_ms(),
        })
    }
}

/// Unsealed trail, exclusively owned by one run of the workflow manager.
pub(crate) struct TrailBuilder {
    run_id: String,
    processing_id: String,
    variant: String,
    variant_version: String,
    outcomes: Vec<StageOutcome>,
    started_at: DateTime<Utc>,
}

impl TrailBuilder {
    pub(crate) fn new(document: &DocumentContext, definition: &WorkflowDefinition) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            processing_id: document.processing_id.clone(),
            variant: definition.name.clone(),
            variant_version: definition.version.clone(),
            outcomes: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub(crate) fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append one attempt. Outcomes arrive in strict execution order.
    pub(crate) fn push(&mut self, outcome: StageOutcome) {
        self.outcomes.push(outcome);
    }

    /// Seal the trail into an immutable result. Consumes the builder, so no
    /// further appends are possible.
    pub(crate) fn seal(self, terminal: TerminalStatus) -> ProcessingResult {
        let confidence = self
            .outcomes
            .iter()
            .filter_map(|o| o.confidence)
            .fold(None, |min: Option<f64>, c| {
                Some(min.map_or(c, |m| m.min(c)))
            })
            .unwrap_or(0.0);

        let warnings = self
            .outcomes
            .iter()
            .flat_map(|o| {
                o.warnings
                    .iter()
                    .map(move |w| format!("{}: {}", o.stage, w))
            })
            .collect();

        ProcessingResult {
            run_id: self.run_id,
            processing_id: self.processing_id,
            variant: self.variant,
            variant_version: self.variant_version,
            terminal,
            confidence,
            outcomes: self.outcomes,
            warnings,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
