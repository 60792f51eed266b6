//! YAML schema types for workflow definitions.
//!
//! A workflow YAML defines one named, versioned processing path: the stage
//! order, per-stage confidence thresholds, attempt budgets, timeouts, and
//! the transition table (advance / branch-on-low-confidence / terminate):
//!
//! ```yaml
//! name: "standard"
//! description: "Full six-stage review path"
//! version: "1.0"
//! initial: document_parser
//!
//! stages:
//!   - stage: document_parser
//!     timeout_secs: 30
//!     max_attempts: 3
//!     next: data_extraction
//!
//!   - stage: data_extraction
//!     timeout_secs: 45
//!     max_attempts: 3
//!     threshold: 0.85
//!     next: validation
//!     on_low_confidence: detailed_review
//!
//!   - stage: audit
//!     timeout_secs: 15
//!     max_attempts: 1
//!     terminal: true
//! ```
//!
//! Definitions are immutable once loaded and validated; see
//! [`crate::workflow::loader`] for the structural checks applied before any
//! document is processed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::OrchestrationError;
use crate::workflow::stage::StageId;

/// Transition rule for one stage within a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRule {
    pub stage: StageId,

    /// Per-attempt timeout; an unresponsive stage is recorded as timed out,
    /// not raised as an error.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum number of attempts for this stage, first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Confidence threshold a successful outcome must meet (inclusive) to
    /// take the `next` edge. 0.0 means any success advances.
    #[serde(default)]
    pub threshold: f64,

    /// Successor on a passing success. Absent exactly when `terminal`.
    #[serde(default)]
    pub next: Option<StageId>,

    /// Branch target for a success below `threshold`. Low confidence never
    /// advances silently; it must route through a stage named here.
    #[serde(default)]
    pub on_low_confidence: Option<StageId>,

    /// A passing success on a terminal stage completes the run.
    #[serde(default)]
    pub terminal: bool,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

impl StageRule {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A named, versioned workflow definition: ordered stage rules plus the
/// initial stage. Immutable once loaded; shared read-only across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_version")]
    pub version: String,

    /// Stage the state machine starts in, at attempt 1.
    pub initial: StageId,

    /// Transition table, in declared stage order.
    pub stages: Vec<StageRule>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl WorkflowDefinition {
    /// Parse a workflow definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, OrchestrationError> {
        serde_yaml::from_str(yaml).map_err(|e| OrchestrationError::InvalidDefinition {
            name: "<inline>".to_string(),
            reason: format!("YAML parse error: {}", e),
        })
    }

    /// Load a workflow definition from a file path.
    pub fn from_file(path: &str) -> Result<Self, OrchestrationError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| OrchestrationError::DefinitionIo {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        serde_yaml::from_str(&content).map_err(|e| OrchestrationError::InvalidDefinition {
            name: path.to_string(),
            reason: format!("YAML parse error: {}", e),
        })
    }

    /// The transition rule for a stage, if the definition declares one.
    pub fn rule(&self, stage: StageId) -> Option<&StageRule> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// The declared terminal-state set.
    pub fn terminal_stages(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|r| r.terminal)
            .map(|r| r.stage)
            .collect()
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = StageId> + '_ {
        self.stages.iter().map(|r| r.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_workflow() {
        let yaml = r#"
name: "mini"
initial: document_parser
stages:
  - stage: document_parser
    next: audit
  - stage: audit
    terminal: true
"#;
        let def = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(def.name, "mini");
        assert_eq!(def.version, "1.0");
        assert_eq!(def.initial, StageId::DocumentParser);
        assert_eq!(def.stages.len(), 2);
        // defaults
        assert_eq!(def.stages[0].timeout_secs, 30);
        assert_eq!(def.stages[0].max_attempts, 3);
        assert_eq!(def.stages[0].threshold, 0.0);
        assert_eq!(def.terminal_stages(), vec![StageId::Audit]);
    }

    #[test]
    fn test_parse_full_workflow() {
        let yaml = r#"
name: "standard"
description: "Full review path"
version: "2.0"
initial: document_parser
stages:
  - stage: document_parser
    timeout_secs: 30
    max_attempts: 3
    next: data_extraction
  - stage: data_extraction
    timeout_secs: 45
    max_attempts: 3
    threshold: 0.85
    next: validation
    on_low_confidence: detailed_review
  - stage: detailed_review
    timeout_secs: 60
    max_attempts: 2
    next: validation
  - stage: validation
    timeout_secs: 30
    max_attempts: 2
    next: audit
  - stage: audit
    timeout_secs: 15
    max_attempts: 1
    terminal: true
"#;
        let def = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(def.version, "2.0");
        let extraction = def.rule(StageId::DataExtraction).unwrap();
        assert_eq!(extraction.threshold, 0.85);
        assert_eq!(extraction.on_low_confidence, Some(StageId::DetailedReview));
        assert_eq!(extraction.timeout(), std::time::Duration::from_secs(45));
        assert!(def.rule(StageId::Approval).is_none());
    }

    #[test]
    fn test_parse_rejects_bad_yaml() {
        let err = WorkflowDefinition::from_yaml("stages: [what").unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::InvalidDefinition { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_stage_name() {
        let yaml = r#"
name: "bad"
initial: ocr
stages:
  - stage: ocr
    terminal: true
"#;
        assert!(WorkflowDefinition::from_yaml(yaml).is_err());
    }
}
