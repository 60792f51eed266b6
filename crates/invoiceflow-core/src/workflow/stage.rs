//! The stage contract — one uniform interface for every processing step.
//!
//! Stages form a closed, tagged set ([`StageId`]) rather than an open
//! registry of arbitrary names: the orchestrator dispatches through one
//! trait and never inspects what a stage produced beyond its confidence
//! and opaque payload. New stages register an implementation against the
//! same contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::document::DocumentContext;

/// Identifier of one processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    DocumentParser,
    DataExtraction,
    Validation,
    RegionalCompliance,
    Approval,
    Audit,
    DetailedReview,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::DocumentParser => "document_parser",
            StageId::DataExtraction => "data_extraction",
            StageId::Validation => "validation",
            StageId::RegionalCompliance => "regional_compliance",
            StageId::Approval => "approval",
            StageId::Audit => "audit",
            StageId::DetailedReview => "detailed_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document_parser" => Some(StageId::DocumentParser),
            "data_extraction" => Some(StageId::DataExtraction),
            "validation" => Some(StageId::Validation),
            "regional_compliance" => Some(StageId::RegionalCompliance),
            "approval" => Some(StageId::Approval),
            "audit" => Some(StageId::Audit),
            "detailed_review" => Some(StageId::DetailedReview),
            _ => None,
        }
    }

    pub fn all() -> [StageId; 7] {
        [
            StageId::DocumentParser,
            StageId::DataExtraction,
            StageId::Validation,
            StageId::RegionalCompliance,
            StageId::Approval,
            StageId::Audit,
            StageId::DetailedReview,
        ]
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a stage hands back on success: a confidence score, an opaque
/// payload for downstream stages, and any non-fatal warnings it collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSuccess {
    /// Confidence in [0.0, 1.0]. The coordinator clamps out-of-range values.
    pub confidence: f64,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StageSuccess {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence,
            payload: serde_json::Value::Null,
            warnings: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Domain failure reported by a stage (unreadable document, extraction
/// refused, rule evaluation error). The coordinator converts this into an
/// error descriptor on the outcome; it never escapes the run.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    pub message: String,
}

impl StageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Uniform contract every processing stage implements.
///
/// A stage receives the immutable document context and its attempt number
/// and returns either a success with confidence or a typed failure. It has
/// no access to orchestration state; retries, timeouts, and branching are
/// decided outside.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn process(
        &self,
        document: &DocumentContext,
        attempt: u32,
    ) -> Result<StageSuccess, StageError>;
}

/// Registry mapping stage identifiers to their implementations.
///
/// Built once at startup and shared read-only across concurrent runs; the
/// implementations themselves must be stateless per invocation.
#[derive(Default, Clone)]
pub struct StageRegistry {
    stages: HashMap<StageId, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage implementation, replacing any previous one.
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        let id = stage.id();
        if self.stages.insert(id, stage).is_some() {
            tracing::warn!("[StageRegistry] Replaced implementation for stage '{}'", id);
        }
    }

    pub fn get(&self, id: StageId) -> Option<Arc<dyn Stage>> {
        self.stages.get(&id).cloned()
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.stages.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
