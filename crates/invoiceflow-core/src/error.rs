//! Core error types for the Invoiceflow orchestration engine.
//!
//! Configuration errors (`OrchestrationError`) are the only errors that can
//! surface from `run_workflow` — they are detected before any stage runs.
//! Everything that happens during a run is absorbed into the processing
//! result as a stage outcome and drives the state machine instead of being
//! thrown past it.

use crate::workflow::stage::StageId;

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Unknown workflow variant: {0}")]
    UnknownVariant(String),

    #[error("Invalid workflow definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("No stage implementation registered for '{0}'")]
    MissingStage(StageId),

    #[error("Failed to read workflow definition '{path}': {message}")]
    DefinitionIo { path: String, message: String },
}

impl OrchestrationError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from the audit persistence layer. Audit delivery is best-effort:
/// the workflow manager logs these and never fails a run over them.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}
