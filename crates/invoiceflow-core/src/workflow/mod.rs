//! Workflow engine — definition-driven invoice processing orchestration.
//!
//! Routes documents through a fixed set of processing stages according to a
//! named, validated workflow definition: sequential stage execution with
//! per-stage confidence thresholds, low-confidence branching, bounded
//! retries, and timeouts. Every run seals into an immutable trail of stage
//! outcomes.
//!
//! # Architecture
//!
//! ```text
//! workflow.yaml ──► WorkflowDefinition ──► WorkflowRegistry (validated)
//!                                               │
//!                    StageRegistry ────► WorkflowManager
//!                                               │
//!                                       AgentCoordinator (timeout, containment)
//!                                               │
//!                                        Stage implementations
//!                                               │
//!                  TrailBuilder ──seal──► ProcessingResult ──► AuditSink
//! ```

pub mod coordinator;
pub mod loader;
pub mod manager;
pub mod outcome;
pub mod result;
pub mod schema;
pub mod stage;
pub mod testing;

pub use coordinator::AgentCoordinator;
pub use loader::WorkflowRegistry;
pub use manager::{CancellationHandle, WorkflowManager};
pub use outcome::{ErrorDescriptor, FaultKind, StageOutcome, StageStatus};
pub use result::{AbortReason, ProcessingResult, TerminalStatus};
pub use schema::{StageRule, WorkflowDefinition};
pub use stage::{Stage, StageError, StageId, StageRegistry, StageSuccess};
