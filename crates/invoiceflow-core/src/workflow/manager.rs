//! Workflow orchestration loop.
//!
//! The manager walks a document through a validated workflow definition:
//! pick the current stage's rule, invoke the stage through the coordinator,
//! append the outcome, and decide the next step — advance, branch on low
//! confidence, retry, or seal. All routing decisions live here; stages never
//! see orchestration state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::error::OrchestrationError;
use crate::models::document::DocumentContext;
use crate::workflow::coordinator::AgentCoordinator;
use crate::workflow::loader::WorkflowRegistry;
use crate::workflow::outcome::StageOutcome;
use crate::workflow::result::{AbortReason, ProcessingResult, TerminalStatus, TrailBuilder};
use crate::workflow::schema::StageRule;
use crate::workflow::stage::{StageId, StageRegistry};

/// Cooperative cancellation token, checked between stage invocations. An
/// attempt already in flight runs to its own conclusion.
#[derive(Default, Clone)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What the state machine does after one recorded outcome.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Advance(StageId),
    Retry,
    Complete,
    Abort(AbortReason),
}

/// Routing decision for one outcome. Pure: the whole transition policy in
/// one place, decided from the rule, the outcome, and the attempt number.
fn next_step(rule: &StageRule, outcome: &StageOutcome, attempt: u32) -> Step {
    if outcome.is_success() {
        if outcome.meets(rule.threshold) {
            if rule.terminal {
                return Step::Complete;
            }
            match rule.next {
                Some(next) => Step::Advance(next),
                // Unreachable for a validated definition.
                None => Step::Abort(AbortReason::RetriesExhausted { stage: rule.stage }),
            }
        } else {
            // A success below threshold consumes no attempt; it reroutes.
            match rule.on_low_confidence {
                Some(next) => Step::Advance(next),
                None => Step::Abort(AbortReason::RetriesExhausted { stage: rule.stage }),
            }
        }
    } else if attempt < rule.max_attempts {
        Step::Retry
    } else {
        Step::Abort(AbortReason::RetriesExhausted { stage: rule.stage })
    }
}

/// Entry point for processing documents. Holds the validated workflow
/// definitions, the stage implementations, and the audit sink; one manager
/// serves all concurrent runs.
pub struct WorkflowManager {
    workflows: Arc<WorkflowRegistry>,
    stages: StageRegistry,
    coordinator: AgentCoordinator,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for WorkflowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowManager").finish_non_exhaustive()
    }
}

impl WorkflowManager {
    /// Build a manager, verifying up front that every stage referenced by
    /// any loaded workflow has a registered implementation.
    pub fn new(
        workflows: Arc<WorkflowRegistry>,
        stages: StageRegistry,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, OrchestrationError> {
        for id in workflows.referenced_stages() {
            if !stages.contains(id) {
                return Err(OrchestrationError::MissingStage(id));
            }
        }
        Ok(Self {
            workflows,
            stages,
            coordinator: AgentCoordinator::new(),
            audit,
        })
    }

    pub fn workflows(&self) -> &WorkflowRegistry {
        &self.workflows
    }

    /// Process a document through the named workflow variant.
    pub async fn run_workflow(
        &self,
        variant: &str,
        document: &DocumentContext,
    ) -> Result<ProcessingResult, OrchestrationError> {
        self.run_workflow_cancellable(variant, document, &CancellationHandle::new())
            .await
    }

    /// Like [`run_workflow`](Self::run_workflow), but observing a
    /// cancellation handle between stage invocations. A cancelled run seals
    /// with whatever outcomes it has accumulated.
    pub async fn run_workflow_cancellable(
        &self,
        variant: &str,
        document: &DocumentContext,
        cancellation: &CancellationHandle,
    ) -> Result<ProcessingResult, OrchestrationError> {
        let definition = self.workflows.get(variant)?;
        let mut trail = TrailBuilder::new(document, &definition);

        tracing::info!(
            "[WorkflowManager] Run {} started: variant '{}' v{}, document {}",
            trail.run_id(),
            definition.name,
            definition.version,
            document.processing_id
        );

        let mut current = definition.initial;
        let mut attempt: u32 = 1;

        let terminal = loop {
            if cancellation.is_cancelled() {
                tracing::info!(
                    "[WorkflowManager] Run {} cancelled before stage '{}'",
                    trail.run_id(),
                    current
                );
                break TerminalStatus::Aborted {
                    reason: AbortReason::Cancelled,
                };
            }

            let rule = definition.rule(current).ok_or_else(|| {
                OrchestrationError::invalid(
                    definition.name.clone(),
                    format!("stage '{}' has no rule", current),
                )
            })?;
            let stage = self
                .stages
                .get(current)
                .ok_or(OrchestrationError::MissingStage(current))?;

            let outcome = self
                .coordinator
                .invoke(stage, rule, document, attempt)
                .await;
            let step = next_step(rule, &outcome, attempt);
            trail.push(outcome);

            match step {
                Step::Advance(next) => {
                    current = next;
                    attempt = 1;
                }
                Step::Retry => {
                    attempt += 1;
                }
                Step::Complete => break TerminalStatus::Completed,
                Step::Abort(reason) => break TerminalStatus::Aborted { reason },
            }
        };

        let result = trail.seal(terminal);
        tracing::info!(
            "[WorkflowManager] Run {} finished: {} ({} outcomes, confidence {:.2})",
            result.run_id,
            if result.is_completed() {
                "completed"
            } else {
                "aborted"
            },
            result.outcomes.len(),
            result.confidence
        );

        self.deliver(&result);
        Ok(result)
    }

    /// Hand the sealed result to the audit sink without blocking the run.
    /// Audit delivery failure is logged, never surfaced to the caller.
    fn deliver(&self, result: &ProcessingResult) {
        let sink = Arc::clone(&self.audit);
        let result = result.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.record(&result).await {
                tracing::warn!(
                    "[WorkflowManager] Audit delivery failed for run {}: {}",
                    result.run_id,
                    e
                );
            }
        });
    }
}
