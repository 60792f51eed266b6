//! Stage invocation with timeout and fault containment.
//!
//! The coordinator runs exactly one stage attempt at a time and converts
//! every way an attempt can end — success, domain failure, timeout, panic —
//! into a [`StageOutcome`]. Nothing a stage does can crash the run or leak
//! an unstructured error past this layer.

use std::sync::Arc;
use std::time::Instant;

use crate::models::document::DocumentContext;
use crate::workflow::outcome::{ErrorDescriptor, StageOutcome};
use crate::workflow::schema::StageRule;
use crate::workflow::stage::Stage;

/// Runs stage attempts under the rule's timeout. Stateless; one instance is
/// shared by all concurrent runs.
#[derive(Default, Clone)]
pub struct AgentCoordinator;

impl AgentCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Invoke one attempt of `stage` and record its outcome.
    ///
    /// The stage future runs on its own task so a timeout can abort it and
    /// a panic is caught as a join error instead of unwinding into the
    /// orchestration loop.
    pub async fn invoke(
        &self,
        stage: Arc<dyn Stage>,
        rule: &StageRule,
        document: &DocumentContext,
        attempt: u32,
    ) -> StageOutcome {
        let id = rule.stage;
        let timeout = rule.timeout();
        tracing::debug!(
            "[AgentCoordinator] Invoking stage '{}' (attempt {}/{}, timeout {}s)",
            id,
            attempt,
            rule.max_attempts,
            rule.timeout_secs
        );

        let started = Instant::now();
        let doc = document.clone();
        let mut handle = tokio::spawn(async move { stage.process(&doc, attempt).await });

        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(mut success))) => {
                if !(0.0..=1.0).contains(&success.confidence) {
                    tracing::warn!(
                        "[AgentCoordinator] Stage '{}' reported confidence {} outside [0.0, 1.0], clamping",
                        id,
                        success.confidence
                    );
                    success.confidence = success.confidence.clamp(0.0, 1.0);
                }
                StageOutcome::succeeded(id, attempt, success, elapsed_ms(started))
            }
            Ok(Ok(Err(stage_error))) => {
                tracing::warn!(
                    "[AgentCoordinator] Stage '{}' failed on attempt {}: {}",
                    id,
                    attempt,
                    stage_error
                );
                StageOutcome::failed(
                    id,
                    attempt,
                    ErrorDescriptor::failure(stage_error.message),
                    elapsed_ms(started),
                )
            }
            Ok(Err(join_error)) => {
                // Task panicked or was aborted out from under us. Either way
                // the fault lies with the runtime, not the stage's domain.
                tracing::error!(
                    "[AgentCoordinator] Stage '{}' task fault on attempt {}: {}",
                    id,
                    attempt,
                    join_error
                );
                StageOutcome::failed(
                    id,
                    attempt,
                    ErrorDescriptor::internal(format!("stage task fault: {}", join_error)),
                    elapsed_ms(started),
                )
            }
            Err(_elapsed) => {
                handle.abort();
                tracing::warn!(
                    "[AgentCoordinator] Stage '{}' timed out after {}s on attempt {}",
                    id,
                    rule.timeout_secs,
                    attempt
                );
                StageOutcome::timed_out(id, attempt, rule.timeout_secs, elapsed_ms(started))
            }
        };

        tracing::debug!(
            "[AgentCoordinator] Stage '{}' attempt {} -> {} in {}ms",
            id,
            attempt,
            outcome.status.as_str(),
            outcome.duration_ms
        );
        outcome
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{DocumentFormat, DocumentSource};
    use crate::models::invoice::Region;
    use crate::workflow::outcome::{FaultKind, StageStatus};
    use crate::workflow::stage::{StageId, StageSuccess};
    use crate::workflow::testing::StaticStage;
    use std::time::Duration;

    fn document() -> DocumentContext {
        DocumentContext::new(
            DocumentSource::Text("invoice body".to_string()),
            DocumentFormat::Text,
            "standard",
            Region::Us,
        )
    }

    fn rule(stage: StageId, timeout_secs: u64) -> StageRule {
        StageRule {
            stage,
            timeout_secs,
            max_attempts: 3,
            threshold: 0.0,
            next: None,
            on_low_confidence: None,
            terminal: true,
        }
    }

    #[tokio::test]
    async fn test_success_records_confidence_and_duration() {
        let stage = Arc::new(StaticStage::succeeding(
            StageId::DocumentParser,
            StageSuccess::new(0.9),
        ));
        let outcome = AgentCoordinator::new()
            .invoke(stage, &rule(StageId::DocumentParser, 30), &document(), 1)
            .await;
        assert_eq!(outcome.status, StageStatus::Succeeded);
        assert_eq!(outcome.confidence, Some(0.9));
        assert_eq!(outcome.attempt, 1);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_clamped() {
        let stage = Arc::new(StaticStage::succeeding(
            StageId::DataExtraction,
            StageSuccess::new(1.7),
        ));
        let outcome = AgentCoordinator::new()
            .invoke(stage, &rule(StageId::DataExtraction, 30), &document(), 1)
            .await;
        assert_eq!(outcome.confidence, Some(1.0));
    }

    #[tokio::test]
    async fn test_domain_failure_becomes_failed_outcome() {
        let stage = Arc::new(StaticStage::failing(
            StageId::Validation,
            "totals do not reconcile",
        ));
        let outcome = AgentCoordinator::new()
            .invoke(stage, &rule(StageId::Validation, 30), &document(), 2)
            .await;
        assert_eq!(outcome.status, StageStatus::Failed);
        let error = outcome.error.unwrap();
        assert_eq!(error.kind, FaultKind::StageFailure);
        assert!(error.message.contains("reconcile"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stage_times_out() {
        let stage = Arc::new(
            StaticStage::succeeding(StageId::DataExtraction, StageSuccess::new(0.9))
                .with_delay(Duration::from_secs(120)),
        );
        let outcome = AgentCoordinator::new()
            .invoke(stage, &rule(StageId::DataExtraction, 45), &document(), 1)
            .await;
        assert_eq!(outcome.status, StageStatus::TimedOut);
        assert_eq!(outcome.error.unwrap().kind, FaultKind::StageTimeout);
    }

    #[tokio::test]
    async fn test_panicking_stage_is_contained() {
        struct Panicking;

        #[async_trait::async_trait]
        impl crate::workflow::stage::Stage for Panicking {
            fn id(&self) -> StageId {
                StageId::Approval
            }

            async fn process(
                &self,
                _document: &DocumentContext,
                _attempt: u32,
            ) -> Result<StageSuccess, crate::workflow::stage::StageError> {
                panic!("approval rules table corrupted");
            }
        }

        let outcome = AgentCoordinator::new()
            .invoke(Arc::new(Panicking), &rule(StageId::Approval, 30), &document(), 1)
            .await;
        assert_eq!(outcome.status, StageStatus::Failed);
        assert_eq!(outcome.error.unwrap().kind, FaultKind::OrchestrationFault);
    }
}
