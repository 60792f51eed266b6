//! Test doubles for the stage contract.
//!
//! Deterministic stages for exercising the orchestration loop without real
//! document processing: a fixed-reply stage, a scripted stage that replays a
//! queue of replies across attempts, and a helper that registers a full set
//! of passing stages.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::models::document::DocumentContext;
use crate::workflow::stage::{Stage, StageError, StageId, StageRegistry, StageSuccess};

/// Stage that returns the same reply on every invocation, after an optional
/// delay.
pub struct StaticStage {
    id: StageId,
    reply: Result<StageSuccess, StageError>,
    delay: Option<Duration>,
}

impl StaticStage {
    pub fn succeeding(id: StageId, success: StageSuccess) -> Self {
        Self {
            id,
            reply: Ok(success),
            delay: None,
        }
    }

    pub fn failing(id: StageId, message: impl Into<String>) -> Self {
        Self {
            id,
            reply: Err(StageError::new(message)),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Stage for StaticStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn process(
        &self,
        _document: &DocumentContext,
        _attempt: u32,
    ) -> Result<StageSuccess, StageError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone()
    }
}

/// Stage that replays a scripted sequence of replies, one per invocation.
/// Exhausting the script is itself a failure, so a test that under- or
/// over-invokes a stage fails loudly.
pub struct ScriptedStage {
    id: StageId,
    replies: Mutex<VecDeque<Result<StageSuccess, StageError>>>,
}

impl ScriptedStage {
    pub fn new(
        id: StageId,
        replies: impl IntoIterator<Item = Result<StageSuccess, StageError>>,
    ) -> Self {
        Self {
            id,
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }

    /// Remaining unconsumed replies.
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn process(
        &self,
        _document: &DocumentContext,
        _attempt: u32,
    ) -> Result<StageSuccess, StageError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(StageError::new(format!(
                    "scripted stage '{}' invoked past its script",
                    self.id
                )))
            })
    }
}

/// Registry with every stage registered as a passing [`StaticStage`] at the
/// given confidence.
pub fn full_registry(confidence: f64) -> StageRegistry {
    let mut registry = StageRegistry::new();
    for id in StageId::all() {
        registry.register(Arc::new(StaticStage::succeeding(
            id,
            StageSuccess::new(confidence),
        )));
    }
    registry
}

/// Registry like [`full_registry`] with one stage overridden.
pub fn registry_with(confidence: f64, stage: Arc<dyn Stage>) -> StageRegistry {
    let mut registry = full_registry(confidence);
    registry.register(stage);
    registry
}
