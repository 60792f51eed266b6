//! Audit delivery — where sealed processing results go.
//!
//! The workflow manager hands every sealed result to an [`AuditSink`] on a
//! detached task: delivery failures are logged and never affect the run or
//! its caller. [`store::SqliteAuditStore`] is the durable sink; the
//! [`TracingAuditSink`] just logs summaries and backs tests and setups that
//! do not need history.

pub mod store;

use async_trait::async_trait;

use crate::error::AuditError;
use crate::workflow::result::ProcessingResult;

/// Receiver for sealed processing results.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, result: &ProcessingResult) -> Result<(), AuditError>;
}

/// Sink that logs a one-line summary per run and keeps nothing.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, result: &ProcessingResult) -> Result<(), AuditError> {
        tracing::info!("[Audit] {}", result.summary());
        Ok(())
    }
}
