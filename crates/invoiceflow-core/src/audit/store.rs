//! Durable audit store backed by SQLite.
//!
//! One `runs` row per sealed result plus one `stage_outcomes` row per
//! attempt, keyed by (run_id, seq) so the trail order survives storage.
//! Reads reconstruct full [`ProcessingResult`] values for history queries.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use crate::audit::AuditSink;
use crate::db::Database;
use crate::error::AuditError;
use crate::workflow::outcome::{ErrorDescriptor, StageOutcome, StageStatus};
use crate::workflow::result::{AbortReason, ProcessingResult, TerminalStatus};
use crate::workflow::stage::StageId;

pub struct SqliteAuditStore {
    db: Database,
}

impl SqliteAuditStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, result: &ProcessingResult) -> Result<(), AuditError> {
        let r = result.clone();
        self.db
            .with_conn_async(move |conn| {
                let (status, abort_reason) = match &r.terminal {
                    TerminalStatus::Completed => ("completed", None),
                    TerminalStatus::Aborted { reason } => (
                        "aborted",
                        Some(serde_json::to_string(reason).unwrap_or_default()),
                    ),
                };
                conn.execute(
                    "INSERT INTO runs (id, processing_id, variant, variant_version, status,
                                       abort_reason, confidence, warnings, started_at, finished_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        r.run_id,
                        r.processing_id,
                        r.variant,
                        r.variant_version,
                        status,
                        abort_reason,
                        r.confidence,
                        serde_json::to_string(&r.warnings).unwrap_or_default(),
                        r.started_at.timestamp_millis(),
                        r.finished_at.timestamp_millis(),
                    ],
                )?;

                let mut stmt = conn.prepare(
                    "INSERT INTO stage_outcomes (run_id, seq, stage, attempt, status, confidence,
                                                 payload, warnings, error, duration_ms, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )?;
                for (seq, outcome) in r.outcomes.iter().enumerate() {
                    stmt.execute(rusqlite::params![
                        r.run_id,
                        seq as i64,
                        outcome.stage.as_str(),
                        outcome.attempt,
                        outcome.status.as_str(),
                        outcome.confidence,
                        outcome
                            .payload
                            .as_ref()
                            .map(|p| serde_json::to_string(p).unwrap_or_default()),
                        serde_json::to_string(&outcome.warnings).unwrap_or_default(),
                        outcome
                            .error
                            .as_ref()
                            .map(|e| serde_json::to_string(e).unwrap_or_default()),
                        outcome.duration_ms as i64,
                        outcome.recorded_at.timestamp_millis(),
                    ])?;
                }
                Ok(())
            })
            .await
    }

    /// Fetch one run with its full trail.
    pub async fn get(&self, run_id: &str) -> Result<Option<ProcessingResult>, AuditError> {
        let run_id = run_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, processing_id, variant, variant_version, status, abort_reason,
                            confidence, warnings, started_at, finished_at
                     FROM runs WHERE id = ?1",
                )?;
                let Some(mut result) = stmt
                    .query_row(rusqlite::params![run_id], |row| Ok(row_to_result(row)))
                    .optional()?
                else {
                    return Ok(None);
                };

                let mut stmt = conn.prepare(
                    "SELECT stage, attempt, status, confidence, payload, warnings, error,
                            duration_ms, recorded_at
                     FROM stage_outcomes WHERE run_id = ?1 ORDER BY seq",
                )?;
                result.outcomes = stmt
                    .query_map(rusqlite::params![run_id], |row| Ok(row_to_outcome(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(result))
            })
            .await
    }

    /// Most recent runs, newest first, without their trails.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ProcessingResult>, AuditError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, processing_id, variant, variant_version, status, abort_reason,
                            confidence, warnings, started_at, finished_at
                     FROM runs ORDER BY finished_at DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![limit as i64], |row| Ok(row_to_result(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Aggregate statistics across all recorded runs.
    pub async fn statistics(&self) -> Result<serde_json::Value, AuditError> {
        self.db
            .with_conn_async(|conn| {
                let (total, completed, avg_confidence, avg_duration): (i64, i64, f64, f64) =
                    conn.query_row(
                        "SELECT COUNT(*),
                                COALESCE(SUM(status = 'completed'), 0),
                                COALESCE(AVG(confidence), 0.0),
                                COALESCE(AVG(finished_at - started_at), 0.0)
                         FROM runs",
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )?;

                let mut stmt = conn.prepare(
                    "SELECT variant, COUNT(*) FROM runs GROUP BY variant ORDER BY variant",
                )?;
                let by_variant: Vec<(String, i64)> = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(serde_json::json!({
                    "total_runs": total,
                    "completed": completed,
                    "aborted": total - completed,
                    "average_confidence": avg_confidence,
                    "average_duration_ms": avg_duration,
                    "by_variant": by_variant
                        .into_iter()
                        .map(|(v, n)| serde_json::json!({"variant": v, "runs": n}))
                        .collect::<Vec<_>>(),
                }))
            })
            .await
    }
}

#[async_trait]
impl AuditSink for SqliteAuditStore {
    async fn record(&self, result: &ProcessingResult) -> Result<(), AuditError> {
        self.save(result).await
    }
}

fn row_to_result(row: &Row<'_>) -> ProcessingResult {
    let status: String = row.get(4).unwrap_or_default();
    let abort_reason: Option<String> = row.get(5).unwrap_or_default();
    let terminal = if status == "completed" {
        TerminalStatus::Completed
    } else {
        let reason = abort_reason
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(AbortReason::Cancelled);
        TerminalStatus::Aborted { reason }
    };

    let warnings_str: String = row.get(7).unwrap_or_default();
    let started_ms: i64 = row.get(8).unwrap_or(0);
    let finished_ms: i64 = row.get(9).unwrap_or(0);

    ProcessingResult {
        run_id: row.get(0).unwrap_or_default(),
        processing_id: row.get(1).unwrap_or_default(),
        variant: row.get(2).unwrap_or_default(),
        variant_version: row.get(3).unwrap_or_default(),
        terminal,
        confidence: row.get(6).unwrap_or(0.0),
        outcomes: Vec::new(),
        warnings: serde_json::from_str(&warnings_str).unwrap_or_default(),
        started_at: chrono::DateTime::from_timestamp_millis(started_ms)
            .unwrap_or_else(|| Utc::now()),
        finished_at: chrono::DateTime::from_timestamp_millis(finished_ms)
            .unwrap_or_else(|| Utc::now()),
    }
}

fn row_to_outcome(row: &Row<'_>) -> StageOutcome {
    let stage_str: String = row.get(0).unwrap_or_default();
    let status_str: String = row.get(2).unwrap_or_default();
    let payload_str: Option<String> = row.get(4).unwrap_or_default();
    let warnings_str: String = row.get(5).unwrap_or_default();
    let error_str: Option<String> = row.get(6).unwrap_or_default();
    let recorded_ms: i64 = row.get(8).unwrap_or(0);

    StageOutcome {
        stage: StageId::parse(&stage_str).unwrap_or(StageId::DocumentParser),
        attempt: row.get(1).unwrap_or(1),
        status: StageStatus::parse(&status_str).unwrap_or(StageStatus::Failed),
        confidence: row.get(3).unwrap_or_default(),
        payload: payload_str.and_then(|s| serde_json::from_str(&s).ok()),
        warnings: serde_json::from_str(&warnings_str).unwrap_or_default(),
        error: error_str.and_then(|s| serde_json::from_str::<ErrorDescriptor>(&s).ok()),
        duration_ms: row.get::<_, i64>(7).unwrap_or(0) as u64,
        recorded_at: chrono::DateTime::from_timestamp_millis(recorded_ms)
            .unwrap_or_else(|| Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{DocumentContext, DocumentFormat, DocumentSource};
    use crate::models::invoice::Region;
    use crate::workflow::loader::WorkflowRegistry;
    use crate::workflow::result::TrailBuilder;
    use crate::workflow::stage::StageSuccess;

    fn sealed_result(terminal: TerminalStatus) -> ProcessingResult {
        let document = DocumentContext::new(
            DocumentSource::Text("invoice".to_string()),
            DocumentFormat::Text,
            "standard",
            Region::Us,
        );
        let registry =
            WorkflowRegistry::builtin(&crate::config::Settings::default()).unwrap();
        let definition = registry.get("standard").unwrap();
        let mut trail = TrailBuilder::new(&document, &definition);
        trail.push(StageOutcome::succeeded(
            StageId::DocumentParser,
            1,
            StageSuccess::new(0.92).with_warning("scanned at low resolution"),
            15,
        ));
        trail.push(StageOutcome::failed(
            StageId::DataExtraction,
            1,
            ErrorDescriptor::failure("no line items found"),
            30,
        ));
        trail.push(StageOutcome::succeeded(
            StageId::DataExtraction,
            2,
            StageSuccess::new(0.88),
            28,
        ));
        trail.seal(terminal)
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_trail_order() {
        let store = SqliteAuditStore::new(Database::open_in_memory().unwrap());
        let result = sealed_result(TerminalStatus::Completed);
        store.save(&result).await.unwrap();

        let loaded = store.get(&result.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.run_id, result.run_id);
        assert!(loaded.is_completed());
        assert_eq!(loaded.outcomes.len(), 3);
        assert_eq!(loaded.status_sequence(), result.status_sequence());
        assert_eq!(loaded.outcomes[1].attempt, 1);
        assert_eq!(
            loaded.outcomes[1].error.as_ref().unwrap().message,
            "no line items found"
        );
        assert_eq!(loaded.warnings, result.warnings);
    }

    #[tokio::test]
    async fn test_abort_reason_survives_storage() {
        let store = SqliteAuditStore::new(Database::open_in_memory().unwrap());
        let result = sealed_result(TerminalStatus::Aborted {
            reason: AbortReason::RetriesExhausted {
                stage: StageId::DataExtraction,
            },
        });
        store.save(&result).await.unwrap();

        let loaded = store.get(&result.run_id).await.unwrap().unwrap();
        assert_eq!(
            loaded.terminal,
            TerminalStatus::Aborted {
                reason: AbortReason::RetriesExhausted {
                    stage: StageId::DataExtraction
                }
            }
        );
    }

    #[tokio::test]
    async fn test_missing_run_is_none() {
        let store = SqliteAuditStore::new(Database::open_in_memory().unwrap());
        assert!(store.get("no-such-run").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_statistics_counts_terminal_states() {
        let store = SqliteAuditStore::new(Database::open_in_memory().unwrap());
        store
            .save(&sealed_result(TerminalStatus::Completed))
            .await
            .unwrap();
        store
            .save(&sealed_result(TerminalStatus::Aborted {
                reason: AbortReason::Cancelled,
            }))
            .await
            .unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats["total_runs"], 2);
        assert_eq!(stats["completed"], 1);
        assert_eq!(stats["aborted"], 1);

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
    }
}
