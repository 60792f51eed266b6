//! Document context — the immutable handle to one invoice submission.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::invoice::Region;

/// Detected or declared format of a submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Image,
    Text,
    #[default]
    Unknown,
}

/// Where the submission's bytes come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    /// Path to a file on disk.
    Path(PathBuf),
    /// Raw document bytes handed over by the caller.
    Bytes(Vec<u8>),
    /// Inline text content.
    Text(String),
}

/// One invoice submission. Created once when the caller hands a document
/// to the engine and never mutated afterwards; the workflow manager owns it
/// for the duration of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentContext {
    /// Unique identifier for this submission, generated at creation.
    pub processing_id: String,
    pub source: DocumentSource,
    pub format: DocumentFormat,
    /// Name of the workflow variant this submission should run through.
    pub variant: String,
    pub region: Region,
    pub submitted_at: DateTime<Utc>,
}

impl DocumentContext {
    pub fn new(
        source: DocumentSource,
        format: DocumentFormat,
        variant: impl Into<String>,
        region: Region,
    ) -> Self {
        Self {
            processing_id: uuid::Uuid::new_v4().to_string(),
            source,
            format,
            variant: variant.into(),
            region,
            submitted_at: Utc::now(),
        }
    }
}
