//! InvoiceFlow Core — workflow orchestration for invoice document processing.
//!
//! This crate contains the orchestration engine, data models, and audit
//! store for routing invoice documents through configurable processing
//! pipelines. It has no transport dependency, making it suitable for use in:
//!
//! - HTTP servers
//! - Batch ingestion workers
//! - CLI tools
//!
//! The entry point is [`workflow::WorkflowManager`]: register stage
//! implementations, load workflow variants, and run documents through them.

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod workflow;

// Convenience re-exports
pub use config::Settings;
pub use db::Database;
pub use error::{AuditError, OrchestrationError};
pub use workflow::{ProcessingResult, WorkflowManager};
