//! Traits for the collaborators around the reconciliation engine
//!
//! The engine itself is a pure computation. Everything that touches the
//! outside world (processor APIs, the audit database, object storage, email)
//! sits behind one of these traits so the orchestrator can be wired against
//! real backends or the in-memory implementations in [`crate::utils`].

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::notification::Notification;
use crate::types::*;

/// Which side of the reconciliation a transaction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerSide {
    /// Records exported by the payment processor
    Processor,
    /// Records captured by the internal ledger
    Internal,
}

impl fmt::Display for LedgerSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerSide::Processor => write!(f, "processor"),
            LedgerSide::Internal => write!(f, "internal"),
        }
    }
}

/// Receives duplicate `transaction_id`s dropped while indexing
pub trait DuplicateObserver: Send + Sync {
    /// Called once for every discarded duplicate, in input order
    fn on_duplicate(&self, side: LedgerSide, processor: &str, duplicate: &Transaction);
}

/// Default observer: duplicates are reported as warnings
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDuplicateObserver;

impl DuplicateObserver for TracingDuplicateObserver {
    fn on_duplicate(&self, side: LedgerSide, processor: &str, duplicate: &Transaction) {
        tracing::warn!(
            side = %side,
            processor = processor,
            transaction_id = %duplicate.transaction_id,
            "duplicate transaction_id encountered; only the first is retained"
        );
    }
}

/// Business-rule validation applied by persistence before storing a transaction
pub trait TransactionValidator: Send + Sync {
    /// Validate a transaction as of `now`
    fn validate(&self, transaction: &Transaction, now: DateTime<Utc>) -> RunResult<()>;
}

/// Data acquisition for both sides of a run
///
/// Implementations own pagination, retries and the mapping from raw records
/// into [`Transaction`]s.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Transactions exported by the processor for `run_date`
    async fn fetch_processor_transactions(
        &self,
        processor: &str,
        run_date: NaiveDate,
    ) -> RunResult<Vec<Transaction>>;

    /// Internal ledger transactions for `run_date`
    ///
    /// The processor side is passed along for sources that look records up by id.
    async fn fetch_internal_transactions(
        &self,
        processor: &str,
        run_date: NaiveDate,
        processor_transactions: &[Transaction],
    ) -> RunResult<Vec<Transaction>>;
}

/// Lifecycle of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Audit record for one (processor, date) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRun {
    pub id: Uuid,
    pub run_date: NaiveDate,
    pub processor_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// User or system that initiated the run
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    /// Archived report location (remote URI or local path)
    pub report_location: Option<String>,
    pub error_message: Option<String>,
    pub processor_transaction_count: usize,
    pub internal_transaction_count: usize,
    pub missing_transaction_count: usize,
    pub total_discrepancy_amount: BigDecimal,
}

/// Stored row for a missing transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingTransactionRecord {
    pub id: Uuid,
    pub reconciliation_run_id: Uuid,
    pub transaction: Transaction,
}

/// Severity attached to a data quality check outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSeverity {
    Info,
    Error,
    Critical,
}

/// Outcome of one post-insert data quality check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityCheck {
    pub id: Uuid,
    pub reconciliation_run_id: Uuid,
    pub check_name: String,
    pub check_result: bool,
    pub check_details: serde_json::Value,
    pub severity: CheckSeverity,
}

/// Audit trail entry for a change to reconciliation data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// Action performed (e.g. reconciliation_started)
    pub action: String,
    pub table_name: String,
    pub record_id: Uuid,
    pub old_values: serde_json::Value,
    pub new_values: serde_json::Value,
    pub user_id: String,
    pub application_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable storage for run metadata and the audit trail
///
/// This trait allows the orchestrator to work with any storage backend
/// (PostgreSQL, SQLite, in-memory, etc.). Methods take `&self` because a
/// single store is shared by concurrently running processors.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Open a run in `running` state, reusing the id of an earlier run for
    /// the same date and processor
    async fn create_run(&self, run_date: NaiveDate, processor: &str) -> RunResult<Uuid>;

    /// Persist counts, missing transactions and data quality checks, then
    /// mark the run completed
    async fn store_result(&self, run_id: Uuid, result: &ReconciliationResult) -> RunResult<()>;

    /// Record where the report was archived
    async fn update_report_location(&self, run_id: Uuid, location: &str) -> RunResult<()>;

    /// Mark the run failed with an error message
    async fn mark_failed(&self, run_id: Uuid, error_message: &str) -> RunResult<()>;

    async fn get_run(&self, run_id: Uuid) -> RunResult<Option<ReconciliationRun>>;

    async fn get_missing_transactions(
        &self,
        run_id: Uuid,
    ) -> RunResult<Vec<MissingTransactionRecord>>;

    async fn get_quality_checks(&self, run_id: Uuid) -> RunResult<Vec<DataQualityCheck>>;

    /// Audit entries for a record, oldest first
    async fn get_audit_log(&self, record_id: Uuid) -> RunResult<Vec<AuditLogEntry>>;

    /// Runs for a processor on or after `since`, newest first
    async fn get_history(
        &self,
        processor: &str,
        since: NaiveDate,
    ) -> RunResult<Vec<ReconciliationRun>>;

    /// Whether the backend is reachable
    async fn health_check(&self) -> bool;
}

/// Where an archived report ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveLocation {
    /// Object storage URI, e.g. `s3://bucket/reports/2024-05-15/file.csv`
    Remote(String),
    /// Local fallback path
    Local(PathBuf),
}

impl ArchiveLocation {
    pub fn is_remote(&self) -> bool {
        matches!(self, ArchiveLocation::Remote(_))
    }
}

impl fmt::Display for ArchiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveLocation::Remote(uri) => write!(f, "{}", uri),
            ArchiveLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Long-term storage for generated reports
#[async_trait]
pub trait ReportArchive: Send + Sync {
    /// Archive a report file, falling back to local storage when remote storage
    /// is unavailable
    async fn archive(&self, report_path: &Path) -> RunResult<ArchiveLocation>;

    /// A link operators can download the archived report from
    async fn download_url(&self, location: &ArchiveLocation) -> Option<String>;
}

/// Delivery channel for operator notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification. `Ok(false)` means delivery was skipped
    /// (e.g. the channel is not configured).
    async fn send(&self, notification: &Notification) -> RunResult<bool>;
}
