//! In-memory reconciliation store for testing and development

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::reporting::impact::{high_value_threshold, success_rate};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::BusinessRuleValidator;

const RUNS_TABLE: &str = "reconciliation_runs";

#[derive(Debug, Default)]
struct StoreState {
    runs: HashMap<Uuid, ReconciliationRun>,
    run_keys: HashMap<(NaiveDate, String), Uuid>,
    missing: HashMap<Uuid, Vec<MissingTransactionRecord>>,
    checks: HashMap<Uuid, Vec<DataQualityCheck>>,
    audit_log: Vec<AuditLogEntry>,
}

/// In-memory storage with the same audit semantics as the SQL backend
///
/// Every write happens under one lock, so a stored result is applied
/// atomically just like a database transaction would.
#[derive(Clone)]
pub struct MemoryStorage {
    state: Arc<RwLock<StoreState>>,
    validator: Arc<dyn TransactionValidator>,
    created_by: String,
    application_name: String,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            validator: Arc::new(BusinessRuleValidator),
            created_by: "reconciliation_system".to_string(),
            application_name: "fintech_reconciliation_system".to_string(),
        }
    }

    /// Use a custom validator for missing transaction rows
    pub fn with_validator(mut self, validator: Arc<dyn TransactionValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Set who runs are attributed to in the audit trail
    pub fn with_identity(
        mut self,
        created_by: impl Into<String>,
        application_name: impl Into<String>,
    ) -> Self {
        self.created_by = created_by.into();
        self.application_name = application_name.into();
        self
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> RunResult<()> {
        *self.state.write().map_err(poisoned)? = StoreState::default();
        Ok(())
    }

    fn audit_entry(
        &self,
        action: &str,
        record_id: Uuid,
        old_values: serde_json::Value,
        new_values: serde_json::Value,
    ) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            action: action.to_string(),
            table_name: RUNS_TABLE.to_string(),
            record_id,
            old_values,
            new_values,
            user_id: self.created_by.clone(),
            application_name: self.application_name.clone(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("created_by", &self.created_by)
            .field("application_name", &self.application_name)
            .finish_non_exhaustive()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> ReconciliationError {
    ReconciliationError::Storage("store lock poisoned".to_string())
}

/// Post-insert checks comparing stored rows against the summary
fn quality_checks(
    run_id: Uuid,
    result: &ReconciliationResult,
    rows: &[MissingTransactionRecord],
) -> Vec<DataQualityCheck> {
    let summary = &result.summary;
    let actual_count = rows.len();
    let actual_amount: BigDecimal = rows.iter().map(|r| &r.transaction.amount).sum();

    let count_passed = actual_count == summary.missing_transactions_count;
    let amount_passed = actual_amount == summary.total_discrepancy_amount;
    let high_discrepancy = summary.total_discrepancy_amount > high_value_threshold();

    let outcome = |check_name: &str, passed: bool, details, failure: CheckSeverity| {
        DataQualityCheck {
            id: Uuid::new_v4(),
            reconciliation_run_id: run_id,
            check_name: check_name.to_string(),
            check_result: passed,
            check_details: details,
            severity: if passed { CheckSeverity::Info } else { failure },
        }
    };

    vec![
        outcome(
            "missing_transaction_count_validation",
            count_passed,
            json!({
                "expected_count": summary.missing_transactions_count,
                "actual_count": actual_count,
            }),
            CheckSeverity::Error,
        ),
        outcome(
            "total_discrepancy_amount_validation",
            amount_passed,
            json!({
                "expected_amount": summary.total_discrepancy_amount.to_string(),
                "actual_amount": actual_amount.to_string(),
                "difference": (&summary.total_discrepancy_amount - &actual_amount).abs().to_string(),
            }),
            CheckSeverity::Error,
        ),
        outcome(
            "high_discrepancy_alert",
            !high_discrepancy,
            json!({
                "discrepancy_amount": summary.total_discrepancy_amount.to_string(),
                "threshold": high_value_threshold().to_string(),
                "success_rate": success_rate(summary).round(2).with_scale(2).to_string(),
            }),
            CheckSeverity::Critical,
        ),
    ]
}

#[async_trait]
impl ReconciliationStore for MemoryStorage {
    async fn create_run(&self, run_date: NaiveDate, processor: &str) -> RunResult<Uuid> {
        let mut state = self.state.write().map_err(poisoned)?;
        let now = Utc::now();
        let key = (run_date, processor.to_string());

        let run_id = match state.run_keys.get(&key).copied() {
            Some(existing) => {
                if let Some(run) = state.runs.get_mut(&existing) {
                    run.status = RunStatus::Running;
                    run.start_time = now;
                    run.end_time = None;
                    run.error_message = None;
                    run.updated_at = Some(now);
                    run.report_location = None;
                    run.processor_transaction_count = 0;
                    run.internal_transaction_count = 0;
                    run.missing_transaction_count = 0;
                    run.total_discrepancy_amount = BigDecimal::from(0);
                }
                state.missing.remove(&existing);
                state.checks.remove(&existing);
                existing
            }
            None => {
                let run = ReconciliationRun {
                    id: Uuid::new_v4(),
                    run_date,
                    processor_name: processor.to_string(),
                    start_time: now,
                    end_time: None,
                    status: RunStatus::Running,
                    created_by: self.created_by.clone(),
                    updated_at: None,
                    report_location: None,
                    error_message: None,
                    processor_transaction_count: 0,
                    internal_transaction_count: 0,
                    missing_transaction_count: 0,
                    total_discrepancy_amount: BigDecimal::from(0),
                };
                let id = run.id;
                state.runs.insert(id, run);
                state.run_keys.insert(key, id);
                id
            }
        };

        let entry = self.audit_entry(
            "reconciliation_started",
            run_id,
            json!({}),
            json!({ "processor": processor, "run_date": run_date.to_string() }),
        );
        state.audit_log.push(entry);

        tracing::debug!(%run_id, processor, %run_date, "reconciliation run opened");
        Ok(run_id)
    }

    async fn store_result(&self, run_id: Uuid, result: &ReconciliationResult) -> RunResult<()> {
        let now = Utc::now();
        let mut state = self.state.write().map_err(poisoned)?;
        if !state.runs.contains_key(&run_id) {
            return Err(ReconciliationError::RunNotFound(run_id));
        }

        let mut rows = Vec::with_capacity(result.missing_transactions_details.len());
        for txn in &result.missing_transactions_details {
            match self.validator.validate(txn, now) {
                Ok(()) => rows.push(MissingTransactionRecord {
                    id: Uuid::new_v4(),
                    reconciliation_run_id: run_id,
                    transaction: txn.clone(),
                }),
                Err(err) => {
                    tracing::warn!(
                        %run_id,
                        transaction_id = %txn.transaction_id,
                        error = %err,
                        "skipping invalid missing transaction"
                    );
                }
            }
        }
        if rows.is_empty() && !result.missing_transactions_details.is_empty() {
            tracing::warn!(%run_id, "no valid missing transactions to insert");
        }

        let checks = quality_checks(run_id, result, &rows);
        for check in checks.iter().filter(|c| !c.check_result) {
            tracing::warn!(%run_id, check = %check.check_name, severity = ?check.severity, "data quality check failed");
        }

        let summary = &result.summary;
        let inserted = rows.len();
        state.missing.insert(run_id, rows);
        state.checks.insert(run_id, checks);

        if let Some(run) = state.runs.get_mut(&run_id) {
            run.status = RunStatus::Completed;
            run.end_time = Some(now);
            run.updated_at = Some(now);
            run.processor_transaction_count = summary.processor_transactions;
            run.internal_transaction_count = summary.internal_transactions;
            run.missing_transaction_count = summary.missing_transactions_count;
            run.total_discrepancy_amount = summary.total_discrepancy_amount.clone();
        }

        let entry = self.audit_entry(
            "reconciliation_completed",
            run_id,
            json!({}),
            json!({
                "processor": result.processor,
                "run_date": result.reconciliation_date.to_string(),
                "missing_count": summary.missing_transactions_count,
                "discrepancy_amount": summary.total_discrepancy_amount.to_string(),
                "success_rate": success_rate(summary).round(2).with_scale(2).to_string(),
            }),
        );
        state.audit_log.push(entry);

        tracing::info!(
            %run_id,
            processor = %result.processor,
            missing_count = summary.missing_transactions_count,
            inserted,
            discrepancy_amount = %summary.total_discrepancy_amount,
            "stored reconciliation result"
        );
        Ok(())
    }

    async fn update_report_location(&self, run_id: Uuid, location: &str) -> RunResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or(ReconciliationError::RunNotFound(run_id))?;

        let previous = run.report_location.replace(location.to_string());
        run.updated_at = Some(Utc::now());

        let entry = self.audit_entry(
            "report_location_updated",
            run_id,
            json!({ "report_location": previous }),
            json!({ "report_location": location }),
        );
        state.audit_log.push(entry);

        tracing::info!(%run_id, location, "updated report location");
        Ok(())
    }

    async fn mark_failed(&self, run_id: Uuid, error_message: &str) -> RunResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let now = Utc::now();
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or(ReconciliationError::RunNotFound(run_id))?;

        let previous = run.status;
        run.status = RunStatus::Failed;
        run.error_message = Some(error_message.to_string());
        run.end_time = Some(now);
        run.updated_at = Some(now);

        let entry = self.audit_entry(
            "reconciliation_failed",
            run_id,
            json!({ "status": previous }),
            json!({ "status": RunStatus::Failed, "error_message": error_message }),
        );
        state.audit_log.push(entry);
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> RunResult<Option<ReconciliationRun>> {
        Ok(self.state.read().map_err(poisoned)?.runs.get(&run_id).cloned())
    }

    async fn get_missing_transactions(
        &self,
        run_id: Uuid,
    ) -> RunResult<Vec<MissingTransactionRecord>> {
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .missing
            .get(&run_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_quality_checks(&self, run_id: Uuid) -> RunResult<Vec<DataQualityCheck>> {
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .checks
            .get(&run_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_audit_log(&self, record_id: Uuid) -> RunResult<Vec<AuditLogEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .audit_log
            .iter()
            .filter(|entry| entry.record_id == record_id)
            .cloned()
            .collect())
    }

    async fn get_history(
        &self,
        processor: &str,
        since: NaiveDate,
    ) -> RunResult<Vec<ReconciliationRun>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut runs: Vec<ReconciliationRun> = state
            .runs
            .values()
            .filter(|run| run.processor_name == processor && run.run_date >= since)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.run_date.cmp(&a.run_date));
        Ok(runs)
    }

    async fn health_check(&self) -> bool {
        self.state.read().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::ReconciliationEngine;
    use crate::types::TransactionBuilder;
    use chrono::Duration;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn txn(id: &str, amount: &str) -> Transaction {
        TransactionBuilder::new(id, "stripe", dec(amount), Utc::now() - Duration::hours(2))
            .fee(dec("0.30"))
            .build()
    }

    fn result(processor: &[Transaction], internal: &[Transaction]) -> ReconciliationResult {
        ReconciliationEngine::new().reconcile(processor, internal, date(15), "stripe")
    }

    #[tokio::test]
    async fn test_store_result_persists_rows_and_checks() {
        let storage = MemoryStorage::new();
        let run_id = storage.create_run(date(15), "stripe").await.unwrap();
        let processor = vec![txn("T1", "100.00"), txn("T2", "250.50"), txn("T3", "50.00")];

        storage
            .store_result(run_id, &result(&processor, &processor[..1]))
            .await
            .unwrap();

        let run = storage.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.missing_transaction_count, 2);
        assert_eq!(run.total_discrepancy_amount, dec("300.50"));
        assert!(run.end_time.is_some());

        let rows = storage.get_missing_transactions(run_id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].transaction.transaction_id, "T2");

        let checks = storage.get_quality_checks(run_id).await.unwrap();
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(|c| c.check_result));
        assert!(checks.iter().all(|c| c.severity == CheckSeverity::Info));
    }

    #[tokio::test]
    async fn test_invalid_rows_are_skipped_and_flagged() {
        let storage = MemoryStorage::new();
        let run_id = storage.create_run(date(15), "stripe").await.unwrap();
        let mut bad = txn("BAD", "10.00");
        bad.currency = "usd".to_string();
        let processor = vec![txn("OK", "5.00"), bad];

        storage.store_result(run_id, &result(&processor, &[])).await.unwrap();

        assert_eq!(storage.get_missing_transactions(run_id).await.unwrap().len(), 1);
        let checks = storage.get_quality_checks(run_id).await.unwrap();
        let count_check = checks
            .iter()
            .find(|c| c.check_name == "missing_transaction_count_validation")
            .unwrap();
        assert!(!count_check.check_result);
        assert_eq!(count_check.severity, CheckSeverity::Error);
        assert_eq!(count_check.check_details["actual_count"], 1);
        assert_eq!(count_check.check_details["expected_count"], 2);
    }

    #[tokio::test]
    async fn test_high_discrepancy_is_critical() {
        let storage = MemoryStorage::new();
        let run_id = storage.create_run(date(15), "stripe").await.unwrap();
        let processor = vec![txn("BIG", "20000.00")];

        storage.store_result(run_id, &result(&processor, &[])).await.unwrap();

        let checks = storage.get_quality_checks(run_id).await.unwrap();
        let alert = checks
            .iter()
            .find(|c| c.check_name == "high_discrepancy_alert")
            .unwrap();
        assert!(!alert.check_result);
        assert_eq!(alert.severity, CheckSeverity::Critical);
        assert_eq!(alert.check_details["success_rate"], "0.00");
    }

    #[tokio::test]
    async fn test_rerun_reuses_run_id() {
        let storage = MemoryStorage::new();
        let first = storage.create_run(date(15), "stripe").await.unwrap();
        storage.mark_failed(first, "timeout").await.unwrap();
        let second = storage.create_run(date(15), "stripe").await.unwrap();

        assert_eq!(first, second);
        let run = storage.get_run(second).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.error_message.is_none());

        let other = storage.create_run(date(15), "paypal").await.unwrap();
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_rerun_clears_previous_results() {
        let storage = MemoryStorage::new();
        let first = storage.create_run(date(15), "stripe").await.unwrap();
        let processor = vec![txn("T1", "100.00"), txn("T2", "40.00")];
        storage.store_result(first, &result(&processor, &[])).await.unwrap();
        storage
            .update_report_location(first, "local_reports/old.csv")
            .await
            .unwrap();

        let rerun = storage.create_run(date(15), "stripe").await.unwrap();
        storage.mark_failed(rerun, "processor API unavailable").await.unwrap();

        let run = storage.get_run(rerun).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.missing_transaction_count, 0);
        assert_eq!(run.processor_transaction_count, 0);
        assert_eq!(run.total_discrepancy_amount, BigDecimal::from(0));
        assert!(run.report_location.is_none());
        assert!(storage.get_missing_transactions(rerun).await.unwrap().is_empty());
        assert!(storage.get_quality_checks(rerun).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_trail_and_failure() {
        let storage = MemoryStorage::new().with_identity("ops-bot", "recon-tests");
        let run_id = storage.create_run(date(15), "stripe").await.unwrap();
        storage
            .update_report_location(run_id, "local_reports/report.csv")
            .await
            .unwrap();
        storage.mark_failed(run_id, "processor API unavailable").await.unwrap();

        let run = storage.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("processor API unavailable"));
        assert_eq!(run.report_location.as_deref(), Some("local_reports/report.csv"));
        assert_eq!(run.created_by, "ops-bot");

        let actions: Vec<String> = storage
            .get_audit_log(run_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                "reconciliation_started",
                "report_location_updated",
                "reconciliation_failed"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_run_is_an_error() {
        let storage = MemoryStorage::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            storage.mark_failed(missing, "x").await,
            Err(ReconciliationError::RunNotFound(id)) if id == missing
        ));
        assert!(matches!(
            storage.store_result(missing, &result(&[], &[])).await,
            Err(ReconciliationError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_filtered() {
        let storage = MemoryStorage::new();
        storage.create_run(date(10), "stripe").await.unwrap();
        storage.create_run(date(14), "stripe").await.unwrap();
        storage.create_run(date(12), "stripe").await.unwrap();
        storage.create_run(date(14), "paypal").await.unwrap();

        let history = storage.get_history("stripe", date(11)).await.unwrap();
        let dates: Vec<NaiveDate> = history.iter().map(|r| r.run_date).collect();
        assert_eq!(dates, vec![date(14), date(12)]);
        assert!(storage.health_check().await);

        storage.clear().unwrap();
        assert!(storage.get_history("stripe", date(1)).await.unwrap().is_empty());
    }
}
