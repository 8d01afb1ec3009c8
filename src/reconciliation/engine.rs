//! Processor-versus-internal reconciliation

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::Arc;

use super::index::TransactionIndex;
use crate::traits::{DuplicateObserver, LedgerSide, TracingDuplicateObserver};
use crate::types::*;

/// Compares processor transactions against internal records by `transaction_id`
///
/// The engine holds no mutable state and can be shared across threads; the
/// only thing it carries is the observer that receives dropped duplicates.
#[derive(Clone)]
pub struct ReconciliationEngine {
    observer: Arc<dyn DuplicateObserver>,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine").finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    /// Create an engine that logs duplicates as warnings
    pub fn new() -> Self {
        Self {
            observer: Arc::new(TracingDuplicateObserver),
        }
    }

    /// Create an engine with a custom duplicate observer
    pub fn with_observer(observer: Arc<dyn DuplicateObserver>) -> Self {
        Self { observer }
    }

    /// Reconcile one processor's transactions for `run_date`
    pub fn reconcile(
        &self,
        processor_transactions: &[Transaction],
        internal_transactions: &[Transaction],
        run_date: NaiveDate,
        processor: &str,
    ) -> ReconciliationResult {
        let processor_index = self.index(processor_transactions, LedgerSide::Processor, processor);
        let internal_index = self.index(internal_transactions, LedgerSide::Internal, processor);

        let missing_details: Vec<Transaction> = processor_index
            .iter()
            .filter(|txn| !internal_index.contains(&txn.transaction_id))
            .inspect(|txn| {
                tracing::debug!(transaction_id = %txn.transaction_id, "missing transaction found")
            })
            .cloned()
            .collect();

        let total_discrepancy_amount: BigDecimal =
            missing_details.iter().map(|txn| &txn.amount).sum();
        let total_volume_processed: BigDecimal =
            processor_index.iter().map(|txn| &txn.amount).sum();

        let summary = ReconciliationSummary {
            reconciliation_date: run_date,
            processor: processor.to_string(),
            processor_transactions: processor_index.len(),
            internal_transactions: internal_index.len(),
            missing_transactions_count: missing_details.len(),
            total_discrepancy_amount,
            total_volume_processed,
        };

        tracing::info!(
            processor = processor,
            %run_date,
            missing = summary.missing_transactions_count,
            processor_transactions = summary.processor_transactions,
            total_volume = %summary.total_volume_processed,
            discrepancy = %summary.total_discrepancy_amount,
            "reconciliation complete"
        );

        ReconciliationResult {
            reconciliation_date: run_date,
            processor: processor.to_string(),
            summary,
            missing_transactions_details: missing_details,
        }
    }

    fn index<'a>(
        &self,
        transactions: &'a [Transaction],
        side: LedgerSide,
        processor: &str,
    ) -> TransactionIndex<'a> {
        let index = TransactionIndex::build(transactions);
        for duplicate in index.duplicates() {
            self.observer.on_duplicate(side, processor, duplicate);
        }
        index
    }
}
