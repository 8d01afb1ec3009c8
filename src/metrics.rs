//! In-process run metrics

use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::traits::{LedgerSide, RunStatus};
use crate::types::*;

/// Counters for one processor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorMetrics {
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub processor_transactions: u64,
    pub internal_transactions: u64,
    pub missing_transactions: u64,
    pub discrepancy_amount: BigDecimal,
    pub last_run_duration: Option<Duration>,
}

/// Thread-safe counters shared by every processor task
#[derive(Debug, Clone, Default)]
pub struct ReconciliationMetrics {
    processors: Arc<RwLock<HashMap<String, ProcessorMetrics>>>,
}

impl ReconciliationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, processor: &str, apply: F)
    where
        F: FnOnce(&mut ProcessorMetrics),
    {
        match self.processors.write() {
            Ok(mut processors) => apply(processors.entry(processor.to_string()).or_default()),
            Err(_) => tracing::warn!(processor, "metrics lock poisoned; update dropped"),
        }
    }

    /// Count a finished run
    pub fn record_run(&self, processor: &str, status: RunStatus, duration: Duration) {
        self.update(processor, |m| {
            match status {
                RunStatus::Completed => m.runs_completed += 1,
                RunStatus::Failed => m.runs_failed += 1,
                RunStatus::Running => {}
            }
            m.last_run_duration = Some(duration);
        });
    }

    pub fn record_transactions(&self, processor: &str, side: LedgerSide, count: usize) {
        self.update(processor, |m| match side {
            LedgerSide::Processor => m.processor_transactions += count as u64,
            LedgerSide::Internal => m.internal_transactions += count as u64,
        });
    }

    /// Add a run's missing count and discrepancy
    pub fn record_discrepancy(&self, summary: &ReconciliationSummary) {
        self.update(&summary.processor, |m| {
            m.missing_transactions += summary.missing_transactions_count as u64;
            m.discrepancy_amount += &summary.total_discrepancy_amount;
        });
    }

    pub fn processor(&self, processor: &str) -> Option<ProcessorMetrics> {
        self.processors
            .read()
            .ok()
            .and_then(|processors| processors.get(processor).cloned())
    }

    pub fn snapshot(&self) -> HashMap<String, ProcessorMetrics> {
        self.processors
            .read()
            .map(|processors| processors.clone())
            .unwrap_or_default()
    }
}
