//! Core types and data structures for the reconciliation system

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Exact decimal from a JSON number, using its shortest textual form
///
/// `0.1` becomes exactly `0.1` rather than the nearest binary double.
pub fn decimal_from_json(number: &serde_json::Number) -> RunResult<BigDecimal> {
    BigDecimal::from_str(&number.to_string()).map_err(|e| {
        ReconciliationError::Validation(format!("invalid decimal {}: {}", number, e))
    })
}

/// Accepts money as a JSON string or number
fn exact_decimal<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    let text = match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    };
    BigDecimal::from_str(text.trim()).map_err(serde::de::Error::custom)
}

/// One financial movement as reported by a processor or by the internal ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Join key between processor and internal records
    pub transaction_id: String,
    /// Lowercase canonical processor identifier
    pub processor_name: String,
    /// Transaction amount in currency units
    #[serde(deserialize_with = "exact_decimal")]
    pub amount: BigDecimal,
    /// ISO 4217 currency code (e.g. USD)
    pub currency: String,
    /// Status reported by the source (e.g. completed, pending)
    pub status: String,
    /// Merchant identifier
    pub merchant_id: String,
    /// When the transaction happened
    pub transaction_date: DateTime<Utc>,
    /// Source-specific cross reference, never used for matching
    pub reference_number: String,
    /// Fee charged by the processor
    #[serde(deserialize_with = "exact_decimal")]
    pub fee: BigDecimal,
}

/// Builder for transactions coming out of a data source
#[derive(Debug)]
pub struct TransactionBuilder {
    transaction: Transaction,
}

impl TransactionBuilder {
    /// Start a transaction with the fields every source must provide
    pub fn new(
        transaction_id: impl Into<String>,
        processor_name: impl AsRef<str>,
        amount: BigDecimal,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction: Transaction {
                transaction_id: transaction_id.into(),
                processor_name: processor_name.as_ref().trim().to_lowercase(),
                amount,
                currency: "USD".to_string(),
                status: "completed".to_string(),
                merchant_id: "UNKNOWN".to_string(),
                transaction_date,
                reference_number: String::new(),
                fee: BigDecimal::from(0),
            },
        }
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.transaction.currency = currency.into();
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.transaction.status = status.into();
        self
    }

    pub fn merchant_id(mut self, merchant_id: impl Into<String>) -> Self {
        self.transaction.merchant_id = merchant_id.into();
        self
    }

    pub fn reference_number(mut self, reference_number: impl Into<String>) -> Self {
        self.transaction.reference_number = reference_number.into();
        self
    }

    pub fn fee(mut self, fee: BigDecimal) -> Self {
        self.transaction.fee = fee;
        self
    }

    /// Finish the transaction. Business rules are not checked here.
    pub fn build(self) -> Transaction {
        self.transaction
    }
}

/// Aggregate counts and totals for one (processor, date) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Date the run reconciles
    pub reconciliation_date: NaiveDate,
    /// Processor the run reconciles
    pub processor: String,
    /// Unique processor transactions
    pub processor_transactions: usize,
    /// Unique internal transactions
    pub internal_transactions: usize,
    /// Processor transactions with no internal counterpart
    pub missing_transactions_count: usize,
    /// Sum of the missing transactions' amounts
    pub total_discrepancy_amount: BigDecimal,
    /// Sum of the unique processor transactions' amounts
    pub total_volume_processed: BigDecimal,
}

impl ReconciliationSummary {
    /// Processor transactions that were found internally
    pub fn matched_transactions(&self) -> usize {
        self.processor_transactions
            .saturating_sub(self.missing_transactions_count)
    }
}

/// Complete output of a reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub reconciliation_date: NaiveDate,
    pub processor: String,
    pub summary: ReconciliationSummary,
    /// Missing transactions in the order they first appear on the processor side
    pub missing_transactions_details: Vec<Transaction>,
}

/// Errors raised by the collaborators around the engine
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Report error: {0}")]
    Report(String),
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("Notification error: {0}")]
    Notification(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Reconciliation run not found: {0}")]
    RunNotFound(uuid::Uuid),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for reconciliation operations
pub type RunResult<T> = Result<T, ReconciliationError>;
