//! # Reconciliation Core
//!
//! Daily reconciliation of payment-processor exports against internal ledger
//! records.
//!
//! ## Features
//!
//! - **Reconciliation engine**: matches transactions by `transaction_id` and
//!   reports processor transactions missing from the internal ledger
//! - **Exact money**: every total is a [`bigdecimal::BigDecimal`] sum
//! - **Reporting**: CSV, JSON and executive summary reports with financial impact
//! - **Audit storage**: trait-based run storage with data quality checks
//! - **Orchestration**: concurrent per-processor runs with failure isolation
//! - **HTTP collaborators**: retrying API source and Slack alerts
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{ReconciliationEngine, TransactionBuilder};
//! use bigdecimal::BigDecimal;
//! use chrono::{NaiveDate, TimeZone, Utc};
//!
//! let at = Utc.with_ymd_and_hms(2024, 5, 15, 10, 0, 0).unwrap();
//! let processor = vec![
//!     TransactionBuilder::new("TXN_1", "stripe", BigDecimal::from(100), at).build(),
//!     TransactionBuilder::new("TXN_2", "stripe", BigDecimal::from(50), at).build(),
//! ];
//! let internal = vec![processor[0].clone()];
//!
//! let date = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
//! let result = ReconciliationEngine::new().reconcile(&processor, &internal, date, "stripe");
//! assert_eq!(result.summary.missing_transactions_count, 1);
//! assert_eq!(result.summary.total_discrepancy_amount, BigDecimal::from(50));
//! ```

pub mod config;
pub mod http;
pub mod metrics;
pub mod notification;
pub mod orchestrator;
pub mod reconciliation;
pub mod reporting;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::ReconciliationConfig;
pub use http::{HttpTransactionSource, RetryPolicy, SlackNotifier};
pub use metrics::*;
pub use notification::*;
pub use orchestrator::*;
pub use reconciliation::*;
pub use reporting::*;
pub use traits::*;
pub use types::*;
