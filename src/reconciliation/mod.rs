//! Reconciliation engine for processor exports against the internal ledger
//!
//! Matching is by `transaction_id` only and every monetary total is an exact
//! [`bigdecimal::BigDecimal`] sum.

pub mod engine;
pub mod index;

pub use engine::*;
pub use index::*;
