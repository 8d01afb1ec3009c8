//! Validation utilities

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

use crate::traits::*;
use crate::types::*;

/// Validate that an identifier field is not blank
pub fn validate_not_blank(field: &str, value: &str) -> RunResult<()> {
    if value.trim().is_empty() {
        return Err(ReconciliationError::Validation(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> RunResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(ReconciliationError::Validation(format!(
            "Amount must be positive, got {}",
            amount
        )))
    } else {
        Ok(())
    }
}

/// Validate an ISO 4217 style currency code: three uppercase ASCII letters
pub fn validate_currency(currency: &str) -> RunResult<()> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ReconciliationError::Validation(format!(
            "Invalid currency code '{}'",
            currency
        )));
    }
    Ok(())
}

/// Validate that a timestamp is not after `now`
pub fn validate_not_future(date: &DateTime<Utc>, now: DateTime<Utc>) -> RunResult<()> {
    if *date > now {
        return Err(ReconciliationError::Validation(format!(
            "Transaction date {} is in the future",
            date.to_rfc3339()
        )));
    }
    Ok(())
}

/// Validate that a fee is non-negative and at most half of the amount
pub fn validate_fee(fee: &BigDecimal, amount: &BigDecimal) -> RunResult<()> {
    if *fee < BigDecimal::from(0) {
        return Err(ReconciliationError::Validation(format!(
            "Fee cannot be negative, got {}",
            fee
        )));
    }

    let ceiling = amount / BigDecimal::from(2);
    if *fee > ceiling {
        return Err(ReconciliationError::Validation(format!(
            "Fee {} exceeds 50% of amount {}",
            fee, amount
        )));
    }

    Ok(())
}

/// Business rules a transaction must satisfy before it is persisted
#[derive(Debug, Default, Clone, Copy)]
pub struct BusinessRuleValidator;

impl TransactionValidator for BusinessRuleValidator {
    fn validate(&self, transaction: &Transaction, now: DateTime<Utc>) -> RunResult<()> {
        validate_not_blank("Transaction ID", &transaction.transaction_id)?;
        validate_not_blank("Processor name", &transaction.processor_name)?;
        validate_positive_amount(&transaction.amount)?;
        validate_currency(&transaction.currency)?;
        validate_not_future(&transaction.transaction_date, now)?;
        validate_fee(&transaction.fee, &transaction.amount)?;
        Ok(())
    }
}
