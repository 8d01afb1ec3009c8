//! Financial impact and alert severity derived from a reconciliation summary
//!
//! Rates are exact decimals; nothing here goes through floating point.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::*;

/// Discrepancy amount above which a run needs priority follow-up
pub fn high_value_threshold() -> BigDecimal {
    BigDecimal::from(10_000)
}

/// Discrepancy amount that is critical regardless of rates
pub fn critical_amount_threshold() -> BigDecimal {
    BigDecimal::from(100_000)
}

/// `numerator / denominator` as an exact decimal
fn ratio(numerator: u64, denominator: u64) -> BigDecimal {
    BigDecimal::from(numerator) / BigDecimal::from(denominator)
}

/// Share of processor transactions missing internally, zero for an empty run
pub fn discrepancy_rate(summary: &ReconciliationSummary) -> BigDecimal {
    if summary.processor_transactions == 0 {
        return BigDecimal::from(0);
    }
    ratio(
        summary.missing_transactions_count as u64,
        summary.processor_transactions as u64,
    )
}

/// Matched share of processor transactions as a percentage, 100 for an empty run
pub fn success_rate(summary: &ReconciliationSummary) -> BigDecimal {
    if summary.processor_transactions == 0 {
        return BigDecimal::from(100);
    }
    ratio(
        summary.matched_transactions() as u64,
        summary.processor_transactions as u64,
    ) * BigDecimal::from(100)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Risk bands on the discrepancy rate: below 0.1% is low, below 0.5% medium
    pub fn from_rate(rate: &BigDecimal) -> Self {
        if *rate < ratio(1, 1000) {
            RiskLevel::Low
        } else if *rate < ratio(5, 1000) {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NeedsReview,
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceStatus::Compliant => write!(f, "COMPLIANT"),
            ComplianceStatus::NeedsReview => write!(f, "NEEDS_REVIEW"),
        }
    }
}

/// Financial impact section shared by the JSON and text reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialImpact {
    pub total_volume: BigDecimal,
    pub discrepancy_rate: BigDecimal,
    /// Processor fees on the missing transactions
    pub fees_at_risk: BigDecimal,
    pub risk_level: RiskLevel,
    pub compliance_status: ComplianceStatus,
    /// HIGH when more than ten transactions are missing
    pub delay_risk: RiskLevel,
}

impl FinancialImpact {
    pub fn assess(result: &ReconciliationResult) -> Self {
        let summary = &result.summary;
        let discrepancy_rate = discrepancy_rate(summary);
        let fees_at_risk: BigDecimal = result
            .missing_transactions_details
            .iter()
            .map(|t| &t.fee)
            .sum();
        let risk_level = RiskLevel::from_rate(&discrepancy_rate);

        Self {
            total_volume: summary.total_volume_processed.clone(),
            discrepancy_rate,
            fees_at_risk,
            risk_level,
            compliance_status: if risk_level == RiskLevel::Low {
                ComplianceStatus::Compliant
            } else {
                ComplianceStatus::NeedsReview
            },
            delay_risk: if summary.missing_transactions_count > 10 {
                RiskLevel::High
            } else {
                RiskLevel::Low
            },
        }
    }
}

/// Follow-up actions for the executive summary
pub fn recommendations(result: &ReconciliationResult) -> Vec<String> {
    let mut recommendations = Vec::new();

    if result.summary.missing_transactions_count > 0 {
        recommendations.push("• Review and reprocess missing transactions within 24 hours".to_string());
    } else {
        recommendations
            .push("✓ No action required - all transactions reconciled successfully".to_string());
    }

    if result.summary.total_discrepancy_amount > high_value_threshold() {
        recommendations.push(
            "• PRIORITY: Contact payment processor for missing high-value transactions"
                .to_string(),
        );
    }

    recommendations
}

/// Alert severity for operator notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Rate thresholds, tightened as daily volume grows
struct SeverityThresholds {
    medium: BigDecimal,
    high: BigDecimal,
    critical: BigDecimal,
}

impl SeverityThresholds {
    fn for_volume(processor_transactions: usize) -> Self {
        if processor_transactions < 10_000 {
            Self {
                medium: ratio(5, 100),
                high: ratio(10, 100),
                critical: ratio(20, 100),
            }
        } else if processor_transactions < 100_000 {
            Self {
                medium: ratio(2, 100),
                high: ratio(5, 100),
                critical: ratio(10, 100),
            }
        } else {
            Self {
                medium: ratio(3, 1000),
                high: ratio(5, 1000),
                critical: ratio(1, 100),
            }
        }
    }
}

impl Severity {
    /// Derive severity from the larger of the missing-count rate and the
    /// missing-amount rate
    pub fn assess(summary: &ReconciliationSummary) -> Self {
        let total_transactions = summary.processor_transactions.max(1);
        let zero = BigDecimal::from(0);
        let total_volume = if summary.total_volume_processed == zero {
            BigDecimal::from(1)
        } else {
            summary.total_volume_processed.clone()
        };

        let missing_pct = ratio(
            summary.missing_transactions_count as u64,
            total_transactions as u64,
        );
        let amount_pct = &summary.total_discrepancy_amount / &total_volume;
        let discrepancy = missing_pct.clone().max(amount_pct.clone());
        let thresholds = SeverityThresholds::for_volume(summary.processor_transactions);

        let severity = if discrepancy > thresholds.critical
            || summary.total_discrepancy_amount > critical_amount_threshold()
        {
            Severity::Critical
        } else if discrepancy > thresholds.high {
            Severity::High
        } else if discrepancy > thresholds.medium {
            Severity::Medium
        } else {
            Severity::Low
        };

        tracing::info!(
            severity = %severity,
            missing_pct = %super::format_percent(&missing_pct),
            amount_pct = %super::format_percent(&amount_pct),
            amount_abs = %super::format_money(&summary.total_discrepancy_amount),
            total_tx = total_transactions,
            "severity determined"
        );

        severity
    }

    /// Subject-line label
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "🚨 CRITICAL",
            Severity::High => "⚠️ HIGH PRIORITY",
            Severity::Medium => "📊 ATTENTION",
            Severity::Low => "✅ INFO",
        }
    }

    /// Operator actions for this severity
    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            Severity::Critical => &[
                "Immediate action required",
                "Contact payment processor",
                "Escalate to compliance",
            ],
            Severity::High => &["Review within 2 hours", "Contact processor if needed"],
            Severity::Medium => &[
                "Review during business hours",
                "Verify account configurations",
            ],
            Severity::Low => &["No immediate action required", "Archive report"],
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionBuilder;
    use chrono::{NaiveDate, Utc};
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn summary(processor: usize, missing: usize, volume: &str, discrepancy: &str) -> ReconciliationSummary {
        ReconciliationSummary {
            reconciliation_date: NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(),
            processor: "stripe".to_string(),
            processor_transactions: processor,
            internal_transactions: processor - missing,
            missing_transactions_count: missing,
            total_discrepancy_amount: dec(discrepancy),
            total_volume_processed: dec(volume),
        }
    }

    fn result_with_fees(fees: &[&str], summary: ReconciliationSummary) -> ReconciliationResult {
        let missing = fees
            .iter()
            .enumerate()
            .map(|(i, fee)| {
                TransactionBuilder::new(format!("T{}", i), "stripe", dec("10.00"), Utc::now())
                    .fee(dec(fee))
                    .build()
            })
            .collect();
        ReconciliationResult {
            reconciliation_date: summary.reconciliation_date,
            processor: summary.processor.clone(),
            summary,
            missing_transactions_details: missing,
        }
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(success_rate(&summary(0, 0, "0", "0")), BigDecimal::from(100));
        assert_eq!(success_rate(&summary(30, 5, "300.00", "50.00")).round(2), dec("83.33"));
        assert_eq!(success_rate(&summary(8, 2, "80.00", "20.00")), dec("75"));
    }

    #[test]
    fn test_risk_bands() {
        assert_eq!(RiskLevel::from_rate(&dec("0")), RiskLevel::Low);
        assert_eq!(RiskLevel::from_rate(&dec("0.0009")), RiskLevel::Low);
        assert_eq!(RiskLevel::from_rate(&dec("0.001")), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_rate(&dec("0.0049")), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_rate(&dec("0.005")), RiskLevel::High);
    }

    #[test]
    fn test_financial_impact_sums_fees_exactly() {
        let result = result_with_fees(&["0.59", "0.30", "1.11"], summary(1000, 3, "30000.00", "30.00"));
        let impact = FinancialImpact::assess(&result);

        assert_eq!(impact.fees_at_risk, dec("2.00"));
        assert_eq!(impact.discrepancy_rate, dec("0.003"));
        assert_eq!(impact.risk_level, RiskLevel::Medium);
        assert_eq!(impact.compliance_status, ComplianceStatus::NeedsReview);
        assert_eq!(impact.delay_risk, RiskLevel::Low);
        assert_eq!(impact.total_volume, dec("30000.00"));
    }

    #[test]
    fn test_financial_impact_for_empty_run() {
        let result = result_with_fees(&[], summary(0, 0, "0", "0"));
        let impact = FinancialImpact::assess(&result);

        assert_eq!(impact.discrepancy_rate, BigDecimal::from(0));
        assert_eq!(impact.risk_level, RiskLevel::Low);
        assert_eq!(impact.compliance_status, ComplianceStatus::Compliant);
    }

    #[test]
    fn test_recommendations() {
        let clean = result_with_fees(&[], summary(10, 0, "100.00", "0"));
        assert_eq!(recommendations(&clean).len(), 1);
        assert!(recommendations(&clean)[0].contains("No action required"));

        let costly = result_with_fees(&["1.00"], summary(10, 1, "20000.00", "10000.01"));
        let recs = recommendations(&costly);
        assert_eq!(recs.len(), 2);
        assert!(recs[1].contains("PRIORITY"));
    }

    #[test]
    fn test_severity_small_volume() {
        assert_eq!(Severity::assess(&summary(100, 0, "1000.00", "0")), Severity::Low);
        assert_eq!(Severity::assess(&summary(100, 5, "1000.00", "50.00")), Severity::Low);
        assert_eq!(Severity::assess(&summary(100, 6, "1000.00", "60.00")), Severity::Medium);
        assert_eq!(Severity::assess(&summary(100, 11, "1000.00", "110.00")), Severity::High);
        assert_eq!(Severity::assess(&summary(100, 21, "1000.00", "210.00")), Severity::Critical);
    }

    #[test]
    fn test_severity_uses_larger_of_count_and_amount_rates() {
        // one missing transaction out of 100, but it carries 30% of the volume
        assert_eq!(Severity::assess(&summary(100, 1, "1000.00", "300.00")), Severity::Critical);
    }

    #[test]
    fn test_severity_absolute_amount_is_critical() {
        assert_eq!(
            Severity::assess(&summary(200_000, 1, "100000000.00", "100000.01")),
            Severity::Critical
        );
    }

    #[test]
    fn test_severity_large_volume_thresholds() {
        assert_eq!(Severity::assess(&summary(200_000, 500, "2000000.00", "5000.00")), Severity::Low);
        assert_eq!(Severity::assess(&summary(200_000, 800, "2000000.00", "8000.00")), Severity::Medium);
        assert_eq!(Severity::assess(&summary(200_000, 1500, "2000000.00", "15000.00")), Severity::High);
    }

    #[test]
    fn test_severity_handles_empty_run() {
        assert_eq!(Severity::assess(&summary(0, 0, "0", "0")), Severity::Low);
    }
}
