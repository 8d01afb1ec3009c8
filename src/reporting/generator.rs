//! CSV, JSON and executive summary reports for a reconciliation run

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use super::impact::{recommendations, FinancialImpact};
use super::{format_count, format_money, format_percent};
use crate::types::*;

/// Column order of the detailed CSV report
pub const CSV_HEADER: [&str; 9] = [
    "transaction_id",
    "processor_name",
    "amount",
    "currency",
    "status",
    "merchant_id",
    "transaction_date",
    "reference_number",
    "fee",
];

/// Directory used when the requested output directory tries to escape upwards
pub const FALLBACK_REPORT_DIR: &str = "reports";

/// Everything produced for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ReportBundle {
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
    pub summary_text: String,
}

#[derive(Debug, Serialize)]
struct ReportMetadata {
    generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct JsonSummary<'a> {
    date: NaiveDate,
    processor: &'a str,
    processor_transactions: usize,
    internal_transactions: usize,
    missing_transactions_count: usize,
    total_discrepancy_amount: &'a BigDecimal,
    total_volume_processed: &'a BigDecimal,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    report_metadata: ReportMetadata,
    reconciliation_summary: JsonSummary<'a>,
    missing_transactions: &'a [Transaction],
    financial_impact: FinancialImpact,
}

/// Renders reports from a [`ReconciliationResult`]
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    report_prefix: String,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new("reconciliation_report")
    }
}

impl ReportGenerator {
    pub fn new(report_prefix: impl Into<String>) -> Self {
        Self {
            report_prefix: report_prefix.into(),
        }
    }

    /// Write the CSV and JSON reports into `output_dir` and render the executive summary
    pub fn generate_all(
        &self,
        result: &ReconciliationResult,
        output_dir: &Path,
    ) -> RunResult<ReportBundle> {
        let output_dir = safe_output_dir(output_dir);
        fs::create_dir_all(&output_dir)?;
        let generated_at = Utc::now();

        let csv_path = self.write_csv(result, &output_dir)?;
        let summary_text = self.executive_summary(result, generated_at);
        let json_path = self.write_json(result, &output_dir, generated_at)?;

        Ok(ReportBundle {
            csv_path,
            json_path,
            summary_text,
        })
    }

    /// `{prefix}_{processor}_{date}.{extension}`
    pub fn file_name(&self, result: &ReconciliationResult, extension: &str) -> String {
        format!(
            "{}_{}_{}.{}",
            self.report_prefix,
            result.processor,
            result.reconciliation_date.format("%Y-%m-%d"),
            extension
        )
    }

    /// Detailed CSV of the missing transactions. The header is written even
    /// when nothing is missing.
    pub fn write_csv(&self, result: &ReconciliationResult, output_dir: &Path) -> RunResult<PathBuf> {
        let csv_path = output_dir.join(self.file_name(result, "csv"));
        let mut writer = csv::Writer::from_path(&csv_path)?;

        writer.write_record(CSV_HEADER)?;
        for txn in &result.missing_transactions_details {
            let amount = txn.amount.to_string();
            let date = txn.transaction_date.to_rfc3339();
            let fee = txn.fee.to_string();
            writer.write_record([
                txn.transaction_id.as_str(),
                txn.processor_name.as_str(),
                amount.as_str(),
                txn.currency.as_str(),
                txn.status.as_str(),
                txn.merchant_id.as_str(),
                date.as_str(),
                txn.reference_number.as_str(),
                fee.as_str(),
            ])?;
        }
        writer.flush()?;

        tracing::info!(path = %csv_path.display(), rows = result.missing_transactions_details.len(), "wrote detailed CSV report");
        Ok(csv_path)
    }

    /// Machine-readable report with summary, missing transactions and impact
    pub fn write_json(
        &self,
        result: &ReconciliationResult,
        output_dir: &Path,
        generated_at: DateTime<Utc>,
    ) -> RunResult<PathBuf> {
        let json_path = output_dir.join(self.file_name(result, "json"));
        let summary = &result.summary;

        let report = JsonReport {
            report_metadata: ReportMetadata { generated_at },
            reconciliation_summary: JsonSummary {
                date: result.reconciliation_date,
                processor: &result.processor,
                processor_transactions: summary.processor_transactions,
                internal_transactions: summary.internal_transactions,
                missing_transactions_count: summary.missing_transactions_count,
                total_discrepancy_amount: &summary.total_discrepancy_amount,
                total_volume_processed: &summary.total_volume_processed,
            },
            missing_transactions: &result.missing_transactions_details,
            financial_impact: FinancialImpact::assess(result),
        };

        let mut writer = BufWriter::new(File::create(&json_path)?);
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writer.flush()?;

        tracing::info!(path = %json_path.display(), "wrote JSON report");
        Ok(json_path)
    }

    /// Plain-text summary for operators and email bodies
    pub fn executive_summary(
        &self,
        result: &ReconciliationResult,
        generated_at: DateTime<Utc>,
    ) -> String {
        let summary = &result.summary;
        let impact = FinancialImpact::assess(result);

        let mut report = String::new();
        report.push_str("FinTech Reconciliation Executive Summary\n");
        report.push_str("========================================\n\n");
        report.push_str(&format!("Date: {}\n", result.reconciliation_date));
        report.push_str(&format!("Processor: {}\n", result.processor));
        report.push_str(&format!(
            "Report Generated: {}\n\n",
            generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        report.push_str("RECONCILIATION OVERVIEW\n");
        report.push_str("-----------------------\n");
        report.push_str(&format!(
            "✓ Processor Transactions Processed: {}\n",
            format_count(summary.processor_transactions)
        ));
        report.push_str(&format!(
            "✓ Internal System Matches: {}\n",
            format_count(summary.internal_transactions)
        ));
        report.push_str(&format!(
            "⚠ Discrepancies Identified: {}\n\n",
            format_count(summary.missing_transactions_count)
        ));

        report.push_str("FINANCIAL IMPACT\n");
        report.push_str("----------------\n");
        report.push_str(&format!(
            "• Total Transaction Volume: ${}\n",
            format_money(&impact.total_volume)
        ));
        report.push_str(&format!(
            "• Missing Transaction Value: ${}\n",
            format_money(&summary.total_discrepancy_amount)
        ));
        report.push_str(&format!(
            "• Discrepancy Rate: {}\n",
            format_percent(&impact.discrepancy_rate)
        ));
        report.push_str(&format!(
            "• Estimated Processing Fees at Risk: ${}\n\n",
            format_money(&impact.fees_at_risk)
        ));

        report.push_str("RISK ASSESSMENT\n");
        report.push_str("---------------\n");
        report.push_str(&format!("Risk Level: {}\n", impact.risk_level));
        report.push_str(&format!("Compliance Status: {}\n\n", impact.compliance_status));

        report.push_str("RECOMMENDED ACTIONS\n");
        report.push_str("-------------------\n");
        report.push_str(&recommendations(result).join("\n"));

        report
    }
}

/// Reject output directories that climb out with `..`
fn safe_output_dir(output_dir: &Path) -> PathBuf {
    if output_dir
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        tracing::warn!(
            requested = %output_dir.display(),
            fallback = FALLBACK_REPORT_DIR,
            "report directory escapes upwards; using fallback"
        );
        PathBuf::from(FALLBACK_REPORT_DIR)
    } else {
        output_dir.to_path_buf()
    }
}
