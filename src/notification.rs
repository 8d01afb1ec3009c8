//! Operator notifications for completed and failed runs

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::reporting::{format_count, format_money, Severity};
use crate::traits::Notifier;
use crate::types::*;

/// Top-level directories a report attachment may come from
pub const ALLOWED_ATTACHMENT_ROOTS: [&str; 4] = ["reports", "local_reports", "Sample_Output", "tmp"];

/// A message ready to hand to a [`Notifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub severity: Severity,
    pub processor: String,
    pub run_date: NaiveDate,
    /// Report to attach, already checked against [`ALLOWED_ATTACHMENT_ROOTS`]
    pub attachment: Option<PathBuf>,
}

impl Notification {
    /// Daily report notification for a finished run
    pub fn reconciliation(
        result: &ReconciliationResult,
        run_date: NaiveDate,
        report_url: Option<&str>,
        attachment: Option<&Path>,
    ) -> Self {
        let summary = &result.summary;
        let severity = Severity::assess(summary);
        let subject = format!(
            "{} Daily Reconciliation Report - {} - {}",
            severity.label(),
            result.processor,
            run_date
        );

        let mut body = String::new();
        let _ = writeln!(body, "Reconciliation summary for {} on {}", result.processor, run_date);
        let _ = writeln!(body);
        let _ = writeln!(body, "Severity: {}", severity);
        let _ = writeln!(
            body,
            "Processor transactions: {}",
            format_count(summary.processor_transactions)
        );
        let _ = writeln!(
            body,
            "Internal transactions: {}",
            format_count(summary.internal_transactions)
        );
        let _ = writeln!(
            body,
            "Missing transactions: {}",
            format_count(summary.missing_transactions_count)
        );
        let _ = writeln!(
            body,
            "Discrepancy amount: ${}",
            format_money(&summary.total_discrepancy_amount)
        );
        let _ = writeln!(
            body,
            "Volume processed: ${}",
            format_money(&summary.total_volume_processed)
        );
        let _ = writeln!(body);
        let _ = writeln!(body, "Required actions:");
        for action in severity.actions() {
            let _ = writeln!(body, "- {}", action);
        }
        if let Some(url) = report_url {
            let _ = writeln!(body);
            let _ = writeln!(body, "Download the full report: {}", url);
        }

        let attachment = attachment.and_then(|path| {
            if is_allowed_attachment(path) {
                Some(path.to_path_buf())
            } else {
                tracing::warn!(path = %path.display(), "attachment outside allowed directories dropped");
                None
            }
        });

        Self {
            subject,
            body,
            severity,
            processor: result.processor.clone(),
            run_date,
            attachment,
        }
    }

    /// Critical alert for a run that could not complete
    pub fn failure(processor: &str, run_date: NaiveDate, run_id: Option<Uuid>, error: &str) -> Self {
        let severity = Severity::Critical;
        let subject = format!(
            "{} Reconciliation FAILED - {} - {}",
            severity.label(),
            processor,
            run_date
        );

        let mut body = String::new();
        let _ = writeln!(body, "Reconciliation for {} on {} failed.", processor, run_date);
        if let Some(run_id) = run_id {
            let _ = writeln!(body, "Run ID: {}", run_id);
        }
        let _ = writeln!(body, "Error: {}", error);
        let _ = writeln!(body);
        let _ = writeln!(body, "Investigate the failure and re-run the reconciliation.");

        Self {
            subject,
            body,
            severity,
            processor: processor.to_string(),
            run_date,
            attachment: None,
        }
    }
}

/// Whether `path` is a relative path rooted in one of the allowed report directories
pub fn is_allowed_attachment(path: &Path) -> bool {
    let mut components = path.components();
    let root_allowed = match components.next() {
        Some(Component::Normal(first)) => ALLOWED_ATTACHMENT_ROOTS
            .iter()
            .any(|root| first == std::ffi::OsStr::new(root)),
        _ => false,
    };
    root_allowed && components.all(|c| matches!(c, Component::Normal(_)))
}

/// Delivers notifications as structured log events
#[derive(Debug, Clone)]
pub struct LogNotifier {
    recipient: String,
}

impl LogNotifier {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> RunResult<bool> {
        match notification.severity {
            Severity::Critical | Severity::High => tracing::warn!(
                recipient = %self.recipient,
                severity = %notification.severity,
                subject = %notification.subject,
                attachment = ?notification.attachment,
                "notification sent"
            ),
            _ => tracing::info!(
                recipient = %self.recipient,
                severity = %notification.severity,
                subject = %notification.subject,
                attachment = ?notification.attachment,
                "notification sent"
            ),
        }
        Ok(true)
    }
}

/// Fans a notification out to several channels
///
/// Reports delivered if any channel delivered. When none did and at least
/// one failed, the last failure is returned.
#[derive(Clone, Default)]
pub struct MultiNotifier {
    channels: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Arc<dyn Notifier>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl std::fmt::Debug for MultiNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiNotifier")
            .field("channels", &self.channels.len())
            .finish()
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, notification: &Notification) -> RunResult<bool> {
        let mut delivered = false;
        let mut last_error = None;
        for channel in &self.channels {
            match channel.send(notification).await {
                Ok(sent) => delivered |= sent,
                Err(err) => {
                    tracing::warn!(subject = %notification.subject, error = %err, "notification channel failed");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) if !delivered => Err(err),
            _ => Ok(delivered),
        }
    }
}
