//! Slack incoming-webhook notifier

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::build_client;
use crate::notification::Notification;
use crate::reporting::Severity;
use crate::traits::Notifier;
use crate::types::*;

/// Posts notifications to a Slack incoming webhook
///
/// Without a webhook URL every send is skipped with a warning and reports
/// `false`, so a deployment can leave Slack unconfigured.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl SlackNotifier {
    pub fn new(webhook_url: Option<String>) -> RunResult<Self> {
        Ok(Self {
            client: build_client()?,
            webhook_url,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }
}

fn color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "danger",
        Severity::Medium => "warning",
        Severity::Low => "good",
    }
}

/// Webhook payload for a notification
pub fn slack_payload(notification: &Notification) -> Value {
    json!({
        "text": notification.subject,
        "attachments": [{
            "color": color(notification.severity),
            "title": format!("{} - {}", notification.processor, notification.run_date),
            "text": notification.body,
        }]
    })
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, notification: &Notification) -> RunResult<bool> {
        let Some(url) = &self.webhook_url else {
            tracing::warn!(subject = %notification.subject, "Slack webhook not configured; skipping");
            return Ok(false);
        };

        let response = self
            .client
            .post(url)
            .json(&slack_payload(notification))
            .send()
            .await
            .map_err(|e| ReconciliationError::Notification(format!("Slack request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReconciliationError::Notification(format!(
                "Slack webhook returned {}",
                status
            )));
        }

        tracing::info!(
            processor = %notification.processor,
            severity = %notification.severity,
            "Slack notification sent"
        );
        Ok(true)
    }
}
