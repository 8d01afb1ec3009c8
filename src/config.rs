//! Runtime configuration for the reconciliation system

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::types::*;

/// Settings shared by every processor run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Directory reports are generated into before archiving
    pub report_output_dir: PathBuf,
    /// File name prefix for generated reports
    pub report_prefix: String,
    /// Recipient of operator notifications
    pub operations_email: String,
    /// Identity recorded on runs and audit entries
    pub created_by: String,
    pub application_name: String,
    /// Root directory of the local report archive
    pub archive_dir: PathBuf,
    /// Slack incoming webhook for operator alerts
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    /// Base URL of the processor export API
    #[serde(default)]
    pub processor_api_url: Option<String>,
    /// Base URL of the internal ledger API
    #[serde(default)]
    pub internal_api_url: Option<String>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            report_output_dir: PathBuf::from("local_reports"),
            report_prefix: "reconciliation_report".to_string(),
            operations_email: "operations@fintech.com".to_string(),
            created_by: "reconciliation_system".to_string(),
            application_name: "fintech_reconciliation_system".to_string(),
            archive_dir: PathBuf::from("archive"),
            slack_webhook_url: None,
            processor_api_url: None,
            internal_api_url: None,
        }
    }
}

impl ReconciliationConfig {
    /// Load configuration from the environment
    ///
    /// A `.env` file is loaded first if present. Unset variables keep their
    /// defaults:
    ///
    /// - `RECON_REPORT_OUTPUT_DIR`
    /// - `RECON_REPORT_PREFIX`
    /// - `RECON_OPERATIONS_EMAIL`
    /// - `RECON_CREATED_BY`
    /// - `RECON_APPLICATION_NAME`
    /// - `RECON_ARCHIVE_DIR`
    /// - `RECON_SLACK_WEBHOOK_URL`
    /// - `RECON_PROCESSOR_API_URL`
    /// - `RECON_INTERNAL_API_URL`
    pub fn from_env() -> RunResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> RunResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| -> RunResult<Option<String>> {
            match lookup(key) {
                Some(value) if value.trim().is_empty() => Err(ReconciliationError::Configuration(
                    format!("{} is set but empty", key),
                )),
                Some(value) => Ok(Some(value.trim().to_string())),
                None => Ok(None),
            }
        };

        let mut config = Self::default();
        if let Some(dir) = read("RECON_REPORT_OUTPUT_DIR")? {
            config.report_output_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = read("RECON_REPORT_PREFIX")? {
            config.report_prefix = prefix;
        }
        if let Some(email) = read("RECON_OPERATIONS_EMAIL")? {
            config.operations_email = email;
        }
        if let Some(created_by) = read("RECON_CREATED_BY")? {
            config.created_by = created_by;
        }
        if let Some(name) = read("RECON_APPLICATION_NAME")? {
            config.application_name = name;
        }
        if let Some(dir) = read("RECON_ARCHIVE_DIR")? {
            config.archive_dir = PathBuf::from(dir);
        }
        config.slack_webhook_url = read("RECON_SLACK_WEBHOOK_URL")?;
        config.processor_api_url = read("RECON_PROCESSOR_API_URL")?;
        config.internal_api_url = read("RECON_INTERNAL_API_URL")?;

        tracing::debug!(
            report_output_dir = %config.report_output_dir.display(),
            archive_dir = %config.archive_dir.display(),
            slack = config.slack_webhook_url.is_some(),
            "configuration loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ReconciliationConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ReconciliationConfig::default());
        assert_eq!(config.report_output_dir, PathBuf::from("local_reports"));
        assert_eq!(config.operations_email, "operations@fintech.com");
        assert!(config.slack_webhook_url.is_none());
        assert!(config.processor_api_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ReconciliationConfig::from_lookup(lookup(&[
            ("RECON_REPORT_PREFIX", "daily"),
            ("RECON_CREATED_BY", " scheduler "),
            ("RECON_ARCHIVE_DIR", "/srv/archive"),
        ]))
        .unwrap();
        assert_eq!(config.report_prefix, "daily");
        assert_eq!(config.created_by, "scheduler");
        assert_eq!(config.archive_dir, PathBuf::from("/srv/archive"));
        assert_eq!(config.application_name, "fintech_reconciliation_system");
    }

    #[test]
    fn test_remote_endpoints() {
        let config = ReconciliationConfig::from_lookup(lookup(&[
            ("RECON_SLACK_WEBHOOK_URL", "https://hooks.slack.com/services/T0/B0/X"),
            ("RECON_PROCESSOR_API_URL", "https://processor.example.com/api"),
            ("RECON_INTERNAL_API_URL", "https://ledger.example.com"),
        ]))
        .unwrap();
        assert_eq!(
            config.slack_webhook_url.as_deref(),
            Some("https://hooks.slack.com/services/T0/B0/X")
        );
        assert_eq!(config.processor_api_url.as_deref(), Some("https://processor.example.com/api"));
        assert_eq!(config.internal_api_url.as_deref(), Some("https://ledger.example.com"));

        assert!(ReconciliationConfig::from_lookup(lookup(&[("RECON_SLACK_WEBHOOK_URL", "")])).is_err());
    }

    #[test]
    fn test_empty_value_is_rejected() {
        let err = ReconciliationConfig::from_lookup(lookup(&[("RECON_OPERATIONS_EMAIL", "  ")]))
            .unwrap_err();
        assert!(matches!(err, ReconciliationError::Configuration(msg) if msg.contains("RECON_OPERATIONS_EMAIL")));
    }
}
