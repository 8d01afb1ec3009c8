//! In-memory data source, archive and notifier for testing and development

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::notification::Notification;
use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone, Default)]
struct SourceState {
    processor: HashMap<String, Vec<Transaction>>,
    internal: HashMap<String, Vec<Transaction>>,
    failing: HashSet<String>,
}

/// Transaction source backed by fixtures keyed by processor
///
/// The run date is ignored; fixtures are returned as loaded. Fixtures are
/// fixed once the source is shared, so clones taken earlier keep their own.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    state: Arc<SourceState>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load both sides for one processor
    pub fn with_transactions(
        mut self,
        processor: &str,
        processor_transactions: Vec<Transaction>,
        internal_transactions: Vec<Transaction>,
    ) -> Self {
        let state = Arc::make_mut(&mut self.state);
        state
            .processor
            .insert(processor.to_string(), processor_transactions);
        state
            .internal
            .insert(processor.to_string(), internal_transactions);
        self
    }

    /// Make every fetch for `processor` fail
    pub fn with_failure(mut self, processor: &str) -> Self {
        Arc::make_mut(&mut self.state)
            .failing
            .insert(processor.to_string());
        self
    }

    fn side(&self, processor: &str, side: LedgerSide) -> RunResult<Vec<Transaction>> {
        if self.state.failing.contains(processor) {
            return Err(ReconciliationError::Fetch(format!(
                "{} API unavailable",
                processor
            )));
        }
        let fixtures = match side {
            LedgerSide::Processor => &self.state.processor,
            LedgerSide::Internal => &self.state.internal,
        };
        Ok(fixtures.get(processor).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl TransactionSource for MemorySource {
    async fn fetch_processor_transactions(
        &self,
        processor: &str,
        run_date: NaiveDate,
    ) -> RunResult<Vec<Transaction>> {
        let transactions = self.side(processor, LedgerSide::Processor)?;
        tracing::info!(processor, %run_date, count = transactions.len(), "fetched processor transactions");
        Ok(transactions)
    }

    async fn fetch_internal_transactions(
        &self,
        processor: &str,
        run_date: NaiveDate,
        processor_transactions: &[Transaction],
    ) -> RunResult<Vec<Transaction>> {
        let transactions = self.side(processor, LedgerSide::Internal)?;
        tracing::info!(
            processor,
            %run_date,
            count = transactions.len(),
            looked_up = processor_transactions.len(),
            "fetched internal transactions"
        );
        Ok(transactions)
    }
}

/// Object-storage stand-in that records archived file names
///
/// Returns [`ArchiveLocation::Remote`] URIs, or fails every call when
/// constructed with [`MemoryArchive::unavailable`].
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    bucket: String,
    available: bool,
    archived: Arc<RwLock<Vec<PathBuf>>>,
}

impl MemoryArchive {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            available: true,
            archived: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn unavailable(bucket: impl Into<String>) -> Self {
        Self {
            available: false,
            ..Self::new(bucket)
        }
    }

    /// Report paths handed to [`ReportArchive::archive`] so far
    pub fn archived(&self) -> Vec<PathBuf> {
        self.archived
            .read()
            .map(|paths| paths.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReportArchive for MemoryArchive {
    async fn archive(&self, report_path: &Path) -> RunResult<ArchiveLocation> {
        if !self.available {
            return Err(ReconciliationError::Archive(format!(
                "bucket {} unavailable",
                self.bucket
            )));
        }
        let file_name = report_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ReconciliationError::Archive(format!("invalid report path {}", report_path.display()))
            })?;

        self.archived
            .write()
            .map_err(|_| ReconciliationError::Archive("archive lock poisoned".to_string()))?
            .push(report_path.to_path_buf());

        Ok(ArchiveLocation::Remote(format!(
            "s3://{}/reports/{}/{}",
            self.bucket,
            Utc::now().format("%Y-%m-%d"),
            file_name
        )))
    }

    async fn download_url(&self, location: &ArchiveLocation) -> Option<String> {
        match location {
            ArchiveLocation::Remote(uri) => uri
                .strip_prefix("s3://")
                .map(|key| format!("https://storage.example.com/{}?expires=604800", key)),
            ArchiveLocation::Local(_) => None,
        }
    }
}

/// Notifier that keeps every notification it is asked to send
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery errors
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> RunResult<bool> {
        if self.fail {
            return Err(ReconciliationError::Notification(
                "mail server unreachable".to_string(),
            ));
        }
        self.sent
            .write()
            .map_err(|_| ReconciliationError::Notification("notifier lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionBuilder;
    use bigdecimal::BigDecimal;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
    }

    fn txn(id: &str) -> Transaction {
        TransactionBuilder::new(id, "stripe", BigDecimal::from(10), Utc::now()).build()
    }

    #[tokio::test]
    async fn test_source_returns_fixtures_per_processor() {
        let source = MemorySource::new().with_transactions("stripe", vec![txn("A"), txn("B")], vec![txn("A")]);

        let processor = source.fetch_processor_transactions("stripe", date()).await.unwrap();
        let internal = source
            .fetch_internal_transactions("stripe", date(), &processor)
            .await
            .unwrap();
        assert_eq!(processor.len(), 2);
        assert_eq!(internal.len(), 1);
        assert!(source
            .fetch_processor_transactions("paypal", date())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_source_fixtures_survive_sharing() {
        let base = MemorySource::new().with_transactions("stripe", vec![txn("A")], vec![]);
        let shared = base.clone();
        let extended = base.with_transactions("paypal", vec![txn("P")], vec![]).with_failure("square");

        assert_eq!(
            extended.fetch_processor_transactions("paypal", date()).await.unwrap().len(),
            1
        );
        assert_eq!(
            extended.fetch_processor_transactions("stripe", date()).await.unwrap().len(),
            1
        );
        assert!(shared
            .fetch_processor_transactions("paypal", date())
            .await
            .unwrap()
            .is_empty());
        assert!(shared.fetch_processor_transactions("square", date()).await.is_ok());
    }

    #[tokio::test]
    async fn test_source_failure() {
        let source = MemorySource::new().with_failure("square");
        assert!(matches!(
            source.fetch_processor_transactions("square", date()).await,
            Err(ReconciliationError::Fetch(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_archive() {
        let archive = MemoryArchive::new("recon-bucket");
        let location = archive.archive(Path::new("local_reports/r.csv")).await.unwrap();
        assert!(location.is_remote());
        assert!(location.to_string().starts_with("s3://recon-bucket/reports/"));
        assert!(archive
            .download_url(&location)
            .await
            .unwrap()
            .starts_with("https://storage.example.com/recon-bucket/"));
        assert_eq!(archive.archived(), vec![PathBuf::from("local_reports/r.csv")]);

        let down = MemoryArchive::unavailable("recon-bucket");
        assert!(matches!(
            down.archive(Path::new("r.csv")).await,
            Err(ReconciliationError::Archive(_))
        ));
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        let alert = Notification::failure("stripe", date(), None, "boom");
        assert!(notifier.send(&alert).await.unwrap());
        assert_eq!(notifier.sent(), vec![alert.clone()]);

        assert!(RecordingNotifier::failing().send(&alert).await.is_err());
    }
}
