//! Daily reconciliation across processors
//!
//! Each processor is reconciled in its own task. A failure in one processor
//! marks that run failed and alerts operators without affecting the others.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::ReconciliationConfig;
use crate::metrics::ReconciliationMetrics;
use crate::http::SlackNotifier;
use crate::notification::{LogNotifier, MultiNotifier, Notification};
use crate::reconciliation::ReconciliationEngine;
use crate::reporting::{ReportBundle, ReportGenerator};
use crate::traits::*;
use crate::types::*;
use crate::utils::{LocalArchive, MemoryStorage};

/// What happened to one processor in a run
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorOutcome {
    pub processor: String,
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub summary: Option<ReconciliationSummary>,
    pub report_location: Option<ArchiveLocation>,
    /// Where the JSON report was archived, if it was
    pub json_report_location: Option<ArchiveLocation>,
    /// Whether the report notification was delivered
    pub notified: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

impl ProcessorOutcome {
    fn failed(processor: &str, run_id: Option<Uuid>, error: String, duration: Duration) -> Self {
        Self {
            processor: processor.to_string(),
            run_id,
            status: RunStatus::Failed,
            summary: None,
            report_location: None,
            json_report_location: None,
            notified: false,
            error: Some(error),
            duration,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Outcomes for every processor requested, in request order
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_date: NaiveDate,
    pub outcomes: Vec<ProcessorOutcome>,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ProcessorOutcome::succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ProcessorOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn outcome(&self, processor: &str) -> Option<&ProcessorOutcome> {
        self.outcomes.iter().find(|o| o.processor == processor)
    }
}

/// Where the reports of a successful run ended up
struct Delivery {
    location: Option<ArchiveLocation>,
    json_location: Option<ArchiveLocation>,
    notified: bool,
}

/// Wires the engine to its collaborators
#[derive(Clone)]
pub struct ReconciliationSystem {
    config: Arc<ReconciliationConfig>,
    engine: ReconciliationEngine,
    generator: ReportGenerator,
    source: Arc<dyn TransactionSource>,
    store: Arc<dyn ReconciliationStore>,
    archive: Arc<dyn ReportArchive>,
    notifier: Arc<dyn Notifier>,
    metrics: ReconciliationMetrics,
}

impl std::fmt::Debug for ReconciliationSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationSystem")
            .field("config", &self.config)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl ReconciliationSystem {
    pub fn new(
        config: ReconciliationConfig,
        source: Arc<dyn TransactionSource>,
        store: Arc<dyn ReconciliationStore>,
        archive: Arc<dyn ReportArchive>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let generator = ReportGenerator::new(config.report_prefix.clone());
        Self {
            config: Arc::new(config),
            engine: ReconciliationEngine::new(),
            generator,
            source,
            store,
            archive,
            notifier,
            metrics: ReconciliationMetrics::new(),
        }
    }

    /// In-memory store, local archive and log notifications around `source`
    ///
    /// Alerts also go to Slack when a webhook is configured.
    pub fn with_defaults(
        config: ReconciliationConfig,
        source: Arc<dyn TransactionSource>,
    ) -> RunResult<Self> {
        let store = MemoryStorage::new()
            .with_identity(config.created_by.clone(), config.application_name.clone());
        let archive = LocalArchive::new(config.archive_dir.clone());

        let mut notifier = MultiNotifier::new()
            .with_channel(Arc::new(LogNotifier::new(config.operations_email.clone())));
        if config.slack_webhook_url.is_some() {
            let slack = SlackNotifier::new(config.slack_webhook_url.clone())?;
            notifier = notifier.with_channel(Arc::new(slack));
        }

        Ok(Self::new(
            config,
            source,
            Arc::new(store),
            Arc::new(archive),
            Arc::new(notifier),
        ))
    }

    pub fn with_engine(mut self, engine: ReconciliationEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ReconciliationMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn ReconciliationStore> {
        &self.store
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }

    /// Reconcile every processor for `run_date` concurrently
    pub async fn run<I, S>(&self, run_date: NaiveDate, processors: I) -> RunReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut requested: Vec<String> = Vec::new();
        for processor in processors {
            let name = processor.as_ref().trim().to_lowercase();
            if !name.is_empty() && !requested.contains(&name) {
                requested.push(name);
            }
        }

        tracing::info!(%run_date, processors = ?requested, "starting daily reconciliation");

        let mut join_set = JoinSet::new();
        for processor in &requested {
            let system = self.clone();
            let processor = processor.clone();
            join_set.spawn(async move { system.reconcile_processor(run_date, processor).await });
        }

        let mut finished: HashMap<String, ProcessorOutcome> = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    finished.insert(outcome.processor.clone(), outcome);
                }
                Err(e) => tracing::error!(error = %e, "reconciliation task panicked"),
            }
        }

        let outcomes: Vec<ProcessorOutcome> = requested
            .iter()
            .map(|processor| {
                finished.remove(processor).unwrap_or_else(|| {
                    self.metrics
                        .record_run(processor, RunStatus::Failed, Duration::ZERO);
                    ProcessorOutcome::failed(
                        processor,
                        None,
                        "reconciliation task panicked".to_string(),
                        Duration::ZERO,
                    )
                })
            })
            .collect();

        let report = RunReport { run_date, outcomes };
        let failed = report.failed().count();
        if failed == 0 {
            tracing::info!(%run_date, processors = report.outcomes.len(), "daily reconciliation completed");
        } else {
            tracing::error!(%run_date, failed, processors = report.outcomes.len(), "daily reconciliation completed with failures");
        }
        report
    }

    /// Reconcile a single processor, turning every error into a failed outcome
    pub async fn reconcile_processor(&self, run_date: NaiveDate, processor: String) -> ProcessorOutcome {
        let started = Instant::now();
        let mut run_id = None;

        match self.execute(run_date, &processor, &mut run_id).await {
            Ok((summary, delivery)) => {
                let duration = started.elapsed();
                self.metrics
                    .record_run(&processor, RunStatus::Completed, duration);
                tracing::info!(
                    processor = %processor,
                    %run_date,
                    missing = summary.missing_transactions_count,
                    duration_ms = duration.as_millis() as u64,
                    "processor reconciliation completed"
                );
                ProcessorOutcome {
                    processor,
                    run_id,
                    status: RunStatus::Completed,
                    summary: Some(summary),
                    report_location: delivery.location,
                    json_report_location: delivery.json_location,
                    notified: delivery.notified,
                    error: None,
                    duration,
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(processor = %processor, %run_date, error = %message, "processor reconciliation failed");

                if let Some(id) = run_id {
                    if let Err(mark_err) = self.store.mark_failed(id, &message).await {
                        tracing::error!(run_id = %id, error = %mark_err, "could not mark run failed");
                    }
                }

                let alert = Notification::failure(&processor, run_date, run_id, &message);
                if let Err(notify_err) = self.notifier.send(&alert).await {
                    tracing::error!(processor = %processor, error = %notify_err, "failure alert not delivered");
                }

                let duration = started.elapsed();
                self.metrics.record_run(&processor, RunStatus::Failed, duration);
                ProcessorOutcome::failed(&processor, run_id, message, duration)
            }
        }
    }

    async fn execute(
        &self,
        run_date: NaiveDate,
        processor: &str,
        run_id: &mut Option<Uuid>,
    ) -> RunResult<(ReconciliationSummary, Delivery)> {
        let id = self.store.create_run(run_date, processor).await?;
        *run_id = Some(id);

        let processor_transactions = self
            .source
            .fetch_processor_transactions(processor, run_date)
            .await?;
        self.metrics.record_transactions(
            processor,
            LedgerSide::Processor,
            processor_transactions.len(),
        );

        let internal_transactions = self
            .source
            .fetch_internal_transactions(processor, run_date, &processor_transactions)
            .await?;
        self.metrics.record_transactions(
            processor,
            LedgerSide::Internal,
            internal_transactions.len(),
        );

        let result = self.engine.reconcile(
            &processor_transactions,
            &internal_transactions,
            run_date,
            processor,
        );
        self.metrics.record_discrepancy(&result.summary);

        self.store.store_result(id, &result).await?;

        let output_dir = self
            .config
            .report_output_dir
            .join(format!("{}_{}", processor, run_date.format("%Y-%m-%d")));
        let bundle = self.generator.generate_all(&result, &output_dir)?;

        let delivery = self.deliver(id, run_date, &result, &bundle).await?;
        Ok((result.summary, delivery))
    }

    /// Archive the reports, record where they went and notify operations
    async fn deliver(
        &self,
        run_id: Uuid,
        run_date: NaiveDate,
        result: &ReconciliationResult,
        bundle: &ReportBundle,
    ) -> RunResult<Delivery> {
        let archived = match self.archive.archive(&bundle.csv_path).await {
            Ok(location) => Some(location),
            Err(err) => {
                tracing::warn!(run_id = %run_id, error = %err, "archive unavailable; keeping local reports");
                None
            }
        };

        let json_archived = match &archived {
            Some(_) => match self.archive.archive(&bundle.json_path).await {
                Ok(location) => Some(location),
                Err(err) => {
                    tracing::warn!(run_id = %run_id, error = %err, "JSON report not archived; keeping it locally");
                    None
                }
            },
            None => None,
        };

        let recorded = archived
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| bundle.csv_path.display().to_string());
        self.store.update_report_location(run_id, &recorded).await?;

        let notification = match &archived {
            Some(location) if location.is_remote() => {
                let url = self.archive.download_url(location).await;
                Notification::reconciliation(result, run_date, url.as_deref(), None)
            }
            _ => Notification::reconciliation(result, run_date, None, Some(bundle.csv_path.as_path())),
        };

        let notified = match self.notifier.send(&notification).await {
            Ok(sent) => sent,
            Err(err) => {
                tracing::error!(run_id = %run_id, error = %err, "report notification not delivered");
                false
            }
        };

        let mut archived_remotely = Vec::new();
        if archived.as_ref().is_some_and(ArchiveLocation::is_remote) {
            archived_remotely.push(bundle.csv_path.as_path());
        }
        if json_archived.as_ref().is_some_and(ArchiveLocation::is_remote) {
            archived_remotely.push(bundle.json_path.as_path());
        }
        remove_local_reports(&archived_remotely);

        Ok(Delivery {
            location: archived,
            json_location: json_archived,
            notified,
        })
    }
}

/// Delete generated reports that reached remote storage
fn remove_local_reports(paths: &[&Path]) {
    for path in paths {
        if let Err(err) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %err, "could not remove local report");
        }
    }
    if let Some(dir) = paths
        .first()
        .and_then(|path| path.parent())
        .filter(|d| *d != Path::new(""))
    {
        // only succeeds when the directory is empty
        let _ = fs::remove_dir(dir);
    }
}
