//! Filesystem report archive

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::traits::*;
use crate::types::*;

/// Archives reports under `{root}/reports/{YYYY-MM-DD}/`
#[derive(Debug, Clone)]
pub struct LocalArchive {
    root: PathBuf,
}

impl LocalArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination for a report archived on `archived_on`
    pub fn destination(&self, report_path: &Path, archived_on: NaiveDate) -> RunResult<PathBuf> {
        let file_name = report_path.file_name().ok_or_else(|| {
            ReconciliationError::Archive(format!(
                "report path {} has no file name",
                report_path.display()
            ))
        })?;
        Ok(self
            .root
            .join("reports")
            .join(archived_on.format("%Y-%m-%d").to_string())
            .join(file_name))
    }
}

#[async_trait]
impl ReportArchive for LocalArchive {
    async fn archive(&self, report_path: &Path) -> RunResult<ArchiveLocation> {
        let destination = self.destination(report_path, Utc::now().date_naive())?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(report_path, &destination)?;

        tracing::info!(
            source = %report_path.display(),
            destination = %destination.display(),
            "report archived locally"
        );
        Ok(ArchiveLocation::Local(destination))
    }

    async fn download_url(&self, location: &ArchiveLocation) -> Option<String> {
        match location {
            ArchiveLocation::Local(path) => Some(format!("file://{}", path.display())),
            ArchiveLocation::Remote(_) => None,
        }
    }
}
