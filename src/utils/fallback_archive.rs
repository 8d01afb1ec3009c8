//! Remote archive with a local fallback

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::local_archive::LocalArchive;
use crate::traits::*;
use crate::types::*;

/// Tries the primary archive first and keeps a local copy when it fails
#[derive(Clone)]
pub struct FallbackArchive {
    primary: Arc<dyn ReportArchive>,
    fallback: LocalArchive,
}

impl FallbackArchive {
    pub fn new(primary: Arc<dyn ReportArchive>, fallback: LocalArchive) -> Self {
        Self { primary, fallback }
    }
}

impl std::fmt::Debug for FallbackArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackArchive")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReportArchive for FallbackArchive {
    async fn archive(&self, report_path: &Path) -> RunResult<ArchiveLocation> {
        match self.primary.archive(report_path).await {
            Ok(location) => Ok(location),
            Err(err) => {
                tracing::warn!(
                    path = %report_path.display(),
                    error = %err,
                    "remote archive failed; falling back to local storage"
                );
                self.fallback.archive(report_path).await
            }
        }
    }

    async fn download_url(&self, location: &ArchiveLocation) -> Option<String> {
        match location {
            ArchiveLocation::Remote(_) => self.primary.download_url(location).await,
            ArchiveLocation::Local(_) => self.fallback.download_url(location).await,
        }
    }
}
