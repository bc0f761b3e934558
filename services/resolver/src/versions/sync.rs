//! Release image discovery from cluster image sets.
//!
//! In cluster mode the corpus starts from configuration and grows as
//! `ClusterImageSet` resources reference release images it does not know.
//! Each unknown image is inspected for its version and architectures and
//! appended to the corpus.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use imageset_catalog::arch::MULTI_CPU_ARCHITECTURE;
use imageset_catalog::version::{self, trim_multi};
use imageset_catalog::ReleaseImage;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, info};

use super::error::BoxError;
use super::VersionsError;
use crate::release::ReleaseInspector;

/// Release images are inspected at most this many at a time.
pub const DEFAULT_SYNC_CONCURRENCY: usize = 30;

/// A `ClusterImageSet` resource, reduced to what discovery needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterImageSet {
    pub name: String,
    pub release_image: String,
}

/// Source of cluster image sets.
#[async_trait]
pub trait ClusterImageSetLister: Send + Sync {
    async fn list_cluster_image_sets(&self) -> Result<Vec<ClusterImageSet>, BoxError>;
}

#[derive(Debug, Deserialize)]
struct ClusterImageSetList {
    #[serde(default)]
    items: Vec<ClusterImageSetItem>,
}

#[derive(Debug, Deserialize)]
struct ClusterImageSetItem {
    #[serde(default)]
    metadata: ObjectMeta,
    spec: ClusterImageSetSpec,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterImageSetSpec {
    release_image: String,
}

/// Parse a `ClusterImageSetList` in its Kubernetes JSON form.
pub fn parse_cluster_image_set_list(json: &str) -> Result<Vec<ClusterImageSet>, serde_json::Error> {
    let list: ClusterImageSetList = serde_json::from_str(json)?;
    Ok(list
        .items
        .into_iter()
        .map(|item| ClusterImageSet {
            name: item.metadata.name,
            release_image: item.spec.release_image,
        })
        .collect())
}

/// Lists cluster image sets from a file holding a `ClusterImageSetList`, as
/// written by `kubectl get clusterimagesets -o json`. The file is re-read on
/// every call.
#[derive(Debug, Clone)]
pub struct ClusterImageSetFile {
    path: PathBuf,
}

impl ClusterImageSetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ClusterImageSetLister for ClusterImageSetFile {
    async fn list_cluster_image_sets(&self) -> Result<Vec<ClusterImageSet>, BoxError> {
        let json = tokio::fs::read_to_string(&self.path).await?;
        Ok(parse_cluster_image_set_list(&json)?)
    }
}

/// Outcome per release image of one sync pass.
pub type SyncResults = Vec<(String, Result<ReleaseImage, VersionsError>)>;

/// Resolves cluster image sets into corpus records.
///
/// Every inspection, from any pass or lookup by URL, holds a permit of one
/// shared semaphore. Passes run one at a time; a pass that waited sees what
/// the previous one added.
pub struct ClusterImageSetSync {
    lister: Arc<dyn ClusterImageSetLister>,
    inspector: Arc<dyn ReleaseInspector>,
    concurrency: usize,
    semaphore: Semaphore,
    pass: Mutex<()>,
}

impl ClusterImageSetSync {
    pub fn new(
        lister: Arc<dyn ClusterImageSetLister>,
        inspector: Arc<dyn ReleaseInspector>,
        concurrency: usize,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            lister,
            inspector,
            concurrency,
            semaphore: Semaphore::new(concurrency),
            pass: Mutex::new(()),
        }
    }

    /// Add every release image referenced by a cluster image set and missing
    /// from `corpus`. Failures are reported per image and do not stop the
    /// others. Returns once all resolutions have finished.
    pub async fn sync(
        &self,
        corpus: &RwLock<Vec<ReleaseImage>>,
        pull_secret: &str,
    ) -> Result<SyncResults, VersionsError> {
        let _pass = self.pass.lock().await;
        let image_sets = self
            .lister
            .list_cluster_image_sets()
            .await
            .map_err(VersionsError::ClusterImageSetList)?;

        let pending: Vec<String> = {
            let corpus = corpus.read().await;
            let mut seen = HashSet::new();
            image_sets
                .into_iter()
                .map(|set| set.release_image)
                .filter(|url| {
                    !url.is_empty()
                        && !corpus.iter().any(|image| image.url == *url)
                        && seen.insert(url.clone())
                })
                .collect()
        };

        if pending.is_empty() {
            debug!("All cluster image sets already known");
            return Ok(Vec::new());
        }
        info!(
            count = pending.len(),
            concurrency = self.concurrency,
            "Resolving release images from cluster image sets"
        );

        let tasks = pending.into_iter().map(|url| async move {
            let result = self.add_release_image(corpus, &url, pull_secret).await;
            (url, result)
        });

        Ok(join_all(tasks).await)
    }

    /// Inspect `url` and append it to `corpus`, unless a record with that URL
    /// is already present, in which case that record is returned.
    pub async fn add_release_image(
        &self,
        corpus: &RwLock<Vec<ReleaseImage>>,
        url: &str,
        pull_secret: &str,
    ) -> Result<ReleaseImage, VersionsError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| VersionsError::SyncInterrupted)?;
        let release_version = self
            .inspector
            .openshift_version(url, None, pull_secret)
            .await?;
        debug!(url = %url, version = %release_version, "Detected release version");

        let cpu_architectures = self
            .inspector
            .release_architectures(url, pull_secret)
            .await?;
        debug!(url = %url, architectures = ?cpu_architectures, "Detected release architectures");

        let cpu_architecture = match cpu_architectures.as_slice() {
            [single] => single.clone(),
            _ => MULTI_CPU_ARCHITECTURE.to_string(),
        };

        let mut record = ReleaseImage {
            openshift_version: version::major_minor(trim_multi(&release_version))?,
            version: release_version,
            url: url.to_string(),
            cpu_architecture,
            cpu_architectures,
            support_level: None,
            default: false,
        };
        record.normalize_architectures();

        let mut corpus = corpus.write().await;
        if let Some(existing) = corpus.iter().find(|image| image.url == url) {
            return Ok(existing.clone());
        }
        corpus.push(record.clone());
        info!(
            url = %record.url,
            version = %record.version,
            cpu_architecture = %record.cpu_architecture,
            "Added release image"
        );
        Ok(record)
    }
}
