//! Cluster-backed release image handler.

use async_trait::async_trait;
use imageset_catalog::{validate_release_image_for_rhcos, OsImage, ReleaseImage};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::must_gather::MustGatherVersion;
use super::sync::ClusterImageSetSync;
use super::{Handler, HandlerContext, VersionsError};

/// Handler over an in-memory corpus that grows from cluster image sets.
pub struct KubeHandler {
    corpus: RwLock<Vec<ReleaseImage>>,
    sync: ClusterImageSetSync,
    context: HandlerContext,
}

impl KubeHandler {
    pub(crate) fn new(
        release_images: Vec<ReleaseImage>,
        sync: ClusterImageSetSync,
        context: HandlerContext,
    ) -> Self {
        Self {
            corpus: RwLock::new(release_images),
            sync,
            context,
        }
    }

    async fn select(
        &self,
        openshift_version: &str,
        cpu_architecture: &str,
    ) -> Result<ReleaseImage, VersionsError> {
        let corpus = self.corpus.read().await;
        Ok(self
            .context
            .matcher
            .select(openshift_version, cpu_architecture, &corpus)?)
    }

    /// Pull in cluster image sets; individual failures are logged.
    async fn sync_cluster_image_sets(&self, pull_secret: &str) -> Result<(), VersionsError> {
        let results = self.sync.sync(&self.corpus, pull_secret).await?;
        let failed = results.iter().filter(|(_, result)| result.is_err()).count();
        for (url, result) in &results {
            if let Err(e) = result {
                warn!(url = %url, error = %e, "Failed to add release image from cluster image set");
            }
        }
        if !results.is_empty() {
            info!(
                added = results.len() - failed,
                failed,
                "Synced cluster image sets"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Handler for KubeHandler {
    async fn get_release_image(
        &self,
        openshift_version: &str,
        cpu_architecture: &str,
        pull_secret: &str,
    ) -> Result<ReleaseImage, VersionsError> {
        match self.select(openshift_version, cpu_architecture).await {
            Err(e) if e.is_not_found() => {
                debug!(
                    version = %openshift_version,
                    arch = %cpu_architecture,
                    error = %e,
                    "Release image not known, syncing cluster image sets"
                );
                self.sync_cluster_image_sets(pull_secret).await?;
                self.select(openshift_version, cpu_architecture).await
            }
            result => result,
        }
    }

    async fn get_release_image_by_url(
        &self,
        url: &str,
        pull_secret: &str,
    ) -> Result<ReleaseImage, VersionsError> {
        let known = self
            .corpus
            .read()
            .await
            .iter()
            .find(|image| image.url == url)
            .cloned();

        let image = match known {
            Some(image) => image,
            None => {
                debug!(url = %url, "Release image not known, inspecting it");
                self.sync
                    .add_release_image(&self.corpus, url, pull_secret)
                    .await?
            }
        };
        self.context.matcher.assert_not_ignored(&image.version)?;
        Ok(image)
    }

    async fn get_must_gather_images(
        &self,
        openshift_version: &str,
        cpu_architecture: &str,
        pull_secret: &str,
    ) -> Result<MustGatherVersion, VersionsError> {
        self.context
            .must_gather_images(self, openshift_version, cpu_architecture, pull_secret)
            .await
    }

    async fn validate_release_image_for_rhcos(
        &self,
        rhcos_version: &str,
        cpu_architecture: &str,
    ) -> Result<(), VersionsError> {
        let corpus = self.corpus.read().await;
        Ok(validate_release_image_for_rhcos(
            rhcos_version,
            cpu_architecture,
            &corpus,
        )?)
    }

    fn os_image(&self, version: &str, cpu_architecture: &str) -> Result<OsImage, VersionsError> {
        self.context.os_image(version, cpu_architecture)
    }
}
