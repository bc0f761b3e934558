//! Release image lookup by version and architecture.
//!
//! Two [`Handler`] implementations share the selection rules of
//! [`VersionMatcher`] and differ only in where the corpus lives:
//!
//! - `DbHandler`: the configured corpus is seeded into the relational store
//!   and candidates are queried per request.
//! - `KubeHandler`: the corpus is kept in memory and extended from cluster
//!   image sets when a lookup misses.
//!
//! The implementation is chosen once, by [`new_handler`].

mod db;
mod error;
mod kube;
mod must_gather;
mod store;
mod sync;

pub use db::DbHandler;
pub use error::{BoxError, VersionsError};
pub use kube::KubeHandler;
pub use must_gather::{
    must_gather_key, MustGatherCache, MustGatherVersion, MustGatherVersions, OCP_MUST_GATHER,
};
pub use store::{DbConfig, DbError, ReleaseImageStore};
pub use sync::{
    parse_cluster_image_set_list, ClusterImageSet, ClusterImageSetFile, ClusterImageSetLister,
    ClusterImageSetSync, SyncResults, DEFAULT_SYNC_CONCURRENCY,
};

use std::sync::Arc;

use async_trait::async_trait;
use imageset_catalog::{
    prepare_release_images, CatalogError, OsImage, OsImageCatalog, ReleaseImage, VersionMatcher,
};
use tracing::info;

use crate::release::ReleaseInspector;

/// Release image lookups.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Release image for an `x.y` or `x.y.z[-pre]` version on an
    /// architecture. An empty architecture means `x86_64`.
    async fn get_release_image(
        &self,
        openshift_version: &str,
        cpu_architecture: &str,
        pull_secret: &str,
    ) -> Result<ReleaseImage, VersionsError>;

    /// Release image with the given pull reference.
    async fn get_release_image_by_url(
        &self,
        url: &str,
        pull_secret: &str,
    ) -> Result<ReleaseImage, VersionsError>;

    /// Must-gather images for the minor of `openshift_version`, including the
    /// release's own `ocp` image.
    async fn get_must_gather_images(
        &self,
        openshift_version: &str,
        cpu_architecture: &str,
        pull_secret: &str,
    ) -> Result<MustGatherVersion, VersionsError>;

    /// Fail unless some release image of the architecture shares the minor
    /// of `rhcos_version`.
    async fn validate_release_image_for_rhcos(
        &self,
        rhcos_version: &str,
        cpu_architecture: &str,
    ) -> Result<(), VersionsError>;

    /// OS image for a release version, or the latest one when `version` is
    /// empty.
    fn os_image(&self, version: &str, cpu_architecture: &str) -> Result<OsImage, VersionsError>;
}

/// Inputs shared by both handler implementations.
#[derive(Debug, Clone, Default)]
pub struct HandlerOptions {
    /// Configured release images. Validated as a whole at construction.
    pub release_images: Vec<ReleaseImage>,

    /// Configured OS images. May be empty.
    pub os_images: Vec<OsImage>,

    /// Versions (`x.y` or exact) never returned by lookups.
    pub ignored_versions: Vec<String>,

    /// Seed for the must-gather cache.
    pub must_gather_versions: MustGatherVersions,

    /// Mirror used instead of the release image for component lookups.
    pub release_image_mirror: Option<String>,
}

/// Where the release image corpus lives.
pub enum Backend {
    /// Relational store. The configured corpus replaces the table contents.
    Database(ReleaseImageStore),

    /// In-memory corpus extended from cluster image sets.
    Kube {
        lister: Arc<dyn ClusterImageSetLister>,
        concurrency: usize,
    },
}

/// State common to both handlers.
pub(crate) struct HandlerContext {
    matcher: VersionMatcher,
    os_images: Option<OsImageCatalog>,
    must_gather: MustGatherCache,
    inspector: Arc<dyn ReleaseInspector>,
    mirror: Option<String>,
}

impl HandlerContext {
    fn new(
        options: HandlerOptions,
        inspector: Arc<dyn ReleaseInspector>,
    ) -> Result<Self, VersionsError> {
        let os_images = if options.os_images.is_empty() {
            None
        } else {
            Some(OsImageCatalog::new(options.os_images)?)
        };

        Ok(Self {
            matcher: VersionMatcher::new(options.ignored_versions),
            os_images,
            must_gather: MustGatherCache::new(options.must_gather_versions),
            inspector,
            mirror: options.release_image_mirror.filter(|m| !m.is_empty()),
        })
    }

    fn os_image(&self, version: &str, cpu_architecture: &str) -> Result<OsImage, VersionsError> {
        let catalog = self.os_images.as_ref().ok_or(CatalogError::EmptyOsImages)?;
        Ok(catalog.os_image_or_latest(version, cpu_architecture)?.clone())
    }

    /// Must-gather images, resolving the `ocp` image through `handler` when
    /// it is not cached yet.
    async fn must_gather_images<H>(
        &self,
        handler: &H,
        openshift_version: &str,
        cpu_architecture: &str,
        pull_secret: &str,
    ) -> Result<MustGatherVersion, VersionsError>
    where
        H: Handler + ?Sized,
    {
        self.must_gather
            .get_or_resolve(openshift_version, cpu_architecture, || async {
                let release = handler
                    .get_release_image(openshift_version, cpu_architecture, pull_secret)
                    .await?;
                let image = self
                    .inspector
                    .must_gather_image(&release.url, self.mirror.as_deref(), pull_secret)
                    .await?;
                Ok(image)
            })
            .await
    }
}

/// Build the handler for `backend`.
///
/// The release image corpus is validated before anything else happens; an
/// invalid record fails construction and nothing is installed.
pub async fn new_handler(
    options: HandlerOptions,
    inspector: Arc<dyn ReleaseInspector>,
    backend: Backend,
) -> Result<Arc<dyn Handler>, VersionsError> {
    let mut options = options;
    let release_images = prepare_release_images(std::mem::take(&mut options.release_images))?;
    let context = HandlerContext::new(options, Arc::clone(&inspector))?;

    match backend {
        Backend::Database(store) => {
            store.replace_all(&release_images).await?;
            info!(count = release_images.len(), "Using database release image handler");
            Ok(Arc::new(DbHandler::new(store, context)))
        }
        Backend::Kube {
            lister,
            concurrency,
        } => {
            info!(count = release_images.len(), "Using cluster release image handler");
            let sync = ClusterImageSetSync::new(lister, inspector, concurrency);
            Ok(Arc::new(KubeHandler::new(release_images, sync, context)))
        }
    }
}
