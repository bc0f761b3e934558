//! Relational release image handler.

use async_trait::async_trait;
use imageset_catalog::arch;
use imageset_catalog::version::{self, trim_multi, VersionFormat};
use imageset_catalog::{validate_release_image_for_rhcos, CatalogError, OsImage, ReleaseImage};
use tracing::debug;

use super::must_gather::MustGatherVersion;
use super::store::ReleaseImageStore;
use super::{Handler, HandlerContext, VersionsError};

/// Handler over the seeded `release_images` table.
pub struct DbHandler {
    store: ReleaseImageStore,
    context: HandlerContext,
}

impl DbHandler {
    pub(crate) fn new(store: ReleaseImageStore, context: HandlerContext) -> Self {
        Self { store, context }
    }

    /// Candidate rows for the request, narrowed by architecture and version
    /// in the query.
    async fn candidates(
        &self,
        openshift_version: &str,
        cpu_architecture: &str,
    ) -> Result<Vec<ReleaseImage>, VersionsError> {
        let key = trim_multi(openshift_version);
        let rows = match version::version_format(openshift_version) {
            VersionFormat::MajorMinorPatch => {
                self.store.find_by_version(cpu_architecture, key).await?
            }
            VersionFormat::MajorMinor => {
                self.store
                    .find_by_openshift_version(cpu_architecture, key)
                    .await?
            }
            _ => {
                return Err(CatalogError::UnsupportedVersionFormat {
                    version: openshift_version.to_string(),
                }
                .into())
            }
        };
        Ok(rows)
    }
}

#[async_trait]
impl Handler for DbHandler {
    async fn get_release_image(
        &self,
        openshift_version: &str,
        cpu_architecture: &str,
        _pull_secret: &str,
    ) -> Result<ReleaseImage, VersionsError> {
        let arch = arch::normalize_or_default(cpu_architecture);
        arch::validate_cpu_architecture(&arch)?;

        let candidates = self.candidates(openshift_version, &arch).await?;
        debug!(
            version = %openshift_version,
            arch = %arch,
            candidates = candidates.len(),
            "Queried release image candidates"
        );
        if candidates.is_empty() {
            return Err(CatalogError::ReleaseImageNotFound {
                version: openshift_version.to_string(),
                arch,
            }
            .into());
        }

        Ok(self.context.matcher.select(openshift_version, &arch, &candidates)?)
    }

    async fn get_release_image_by_url(
        &self,
        url: &str,
        _pull_secret: &str,
    ) -> Result<ReleaseImage, VersionsError> {
        let image = self
            .store
            .find_by_url(url)
            .await?
            .ok_or_else(|| VersionsError::ReleaseImageNotFoundByUrl {
                url: url.to_string(),
            })?;
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
        let corpus = self.store.list().await?;
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
