//! Version handler errors.

use imageset_catalog::CatalogError;
use thiserror::Error;

use super::store::DbError;
use crate::release::ReleaseError;

/// Boxed error from a cluster client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from resolving release images through a handler.
#[derive(Debug, Error)]
pub enum VersionsError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("failed to list cluster image sets: {0}")]
    ClusterImageSetList(#[source] BoxError),

    #[error("no release image found with url '{url}'")]
    ReleaseImageNotFoundByUrl { url: String },

    #[error("cluster image set sync was interrupted")]
    SyncInterrupted,
}

impl VersionsError {
    /// Whether the lookup found nothing, as opposed to failing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Catalog(e) => e.is_not_found(),
            Self::ReleaseImageNotFoundByUrl { .. } => true,
            _ => false,
        }
    }
}
