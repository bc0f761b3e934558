//! Configuration for the resolver.

use std::path::PathBuf;

use anyhow::{Context, Result};
use imageset_catalog::{OsImage, ReleaseImage};
use serde::de::DeserializeOwned;

use crate::release::ReleaseConfig;
use crate::versions::{DbConfig, HandlerOptions, MustGatherVersions, DEFAULT_SYNC_CONCURRENCY};

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Configured release images (`RELEASE_IMAGES`).
    pub release_images: Vec<ReleaseImage>,

    /// Configured OS images (`OS_IMAGES`).
    pub os_images: Vec<OsImage>,

    /// Versions never returned by lookups.
    pub ignored_versions: Vec<String>,

    /// Must-gather images keyed by `<x.y>-<arch>`.
    pub must_gather_versions: MustGatherVersions,

    /// Mirror used instead of the release image.
    pub release_image_mirror: Option<String>,

    /// Use the cluster-backed handler instead of the database.
    pub enable_kube_api: bool,

    /// `ClusterImageSetList` JSON read by the cluster-backed handler.
    pub cluster_image_sets_file: PathBuf,

    /// Release images inspected at once during a sync.
    pub cluster_image_set_concurrency: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub db: DbConfig,

    pub release: ReleaseConfig,
}

impl Config {
    /// Load configuration from environment variables. Malformed JSON in any
    /// of the corpus variables is an error.
    pub fn from_env() -> Result<Self> {
        let release_images = parse_json("RELEASE_IMAGES", std::env::var("RELEASE_IMAGES").ok())?;
        let os_images = parse_json("OS_IMAGES", std::env::var("OS_IMAGES").ok())?;
        let ignored_versions = parse_json(
            "IGNORED_OPENSHIFT_VERSIONS",
            std::env::var("IGNORED_OPENSHIFT_VERSIONS").ok(),
        )?;
        let must_gather_versions =
            parse_json("MUST_GATHER_IMAGES", std::env::var("MUST_GATHER_IMAGES").ok())?;

        let release_image_mirror = std::env::var("RELEASE_IMAGE_MIRROR")
            .ok()
            .filter(|s| !s.is_empty());

        let enable_kube_api = std::env::var("ENABLE_KUBE_API")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);

        let cluster_image_sets_file = std::env::var("CLUSTER_IMAGE_SETS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/etc/imageset/clusterimagesets.json"));

        let cluster_image_set_concurrency = std::env::var("CLUSTER_IMAGE_SET_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SYNC_CONCURRENCY);

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            release_images,
            os_images,
            ignored_versions,
            must_gather_versions,
            release_image_mirror,
            enable_kube_api,
            cluster_image_sets_file,
            cluster_image_set_concurrency,
            log_level,
            db: DbConfig::from_env(),
            release: ReleaseConfig::from_env(),
        })
    }

    /// Handler inputs taken from this configuration.
    pub fn handler_options(&self) -> HandlerOptions {
        HandlerOptions {
            release_images: self.release_images.clone(),
            os_images: self.os_images.clone(),
            ignored_versions: self.ignored_versions.clone(),
            must_gather_versions: self.must_gather_versions.clone(),
            release_image_mirror: self.release_image_mirror.clone(),
        }
    }
}

/// Decode a JSON variable. Unset or blank means the default value.
fn parse_json<T>(name: &str, value: Option<String>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match value {
        Some(value) if !value.trim().is_empty() => {
            serde_json::from_str(&value).with_context(|| format!("failed to parse {name}"))
        }
        _ => Ok(T::default()),
    }
}
