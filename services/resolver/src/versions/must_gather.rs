//! Must-gather image cache per minor version and architecture.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use imageset_catalog::arch;
use imageset_catalog::version::{self, trim_multi};
use tokio::sync::Mutex;
use tracing::debug;

use super::VersionsError;

/// Component name (`ocp`, `cnv`, `odf`, ...) to must-gather image.
pub type MustGatherVersion = BTreeMap<String, String>;

/// `<x.y>-<arch>` to the must-gather images of that minor.
pub type MustGatherVersions = HashMap<String, MustGatherVersion>;

/// Component key of the release's own must-gather image.
pub const OCP_MUST_GATHER: &str = "ocp";

/// Cache key for a version and architecture, e.g. `4.14-x86_64`.
pub fn must_gather_key(
    openshift_version: &str,
    cpu_architecture: &str,
) -> Result<String, VersionsError> {
    let minor = version::major_minor(trim_multi(openshift_version))?;
    Ok(format!("{minor}-{}", arch::normalize_or_default(cpu_architecture)))
}

/// Must-gather images, seeded from configuration and completed lazily with
/// the `ocp` image of the matching release.
#[derive(Debug, Default)]
pub struct MustGatherCache {
    versions: Mutex<MustGatherVersions>,
}

impl MustGatherCache {
    pub fn new(seed: MustGatherVersions) -> Self {
        Self {
            versions: Mutex::new(seed),
        }
    }

    /// Images for the key of `openshift_version`/`cpu_architecture`. When no
    /// `ocp` image is known yet, `resolve_ocp` provides it.
    ///
    /// The cache stays locked for the whole call, resolution included.
    pub async fn get_or_resolve<F, Fut>(
        &self,
        openshift_version: &str,
        cpu_architecture: &str,
        resolve_ocp: F,
    ) -> Result<MustGatherVersion, VersionsError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, VersionsError>>,
    {
        let mut versions = self.versions.lock().await;
        let key = must_gather_key(openshift_version, cpu_architecture)?;
        let images = versions.entry(key).or_default();

        if images.get(OCP_MUST_GATHER).is_some_and(|image| !image.is_empty()) {
            return Ok(images.clone());
        }

        let image = resolve_ocp().await?;
        debug!(image = %image, "Resolved ocp must-gather image");
        images.insert(OCP_MUST_GATHER.to_string(), image);
        Ok(images.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_key() {
        assert_eq!(must_gather_key("4.14.2", "").unwrap(), "4.14-x86_64");
        assert_eq!(must_gather_key("4.14-multi", "aarch64").unwrap(), "4.14-arm64");
        assert!(must_gather_key("latest", "x86_64").is_err());
    }

    #[tokio::test]
    async fn test_seeded_ocp_image_is_returned_without_resolving() {
        let seed = MustGatherVersions::from([(
            "4.14-x86_64".to_string(),
            MustGatherVersion::from([
                ("ocp".to_string(), "quay.io/ocp-mg".to_string()),
                ("cnv".to_string(), "quay.io/cnv-mg".to_string()),
            ]),
        )]);
        let cache = MustGatherCache::new(seed);

        let images = cache
            .get_or_resolve("4.14.7", "x86_64", || async {
                Err(VersionsError::SyncInterrupted)
            })
            .await
            .unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images["cnv"], "quay.io/cnv-mg");
    }

    #[tokio::test]
    async fn test_resolves_once_and_keeps_seeded_components() {
        let seed = MustGatherVersions::from([(
            "4.15-arm64".to_string(),
            MustGatherVersion::from([("odf".to_string(), "quay.io/odf-mg".to_string())]),
        )]);
        let cache = MustGatherCache::new(seed);
        let calls = AtomicUsize::new(0);
        let calls = &calls;

        for _ in 0..3 {
            let images = cache
                .get_or_resolve("4.15", "aarch64", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("quay.io/ocp-mg:4.15".to_string())
                })
                .await
                .unwrap();
            assert_eq!(images[OCP_MUST_GATHER], "quay.io/ocp-mg:4.15");
            assert_eq!(images["odf"], "quay.io/odf-mg");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
