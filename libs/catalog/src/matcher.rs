//! Release image selection by version and architecture.
//!
//! Selection is a pure function over a corpus snapshot. Both the relational
//! and the cluster-backed handlers feed their candidates through
//! [`VersionMatcher::select`], so the preference rules live in one place:
//!
//! 1. Records built for the requested architecture win over multi-arch
//!    payloads that merely contain it.
//! 2. An `x.y.z[-pre]` request must match a build exactly.
//! 3. An `x.y` request picks the latest build of that minor, preferring
//!    non-beta builds over beta ones.
//! 4. Ignored versions are never returned.

use std::cmp::Ordering;

use tracing::debug;

use crate::arch::{self, MULTI_CPU_ARCHITECTURE};
use crate::error::CatalogError;
use crate::model::ReleaseImage;
use crate::version::{self, trim_multi, Version, VersionFormat};

/// Version selection with an ignore list.
#[derive(Debug, Clone, Default)]
pub struct VersionMatcher {
    ignored_versions: Vec<String>,
}

impl VersionMatcher {
    /// Create a matcher. Entries may be `x.y` (ignores the whole minor) or an
    /// exact build.
    pub fn new(ignored_versions: Vec<String>) -> Self {
        Self { ignored_versions }
    }

    /// Select the release image for `desired_version` on `desired_arch`.
    pub fn select(
        &self,
        desired_version: &str,
        desired_arch: &str,
        corpus: &[ReleaseImage],
    ) -> Result<ReleaseImage, CatalogError> {
        let arch = arch::normalize_or_default(desired_arch);
        arch::validate_cpu_architecture(&arch)?;

        let format = version::version_format(desired_version);
        if !matches!(
            format,
            VersionFormat::MajorMinor | VersionFormat::MajorMinorPatch
        ) {
            return Err(CatalogError::UnsupportedVersionFormat {
                version: desired_version.to_string(),
            });
        }

        let exact_arch: Vec<&ReleaseImage> = corpus
            .iter()
            .filter(|r| is_exact_arch(r, &arch))
            .collect();
        let multi_arch: Vec<&ReleaseImage> = corpus
            .iter()
            .filter(|r| is_multi_arch_fallback(r, &arch))
            .collect();

        if exact_arch.is_empty() && multi_arch.is_empty() {
            return Err(CatalogError::ArchitectureNotAvailable { arch });
        }

        let not_found = || CatalogError::ReleaseImageNotFound {
            version: desired_version.to_string(),
            arch: arch.clone(),
        };

        if format == VersionFormat::MajorMinorPatch {
            let found = find_build(&exact_arch, desired_version)
                .or_else(|| find_build(&multi_arch, desired_version))
                .ok_or_else(not_found)?;
            self.assert_not_ignored(&found.version)?;
            debug!(
                version = %desired_version,
                arch = %arch,
                url = %found.url,
                "Matched release image by exact version"
            );
            return Ok(found.clone());
        }

        let key = trim_multi(desired_version);
        let of_minor = |view: &[&ReleaseImage]| -> Vec<ReleaseImage> {
            view.iter()
                .filter(|r| trim_multi(&r.openshift_version) == key)
                .map(|r| (*r).clone())
                .collect()
        };

        let mut candidates = of_minor(&exact_arch);
        if candidates.is_empty() {
            candidates = of_minor(&multi_arch);
        }
        if candidates.is_empty() {
            return Err(not_found());
        }

        let latest = self.latest(&candidates)?;
        debug!(
            version = %desired_version,
            arch = %arch,
            selected = %latest.version,
            candidates = candidates.len(),
            "Matched latest release image for minor"
        );
        Ok(latest.clone())
    }

    /// Latest non-ignored record: non-beta beats beta, otherwise the higher
    /// build wins.
    pub fn latest<'a>(
        &self,
        candidates: &'a [ReleaseImage],
    ) -> Result<&'a ReleaseImage, CatalogError> {
        let mut best: Option<(&ReleaseImage, Version)> = None;

        for candidate in candidates {
            if self.assert_not_ignored(&candidate.version).is_err() {
                continue;
            }
            let candidate_version = Version::parse(trim_multi(&candidate.version))?;

            let replace = match &best {
                None => true,
                Some((current, current_version)) => {
                    let (current_beta, candidate_beta) = (current.is_beta(), candidate.is_beta());
                    (current_beta && !candidate_beta)
                        || (current_beta == candidate_beta
                            && candidate_version.cmp(current_version) == Ordering::Greater)
                }
            };
            if replace {
                best = Some((candidate, candidate_version));
            }
        }

        best.map(|(image, _)| image)
            .ok_or(CatalogError::NoMatchingReleaseImage)
    }

    /// Fail when the version, or its `x.y`, is on the ignore list. Only a
    /// literal `-multi` suffix is stripped before comparing.
    pub fn assert_not_ignored(&self, version: &str) -> Result<(), CatalogError> {
        let version = trim_multi(version);
        let major_minor = version::major_minor(version)?;

        if self
            .ignored_versions
            .iter()
            .any(|ignored| *ignored == major_minor || ignored == version)
        {
            return Err(CatalogError::VersionIgnored {
                version: version.to_string(),
            });
        }
        Ok(())
    }

    pub fn is_ignored(&self, version: &str) -> bool {
        self.assert_not_ignored(version).is_err()
    }
}

/// Built for `arch` itself: primary architecture matches, or a single-arch
/// record lists it.
fn is_exact_arch(record: &ReleaseImage, arch: &str) -> bool {
    record.cpu_architecture == arch
        || (!record.is_multi_arch() && record.cpu_architectures.iter().any(|a| a == arch))
}

fn is_multi_arch_fallback(record: &ReleaseImage, arch: &str) -> bool {
    record.is_multi_arch() && record.cpu_architectures.iter().any(|a| a == arch)
}

/// Exact build lookup: a verbatim match first, then a match with `-multi`
/// stripped from both sides.
fn find_build<'a>(view: &[&'a ReleaseImage], desired: &str) -> Option<&'a ReleaseImage> {
    view.iter()
        .find(|r| r.version == desired)
        .or_else(|| {
            view.iter()
                .find(|r| trim_multi(&r.version) == trim_multi(desired))
        })
        .copied()
}

/// Weak RHCOS compatibility check: any record of the architecture whose
/// minor equals the RHCOS minor is enough.
pub fn validate_release_image_for_rhcos(
    rhcos_version: &str,
    cpu_architecture: &str,
    corpus: &[ReleaseImage],
) -> Result<(), CatalogError> {
    if cpu_architecture == MULTI_CPU_ARCHITECTURE {
        return Err(CatalogError::NoReleaseForRhcos {
            version: rhcos_version.to_string(),
            arch: cpu_architecture.to_string(),
        });
    }

    let rhcos_minor = version::major_minor(rhcos_version)?;
    let arch = arch::normalize_or_default(cpu_architecture);

    for record in corpus {
        let minor = version::major_minor(trim_multi(&record.openshift_version))?;
        if minor == rhcos_minor && record.supports_architecture(&arch) {
            debug!(
                arch = %arch,
                version = %record.version,
                "Found release image matching RHCOS version"
            );
            return Ok(());
        }
    }

    Err(CatalogError::NoReleaseForRhcos {
        version: rhcos_minor,
        arch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SupportLevel;

    fn image(openshift_version: &str, version: &str, arch: &str, arches: &[&str]) -> ReleaseImage {
        ReleaseImage {
            openshift_version: openshift_version.to_string(),
            version: version.to_string(),
            url: format!("quay.io/openshift-release-dev/ocp-release:{version}-{arch}"),
            cpu_architecture: arch.to_string(),
            cpu_architectures: arches.iter().map(|a| a.to_string()).collect(),
            support_level: None,
            default: false,
        }
    }

    fn x86(openshift_version: &str, version: &str) -> ReleaseImage {
        image(openshift_version, version, "x86_64", &["x86_64"])
    }

    fn beta(mut record: ReleaseImage) -> ReleaseImage {
        record.support_level = Some(SupportLevel::Beta);
        record
    }

    #[test]
    fn test_exact_version_regardless_of_order() {
        let corpus = vec![x86("4.14", "4.14.1"), x86("4.14", "4.14.2"), x86("4.14", "4.14.3")];
        let matcher = VersionMatcher::default();

        let found = matcher.select("4.14.2", "x86_64", &corpus).unwrap();
        assert_eq!(found.version, "4.14.2");

        let mut reversed = corpus.clone();
        reversed.reverse();
        let found = matcher.select("4.14.2", "x86_64", &reversed).unwrap();
        assert_eq!(found.version, "4.14.2");
    }

    #[test]
    fn test_exact_version_does_not_fall_back_to_minor() {
        let corpus = vec![x86("4.14", "4.14.1")];
        let err = VersionMatcher::default()
            .select("4.14.2", "x86_64", &corpus)
            .unwrap_err();
        assert!(matches!(err, CatalogError::ReleaseImageNotFound { .. }));
    }

    #[test]
    fn test_major_only_is_rejected() {
        let corpus = vec![x86("4.14", "4.14.1")];
        let err = VersionMatcher::default()
            .select("4", "x86_64", &corpus)
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedVersionFormat { .. }));
    }

    #[test]
    fn test_unknown_architecture() {
        let corpus = vec![x86("4.14", "4.14.1")];
        let matcher = VersionMatcher::default();

        let err = matcher.select("4.14", "sparc", &corpus).unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedArchitecture { .. }));

        let err = matcher.select("4.14", "s390x", &corpus).unwrap_err();
        assert!(matches!(err, CatalogError::ArchitectureNotAvailable { .. }));
    }

    #[test]
    fn test_empty_architecture_defaults_to_x86_64() {
        let corpus = vec![x86("4.14", "4.14.1")];
        let found = VersionMatcher::default().select("4.14", "", &corpus).unwrap();
        assert_eq!(found.version, "4.14.1");
    }

    #[test]
    fn test_minor_prefers_non_beta() {
        let corpus = vec![beta(x86("4.14", "4.14.1")), x86("4.14", "4.14.2")];
        let found = VersionMatcher::default()
            .select("4.14", "x86_64", &corpus)
            .unwrap();
        assert_eq!(found.version, "4.14.2");

        // A production build wins even when it is older than the beta.
        let corpus = vec![x86("4.14", "4.14.1"), beta(x86("4.14", "4.14.2"))];
        let found = VersionMatcher::default()
            .select("4.14", "x86_64", &corpus)
            .unwrap();
        assert_eq!(found.version, "4.14.1");
    }

    #[test]
    fn test_minor_prefers_higher_build_among_betas() {
        let corpus = vec![beta(x86("4.14", "4.14.1")), beta(x86("4.14", "4.14.2"))];
        let found = VersionMatcher::default()
            .select("4.14", "x86_64", &corpus)
            .unwrap();
        assert_eq!(found.version, "4.14.2");
    }

    #[test]
    fn test_pre_release_builds_are_beta() {
        let corpus = vec![x86("4.15", "4.15.0-rc.1"), x86("4.15", "4.15.0-ec.3")];
        let found = VersionMatcher::default()
            .select("4.15", "x86_64", &corpus)
            .unwrap();
        assert_eq!(found.version, "4.15.0-rc.1");
    }

    #[test]
    fn test_ignored_minor() {
        let corpus = vec![x86("4.14", "4.14.1"), x86("4.14", "4.14.2")];
        let matcher = VersionMatcher::new(vec!["4.14".to_string()]);

        let err = matcher.select("4.14", "x86_64", &corpus).unwrap_err();
        assert_eq!(err, CatalogError::NoMatchingReleaseImage);

        let err = matcher.select("4.14.2", "x86_64", &corpus).unwrap_err();
        assert!(matches!(err, CatalogError::VersionIgnored { .. }));
    }

    #[test]
    fn test_ignored_build() {
        let corpus = vec![x86("4.14", "4.14.1"), x86("4.14", "4.14.2")];
        let matcher = VersionMatcher::new(vec!["4.14.2".to_string()]);

        let found = matcher.select("4.14", "x86_64", &corpus).unwrap();
        assert_eq!(found.version, "4.14.1");

        let err = matcher.select("4.14.2", "x86_64", &corpus).unwrap_err();
        assert!(matches!(err, CatalogError::VersionIgnored { .. }));
    }

    #[test]
    fn test_ignore_list_strips_multi_suffix() {
        let matcher = VersionMatcher::new(vec!["4.11.0".to_string()]);
        assert!(matcher.is_ignored("4.11.0-multi"));
        assert!(!matcher.is_ignored("4.11.1-multi"));
    }

    #[test]
    fn test_multi_arch_fallback_only_without_exact_record() {
        let multi = image("4.14-multi", "4.14.2-multi", "multi", &["x86_64", "arm64"]);
        let corpus = vec![x86("4.14", "4.14.2"), multi.clone()];
        let matcher = VersionMatcher::default();

        let found = matcher.select("4.14", "arm64", &corpus).unwrap();
        assert_eq!(found.url, multi.url);

        let arm = image("4.14", "4.14.1", "arm64", &["arm64"]);
        let corpus = vec![x86("4.14", "4.14.2"), multi, arm.clone()];
        let found = matcher.select("4.14", "arm64", &corpus).unwrap();
        assert_eq!(found.url, arm.url);
    }

    #[test]
    fn test_multi_arch_exact_version_with_or_without_suffix() {
        let multi = image("4.14-multi", "4.14.2-multi", "multi", &["x86_64", "arm64"]);
        let corpus = vec![multi.clone()];
        let matcher = VersionMatcher::default();

        assert_eq!(matcher.select("4.14.2-multi", "arm64", &corpus).unwrap().url, multi.url);
        assert_eq!(matcher.select("4.14.2", "arm64", &corpus).unwrap().url, multi.url);
        assert_eq!(matcher.select("4.14-multi", "arm64", &corpus).unwrap().url, multi.url);
    }

    #[test]
    fn test_multi_suffix_minor_key_on_single_arch_record() {
        let multi = image("4.12", "4.12.0", "multi", &["x86_64", "arm64", "s390x"]);
        let found = VersionMatcher::default()
            .select("4.12-multi", "s390x", &[multi.clone()])
            .unwrap();
        assert_eq!(found.url, multi.url);
    }

    #[test]
    fn test_aarch64_request_is_folded() {
        let arm = image("4.14", "4.14.1", "arm64", &["arm64"]);
        let found = VersionMatcher::default()
            .select("4.14", "aarch64", &[arm.clone()])
            .unwrap();
        assert_eq!(found.url, arm.url);
    }

    #[test]
    fn test_validate_for_rhcos() {
        let corpus = vec![
            x86("4.14", "4.14.2"),
            image("4.15-multi", "4.15.0-multi", "multi", &["x86_64", "arm64"]),
        ];

        assert!(validate_release_image_for_rhcos("4.14.0", "x86_64", &corpus).is_ok());
        assert!(validate_release_image_for_rhcos("415.92.202402", "", &corpus).is_err());
        assert!(validate_release_image_for_rhcos("4.15", "arm64", &corpus).is_ok());
        assert!(validate_release_image_for_rhcos("4.14", "arm64", &corpus).is_err());
        assert!(validate_release_image_for_rhcos("4.14", "multi", &corpus).is_err());
    }
}
