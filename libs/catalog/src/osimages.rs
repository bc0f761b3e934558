//! Boot/OS image catalog.

use std::collections::BTreeSet;

use tracing::debug;

use crate::arch;
use crate::error::CatalogError;
use crate::model::OsImage;
use crate::version::{self, Version};

/// A validated, non-empty list of OS images.
#[derive(Debug, Clone)]
pub struct OsImageCatalog {
    images: Vec<OsImage>,
}

impl OsImageCatalog {
    /// Build a catalog. Fails if the list is empty or any record is invalid;
    /// nothing is kept in that case.
    pub fn new(mut images: Vec<OsImage>) -> Result<Self, CatalogError> {
        if images.is_empty() {
            return Err(CatalogError::EmptyOsImages);
        }
        for image in &images {
            image.validate()?;
        }
        for image in &mut images {
            image.cpu_architecture = arch::normalize_cpu_architecture(&image.cpu_architecture);
        }
        Ok(Self { images })
    }

    fn for_arch(&self, arch: &str) -> Vec<&OsImage> {
        self.images
            .iter()
            .filter(|image| arch::normalize_or_default(&image.cpu_architecture) == arch)
            .collect()
    }

    /// OS image for a release version: exact `openshift_version`, then the
    /// `x.y` entry, then the highest entry of that minor.
    pub fn os_image(
        &self,
        version: &str,
        cpu_architecture: &str,
    ) -> Result<&OsImage, CatalogError> {
        let arch = arch::normalize_or_default(cpu_architecture);
        let candidates = self.for_arch(&arch);
        if candidates.is_empty() {
            return Err(CatalogError::OsArchitectureNotAvailable { arch });
        }

        if let Some(image) = candidates.iter().find(|i| i.openshift_version == version).copied() {
            return Ok(image);
        }

        let not_found = || CatalogError::OsImageNotFound {
            version: version.to_string(),
            arch: arch.clone(),
        };
        let minor = version::major_minor(version).map_err(|_| not_found())?;

        if let Some(image) = candidates.iter().find(|i| i.openshift_version == minor).copied() {
            debug!(version, minor = %minor, "Matched OS image by minor version");
            return Ok(image);
        }

        let mut best: Option<(&OsImage, Version)> = None;
        for image in candidates {
            let Ok(candidate) = Version::parse(&image.openshift_version) else {
                continue;
            };
            if candidate.major_minor() != minor {
                continue;
            }
            if best.as_ref().map_or(true, |(_, current)| candidate > *current) {
                best = Some((image, candidate));
            }
        }

        best.map(|(image, _)| image).ok_or_else(not_found)
    }

    /// OS image with the highest `openshift_version` for the architecture.
    pub fn latest_os_image(&self, cpu_architecture: &str) -> Result<&OsImage, CatalogError> {
        let arch = arch::normalize_or_default(cpu_architecture);
        let mut best: Option<(&OsImage, Version)> = None;
        for image in self.for_arch(&arch) {
            let Ok(candidate) = Version::parse(&image.openshift_version) else {
                continue;
            };
            if best.as_ref().map_or(true, |(_, current)| candidate > *current) {
                best = Some((image, candidate));
            }
        }
        best.map(|(image, _)| image)
            .ok_or(CatalogError::NoOsImages { arch })
    }

    /// [`Self::os_image`], or [`Self::latest_os_image`] when no version is
    /// given.
    pub fn os_image_or_latest(
        &self,
        version: &str,
        cpu_architecture: &str,
    ) -> Result<&OsImage, CatalogError> {
        if version.is_empty() {
            self.latest_os_image(cpu_architecture)
        } else {
            self.os_image(version, cpu_architecture)
        }
    }

    /// Architectures with an OS image for `version` (exact or its minor).
    pub fn cpu_architectures(&self, version: &str) -> Vec<String> {
        let minor = version::major_minor(version).ok();
        let archs: BTreeSet<String> = self
            .images
            .iter()
            .filter(|i| {
                i.openshift_version == version
                    || minor.as_deref() == Some(i.openshift_version.as_str())
            })
            .map(|i| arch::normalize_or_default(&i.cpu_architecture))
            .collect();
        archs.into_iter().collect()
    }

    /// Distinct `openshift_version` values, ascending.
    pub fn openshift_versions(&self) -> Vec<String> {
        let mut versions: Vec<&str> = self
            .images
            .iter()
            .map(|i| i.openshift_version.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        versions.sort_by(|a, b| match (Version::parse(a), Version::parse(b)) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => a.cmp(b),
        });
        versions.into_iter().map(str::to_string).collect()
    }
}
