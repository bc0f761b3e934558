//! Release and OS image records.
//!
//! Field names match the JSON accepted in configuration
//! (`openshift_version`, `cpu_architecture`, ...).

use serde::{Deserialize, Serialize};

use crate::arch::{self, MULTI_CPU_ARCHITECTURE};
use crate::error::CatalogError;
use crate::version;

/// Support level of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SupportLevel {
    Production,
    Beta,
    Maintenance,
    EndOfLife,
}

impl SupportLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Beta => "beta",
            Self::Maintenance => "maintenance",
            Self::EndOfLife => "end-of-life",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "production" => Some(Self::Production),
            "beta" => Some(Self::Beta),
            "maintenance" => Some(Self::Maintenance),
            "end-of-life" => Some(Self::EndOfLife),
            _ => None,
        }
    }
}

/// One release payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseImage {
    /// Reported minor (`4.14`) or minor-multi (`4.14-multi`) key, or the exact
    /// build for dynamically discovered payloads.
    #[serde(default)]
    pub openshift_version: String,

    /// Exact build, e.g. `4.14.2` or `4.14.0-ec.1`.
    #[serde(default)]
    pub version: String,

    /// Pull reference. Unique within a corpus.
    #[serde(default)]
    pub url: String,

    /// Primary architecture; `multi` for manifest-list payloads.
    #[serde(default)]
    pub cpu_architecture: String,

    /// Concrete architectures carried by the payload. Empty means the legacy
    /// single-arch form where `cpu_architecture` alone is authoritative.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpu_architectures: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_level: Option<SupportLevel>,

    #[serde(default)]
    pub default: bool,
}

impl ReleaseImage {
    /// Ensure all required fields are set and architectures are known.
    pub fn validate(&self) -> Result<(), CatalogError> {
        const KIND: &str = "ReleaseImage";
        let required = [
            ("cpu_architecture", &self.cpu_architecture),
            ("openshift_version", &self.openshift_version),
            ("url", &self.url),
            ("version", &self.version),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(CatalogError::MissingField { kind: KIND, field });
            }
        }

        arch::validate_cpu_architecture(&self.cpu_architecture)?;
        for arch in &self.cpu_architectures {
            arch::validate_cpu_architecture(arch)?;
        }
        Ok(())
    }

    /// Fold `aarch64` to `arm64` in both architecture fields.
    pub fn normalize_architectures(&mut self) {
        self.cpu_architecture = arch::normalize_cpu_architecture(&self.cpu_architecture);
        for arch in &mut self.cpu_architectures {
            *arch = arch::normalize_cpu_architecture(arch);
        }
    }

    pub fn is_multi_arch(&self) -> bool {
        self.cpu_architecture == MULTI_CPU_ARCHITECTURE
    }

    /// Whether the payload can run on `arch`, via the primary architecture or
    /// the architecture list.
    pub fn supports_architecture(&self, arch: &str) -> bool {
        self.cpu_architecture == arch || self.cpu_architectures.iter().any(|a| a == arch)
    }

    /// Explicit support level, or `beta` for pre-release builds.
    pub fn effective_support_level(&self) -> SupportLevel {
        if let Some(level) = self.support_level {
            return level;
        }
        match version::is_pre_release(&self.version) {
            Ok(true) => SupportLevel::Beta,
            _ => SupportLevel::Production,
        }
    }

    pub fn is_beta(&self) -> bool {
        self.effective_support_level() == SupportLevel::Beta
    }

    /// Registry host of the pull reference, without port.
    pub fn registry_host(&self) -> Result<String, CatalogError> {
        let mut parts = self.url.split('/');
        match (parts.next(), parts.next()) {
            (Some(host), Some(_)) => Ok(extract_host(host).to_string()),
            _ => Err(CatalogError::InvalidRecord {
                kind: "ReleaseImage",
                message: format!("failed to get release image domain from {}", self.url),
            }),
        }
    }
}

fn extract_host(destination: &str) -> &str {
    let is_port = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if let Some(rest) = destination.strip_prefix('[') {
        if let Some((host, port)) = rest.split_once("]:") {
            if is_port(port) && !host.is_empty() {
                return host;
            }
        }
    }

    if let Some((host, port)) = destination.rsplit_once(':') {
        let dotted = host
            .split_once('.')
            .map(|(l, r)| !l.is_empty() && !r.is_empty())
            .unwrap_or(false);
        if is_port(port) && dotted && !host.contains(':') {
            return host;
        }
    }

    destination
}

/// Bootable OS image matched to a release version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsImage {
    #[serde(default)]
    pub openshift_version: String,

    #[serde(default)]
    pub cpu_architecture: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub version: String,
}

impl OsImage {
    /// Ensure the required fields are set. An empty `cpu_architecture` stands
    /// for the default architecture; any other value must be known once
    /// aliases are folded.
    pub fn validate(&self) -> Result<(), CatalogError> {
        const KIND: &str = "OsImage";
        let required = [
            ("openshift_version", &self.openshift_version),
            ("url", &self.url),
            ("version", &self.version),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(CatalogError::MissingField { kind: KIND, field });
            }
        }

        if !self.cpu_architecture.is_empty() {
            arch::validate_cpu_architecture(&arch::normalize_cpu_architecture(
                &self.cpu_architecture,
            ))?;
        }
        Ok(())
    }
}

/// Prepare a configured release-image corpus.
///
/// Records without `cpu_architectures` get `[cpu_architecture]`, aliases are
/// folded, and every record is validated. Either the whole corpus is returned
/// or nothing is.
pub fn prepare_release_images(
    mut images: Vec<ReleaseImage>,
) -> Result<Vec<ReleaseImage>, CatalogError> {
    for image in &mut images {
        image.validate()?;
        if image.cpu_architectures.is_empty() {
            image.cpu_architectures = vec![image.cpu_architecture.clone()];
        }
        image.normalize_architectures();
    }
    Ok(images)
}
