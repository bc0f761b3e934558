//! Release payload inspection and extraction.
//!
//! This module provides:
//! - Argument vectors for the external image tools (`command`)
//! - A per-key cache for component image lookups (`cache`)
//! - Fixed-attempt retry for extraction (`retry`)
//! - The inspector that ties them together (`inspector`)

mod cache;
mod command;
mod error;
mod inspector;
mod retry;

pub use cache::ReleaseImageCache;
pub use command::{AuthFlag, ToolCommand};
pub use error::ReleaseError;
pub use inspector::{OcRelease, ReleaseBinary, ReleaseInspector};
pub use retry::RetryPolicy;

use std::path::PathBuf;
use std::time::Duration;

use imageset_catalog::version::{self, trim_multi};
use imageset_catalog::CatalogError;

pub const MCO_IMAGE_NAME: &str = "machine-config-operator";
pub const MUST_GATHER_IMAGE_NAME: &str = "must-gather";

/// Installer binary for releases starting at [`OPENSHIFT_INSTALL_MIN_VERSION`].
pub const OPENSHIFT_INSTALL: &str = "openshift-install";
/// Installer binary for older releases and for FIPS installs.
pub const OPENSHIFT_BAREMETAL_INSTALL: &str = "openshift-baremetal-install";
pub const OPENSHIFT_INSTALL_MIN_VERSION: &str = "4.16.0-0.alpha";

/// Release inspection settings.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// Root of the extraction cache.
    pub cache_dir: PathBuf,

    /// Retry policy for extraction commands.
    pub retry: RetryPolicy,

    /// Timeout for one-off introspection commands. Extraction has none.
    pub command_timeout: Duration,

    /// ICSP file passed to extraction from a mirror.
    pub icsp_file: Option<PathBuf>,

    /// Install in FIPS mode.
    pub fips: bool,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/var/cache/imageset"),
            retry: RetryPolicy::default(),
            command_timeout: Duration::from_secs(120),
            icsp_file: None,
            fips: false,
        }
    }
}

impl ReleaseConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_dir = std::env::var("RELEASE_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let max_tries = std::env::var("RELEASE_EXTRACT_MAX_TRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.retry.max_tries);

        let delay = std::env::var("RELEASE_EXTRACT_RETRY_DELAY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.retry.delay);

        let command_timeout = std::env::var("RELEASE_COMMAND_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.command_timeout);

        let icsp_file = std::env::var("RELEASE_ICSP_FILE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let fips = std::env::var("INSTALLER_FIPS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);

        Self {
            cache_dir,
            retry: RetryPolicy { max_tries, delay },
            command_timeout,
            icsp_file,
            fips,
        }
    }
}

/// Pick the installer binary for a release version. FIPS installs always
/// use the baremetal installer.
pub fn installer_binary(openshift_version: &str, fips: bool) -> Result<&'static str, CatalogError> {
    if fips {
        return Ok(OPENSHIFT_BAREMETAL_INSTALL);
    }
    if version::version_greater_or_equal(
        trim_multi(openshift_version),
        OPENSHIFT_INSTALL_MIN_VERSION,
    )? {
        Ok(OPENSHIFT_INSTALL)
    } else {
        Ok(OPENSHIFT_BAREMETAL_INSTALL)
    }
}
