//! Release payload inspection through `oc` and `skopeo`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use imageset_catalog::arch;
use imageset_catalog::version::{self, trim_multi};
use serde::Deserialize;
use tracing::{debug, error, info};

use super::cache::ReleaseImageCache;
use super::command::ToolCommand;
use super::error::ReleaseError;
use super::{installer_binary, ReleaseConfig, MCO_IMAGE_NAME, MUST_GATHER_IMAGE_NAME};
use crate::exec::CommandRunner;

/// Release metadata lookups used by the version handlers.
#[async_trait]
pub trait ReleaseInspector: Send + Sync {
    /// Version reported by the release payload, e.g. `4.14.2`.
    async fn openshift_version(
        &self,
        release_image: &str,
        mirror: Option<&str>,
        pull_secret: &str,
    ) -> Result<String, ReleaseError>;

    /// Architectures the release image runs on. Single-arch images yield one
    /// entry; manifest lists yield every platform they carry.
    async fn release_architectures(
        &self,
        release_image: &str,
        pull_secret: &str,
    ) -> Result<Vec<String>, ReleaseError>;

    /// Must-gather component image of the release.
    async fn must_gather_image(
        &self,
        release_image: &str,
        mirror: Option<&str>,
        pull_secret: &str,
    ) -> Result<String, ReleaseError>;
}

/// Location of an installer binary inside the extraction cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseBinary {
    pub workdir: PathBuf,
    pub binary: &'static str,
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    #[serde(default)]
    config: Option<ImageConfig>,
}

#[derive(Debug, Deserialize)]
struct ImageConfig {
    #[serde(default)]
    architecture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestList {
    manifests: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(default)]
    platform: Platform,
}

#[derive(Debug, Default, Deserialize)]
struct Platform {
    #[serde(default)]
    architecture: String,
}

/// Image to query and whether TLS verification is skipped. A mirror always
/// wins over the release image and is queried insecurely.
fn source<'a>(
    release_image: &'a str,
    mirror: Option<&'a str>,
) -> Result<(&'a str, bool), ReleaseError> {
    match mirror.filter(|m| !m.is_empty()) {
        Some(mirror) => Ok((mirror, true)),
        None if !release_image.is_empty() => Ok((release_image, false)),
        None => Err(ReleaseError::MissingReleaseImage),
    }
}

fn parse_image_info_architecture(image: &str, output: &str) -> Result<String, ReleaseError> {
    let info: ImageInfo = serde_json::from_str(output).map_err(|source| ReleaseError::Json {
        image: image.to_string(),
        source,
    })?;
    info.config
        .and_then(|c| c.architecture)
        .filter(|a| !a.is_empty())
        .map(|a| arch::from_image_platform(&a))
        .ok_or_else(|| ReleaseError::MissingField {
            image: image.to_string(),
            field: "config.architecture",
        })
}

fn parse_manifest_list_architectures(
    image: &str,
    output: &str,
) -> Result<Vec<String>, ReleaseError> {
    let list: ManifestList = serde_json::from_str(output).map_err(|source| ReleaseError::Json {
        image: image.to_string(),
        source,
    })?;

    let mut architectures: Vec<String> = Vec::new();
    for entry in list.manifests {
        if entry.platform.architecture.is_empty() {
            continue;
        }
        let arch = arch::from_image_platform(&entry.platform.architecture);
        if !architectures.contains(&arch) {
            architectures.push(arch);
        }
    }

    if architectures.is_empty() {
        return Err(ReleaseError::NoManifestArchitecture {
            image: image.to_string(),
        });
    }
    Ok(architectures)
}

/// Release inspector backed by the `oc` and `skopeo` command line tools.
pub struct OcRelease {
    runner: Arc<dyn CommandRunner>,
    config: ReleaseConfig,
    cache: ReleaseImageCache,
}

impl OcRelease {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ReleaseConfig) -> Self {
        Self {
            runner,
            config,
            cache: ReleaseImageCache::new(),
        }
    }

    /// Machine-config-operator component image of the release.
    pub async fn mco_image(
        &self,
        release_image: &str,
        mirror: Option<&str>,
        pull_secret: &str,
    ) -> Result<String, ReleaseError> {
        self.image_by_name(MCO_IMAGE_NAME, release_image, mirror, pull_secret)
            .await
    }

    /// `x.y` of the version reported by the release payload.
    pub async fn major_minor_version(
        &self,
        release_image: &str,
        mirror: Option<&str>,
        pull_secret: &str,
    ) -> Result<String, ReleaseError> {
        let version = self
            .openshift_version(release_image, mirror, pull_secret)
            .await?;
        Ok(version::major_minor(trim_multi(&version))?)
    }

    /// Where the installer for `openshift_version` lives once extracted from
    /// `release_image`.
    pub fn release_binary_path(
        &self,
        release_image: &str,
        openshift_version: &str,
    ) -> Result<ReleaseBinary, ReleaseError> {
        let binary = installer_binary(openshift_version, self.config.fips)?;
        let workdir = self.config.cache_dir.join(release_image);
        let path = workdir.join(binary);
        Ok(ReleaseBinary {
            workdir,
            binary,
            path,
        })
    }

    /// Extract the installer binary, from the mirror when one is given.
    /// Returns the path of the extracted binary.
    pub async fn extract(
        &self,
        release_image: &str,
        mirror: Option<&str>,
        pull_secret: &str,
        openshift_version: &str,
    ) -> Result<PathBuf, ReleaseError> {
        let (image, insecure) = source(release_image, mirror)?;
        // The ICSP file only applies when pulling through a mirror.
        let icsp_file = if insecure {
            self.config.icsp_file.as_deref()
        } else {
            None
        };

        self.extract_from_release(image, pull_secret, insecure, icsp_file, openshift_version)
            .await
            .inspect_err(|e| {
                error!(
                    release_image = %image,
                    error = %e,
                    "Failed to extract installer from release image"
                );
            })
    }

    async fn extract_from_release(
        &self,
        release_image: &str,
        pull_secret: &str,
        insecure: bool,
        icsp_file: Option<&Path>,
        openshift_version: &str,
    ) -> Result<PathBuf, ReleaseError> {
        let target = self.release_binary_path(release_image, openshift_version)?;
        info!(
            binary = target.binary,
            workdir = %target.workdir.display(),
            "Extracting installer binary"
        );
        tokio::fs::create_dir_all(&target.workdir).await?;

        let command = ToolCommand::release_extract(
            target.binary,
            &target.workdir,
            insecure,
            icsp_file,
            release_image,
        );
        self.config
            .retry
            .run(|| self.execute(&command, pull_secret, None))
            .await?;

        info!(path = %target.path.display(), "Extracted installer binary");
        Ok(target.path)
    }

    /// Extract `/database/index.db` from an operator index image. Returns the
    /// path of the extracted database.
    pub async fn extract_database_index(
        &self,
        index_image: &str,
        pull_secret: &str,
    ) -> Result<PathBuf, ReleaseError> {
        if index_image.is_empty() {
            return Err(ReleaseError::MissingReleaseImage);
        }
        let workdir = self.config.cache_dir.join(index_image);
        tokio::fs::create_dir_all(&workdir).await?;

        let command = ToolCommand::database_index_extract(&workdir, index_image);
        info!(index_image = %index_image, "Extracting database index");
        self.config
            .retry
            .run(|| self.execute(&command, pull_secret, None))
            .await?;

        Ok(workdir.join("index.db"))
    }

    async fn image_by_name(
        &self,
        image_name: &str,
        release_image: &str,
        mirror: Option<&str>,
        pull_secret: &str,
    ) -> Result<String, ReleaseError> {
        let (image, insecure) = source(release_image, mirror)?;
        self.image_from_release(image_name, image, pull_secret, insecure)
            .await
            .inspect_err(|e| {
                error!(
                    image_name,
                    release_image = %image,
                    error = %e,
                    "Failed to get component image from release image"
                );
            })
    }

    async fn image_from_release(
        &self,
        image_name: &str,
        release_image: &str,
        pull_secret: &str,
        insecure: bool,
    ) -> Result<String, ReleaseError> {
        self.cache
            .get_or_resolve(image_name, release_image, || async {
                let command = ToolCommand::image_for(image_name, insecure, release_image);
                info!(command = %command, "Fetching image from release");
                self.execute(&command, pull_secret, Some(self.config.command_timeout))
                    .await
            })
            .await
    }

    /// Run a command with the pull secret written to a private temporary
    /// file for the duration of the call.
    async fn execute(
        &self,
        command: &ToolCommand,
        pull_secret: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ReleaseError> {
        let mut secret = self.runner.temp_file(None, "registry-config")?;
        secret.write_all(pull_secret.as_bytes())?;
        secret.flush()?;

        let args = command.args_with_auth(secret.path());
        let output = self
            .runner
            .execute(command.program(), &args, timeout)
            .await?;

        if output.success() {
            return Ok(output.stdout.trim_end().to_string());
        }

        let err = ReleaseError::CommandFailed {
            command: format!("{} {}", command.program(), args.join(" ")),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        };
        error!(error = %err, "Release command failed");
        Err(err)
    }
}

#[async_trait]
impl ReleaseInspector for OcRelease {
    async fn openshift_version(
        &self,
        release_image: &str,
        mirror: Option<&str>,
        pull_secret: &str,
    ) -> Result<String, ReleaseError> {
        let (image, insecure) = source(release_image, mirror)?;
        let command = ToolCommand::release_version(insecure, image);
        let version = self
            .execute(&command, pull_secret, Some(self.config.command_timeout))
            .await
            .inspect_err(|e| {
                error!(release_image = %image, error = %e, "Failed to get release version");
            })?;
        // Older oc releases echo the template quotes.
        Ok(version.trim_matches('\'').to_string())
    }

    async fn release_architectures(
        &self,
        release_image: &str,
        pull_secret: &str,
    ) -> Result<Vec<String>, ReleaseError> {
        if release_image.is_empty() {
            return Err(ReleaseError::MissingReleaseImage);
        }
        let timeout = Some(self.config.command_timeout);

        let primary = match self
            .execute(&ToolCommand::image_info(release_image), pull_secret, timeout)
            .await
        {
            Ok(output) => match parse_image_info_architecture(release_image, &output) {
                Ok(arch) => return Ok(vec![arch]),
                Err(e) => e,
            },
            Err(e) => e,
        };

        // A manifest list has no single image config.
        debug!(
            release_image = %release_image,
            error = %primary,
            "Falling back to the raw manifest list"
        );
        let fallback = match self
            .execute(&ToolCommand::manifest_list(release_image), pull_secret, timeout)
            .await
        {
            Ok(output) => parse_manifest_list_architectures(release_image, &output),
            Err(e) => Err(e),
        };

        match fallback {
            Ok(architectures) => Ok(architectures),
            Err(e @ ReleaseError::NoManifestArchitecture { .. }) => Err(e),
            Err(e) => Err(ReleaseError::ImageInfo {
                primary: Box::new(primary),
                fallback: Box::new(e),
            }),
        }
    }

    async fn must_gather_image(
        &self,
        release_image: &str,
        mirror: Option<&str>,
        pull_secret: &str,
    ) -> Result<String, ReleaseError> {
        self.image_by_name(MUST_GATHER_IMAGE_NAME, release_image, mirror, pull_secret)
            .await
    }
}
