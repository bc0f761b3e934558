//! Error types for release/OS image selection and corpus validation.

use thiserror::Error;

/// Errors produced while validating a corpus or selecting an image from it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The version string could not be parsed.
    #[error("invalid version '{version}'")]
    InvalidVersion { version: String },

    /// The requested version is neither `major.minor` nor `major.minor.patch`.
    #[error(
        "invalid openshiftVersion '{version}'. Expected format: 'major.minor' or 'major.minor.patch', optionally followed by a prerelease identifier"
    )]
    UnsupportedVersionFormat { version: String },

    /// The architecture is not part of the supported vocabulary.
    #[error("unsupported CPU architecture '{arch}'")]
    UnsupportedArchitecture { arch: String },

    /// No record in the corpus carries the architecture at all.
    #[error("The requested CPU architecture ({arch}) isn't specified in release images list")]
    ArchitectureNotAvailable { arch: String },

    /// No record matches the version and architecture.
    #[error(
        "no release image found for openshiftVersion: '{version}' and CPU architecture '{arch}'"
    )]
    ReleaseImageNotFound { version: String, arch: String },

    /// Every candidate for a `major.minor` request is ignored.
    #[error("no matching release image found")]
    NoMatchingReleaseImage,

    /// The matched version is on the ignore list.
    #[error("version '{version}' is ignored")]
    VersionIgnored { version: String },

    /// The OS image list has no entry for the architecture.
    #[error("The requested CPU architecture ({arch}) isn't specified in OS images list")]
    OsArchitectureNotAvailable { arch: String },

    /// No OS image matches the version and architecture.
    #[error(
        "The requested OS image for version ({version}) and CPU architecture ({arch}) isn't specified in OS images list"
    )]
    OsImageNotFound { version: String, arch: String },

    /// No OS image at all for the architecture.
    #[error("No OS images are available for CPU architecture ({arch})")]
    NoOsImages { arch: String },

    /// No release image can back the requested RHCOS version.
    #[error(
        "The requested RHCOS version ({version}, arch: {arch}) does not have a matching OpenShift release image"
    )]
    NoReleaseForRhcos { version: String, arch: String },

    /// A corpus record lacks a required field.
    #[error("Missing value in {kind} for '{field}' field")]
    MissingField { kind: &'static str, field: &'static str },

    /// A corpus record is otherwise malformed.
    #[error("invalid {kind}: {message}")]
    InvalidRecord { kind: &'static str, message: String },

    /// The OS image list is empty.
    #[error("No OS images provided")]
    EmptyOsImages,
}

impl CatalogError {
    /// Returns true when the corpus simply has nothing for the request, as
    /// opposed to the request being malformed or explicitly excluded.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::ArchitectureNotAvailable { .. }
                | CatalogError::ReleaseImageNotFound { .. }
                | CatalogError::NoMatchingReleaseImage
        )
    }

    /// Returns true for errors raised while validating a loaded corpus.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            CatalogError::MissingField { .. }
                | CatalogError::InvalidRecord { .. }
                | CatalogError::EmptyOsImages
        )
    }
}
