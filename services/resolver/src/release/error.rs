//! Release inspection errors.

use imageset_catalog::CatalogError;
use thiserror::Error;

use crate::exec::ExecError;

/// Errors from querying or extracting a release payload.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("no release image or release image mirror provided")]
    MissingReleaseImage,

    /// The tool ran but exited non-zero.
    #[error("command '{command}' exited with non-zero exit code {exit_code}: {stdout}\n{stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Neither the image metadata nor the raw manifest list could be read.
    #[error("failed to get image info using oc: {primary}, and skopeo: {fallback}")]
    ImageInfo {
        primary: Box<ReleaseError>,
        fallback: Box<ReleaseError>,
    },

    #[error("image manifest does not contain architecture: {image}")]
    NoManifestArchitecture { image: String },

    #[error("failed to parse output for {image}: {source}")]
    Json {
        image: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("field '{field}' missing from image info of {image}")]
    MissingField { image: String, field: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ReleaseError {
    /// Exit code of a failed command, if that is what this error is.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
