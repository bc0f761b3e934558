//! CPU architecture vocabulary.
//!
//! Release payloads, OS images and image manifests do not agree on how to
//! spell an architecture (`amd64` vs `x86_64`, `aarch64` vs `arm64`). Every
//! architecture entering the catalog is folded to the canonical spelling used
//! by release images before it is compared.

use crate::error::CatalogError;

/// Architecture assumed when none is given.
pub const DEFAULT_CPU_ARCHITECTURE: &str = X86_64;

/// Sentinel primary architecture of a manifest-list (multi-arch) payload.
pub const MULTI_CPU_ARCHITECTURE: &str = "multi";

pub const X86_64: &str = "x86_64";
pub const ARM64: &str = "arm64";
pub const AARCH64: &str = "aarch64";
pub const PPC64LE: &str = "ppc64le";
pub const S390X: &str = "s390x";

/// Spelling used by OCI image configs for x86_64.
pub const AMD64: &str = "amd64";

/// Architectures a release image record may carry.
pub const SUPPORTED_CPU_ARCHITECTURES: &[&str] = &[
    X86_64,
    AARCH64,
    ARM64,
    PPC64LE,
    S390X,
    MULTI_CPU_ARCHITECTURE,
];

/// Fold an architecture alias to its canonical spelling.
///
/// Unknown values are returned untouched so that validation can report them.
pub fn normalize_cpu_architecture(arch: &str) -> String {
    match arch {
        AARCH64 => ARM64.to_string(),
        AMD64 => X86_64.to_string(),
        other => other.to_string(),
    }
}

/// Normalize and default an architecture: empty means [`DEFAULT_CPU_ARCHITECTURE`].
pub fn normalize_or_default(arch: &str) -> String {
    if arch.is_empty() {
        DEFAULT_CPU_ARCHITECTURE.to_string()
    } else {
        normalize_cpu_architecture(arch)
    }
}

/// Map an OCI platform architecture (as reported by image metadata) to the
/// release-image vocabulary. Only `amd64` is renamed.
pub fn from_image_platform(arch: &str) -> String {
    if arch == AMD64 {
        DEFAULT_CPU_ARCHITECTURE.to_string()
    } else {
        arch.to_string()
    }
}

/// Reject architectures outside [`SUPPORTED_CPU_ARCHITECTURES`].
pub fn validate_cpu_architecture(arch: &str) -> Result<(), CatalogError> {
    if SUPPORTED_CPU_ARCHITECTURES.contains(&arch) {
        Ok(())
    } else {
        Err(CatalogError::UnsupportedArchitecture {
            arch: arch.to_string(),
        })
    }
}
