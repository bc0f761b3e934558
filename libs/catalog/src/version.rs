//! Version strings as reported by release payloads.
//!
//! Release versions are loosely semver shaped: `4.14`, `4.14.2`,
//! `4.14.0-ec.1`, `4.6.0-0.nightly-2020-08-31-220837`, and multi-arch
//! payloads may additionally carry a literal `-multi` suffix. Parsing is
//! lenient (any number of numeric segments, missing ones count as zero) and
//! ordering follows semver precedence for pre-release identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// Suffix used to distinguish a multi-arch minor from its single-arch twin.
pub const MULTI_SUFFIX: &str = "-multi";

/// Shape of a requested version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionFormat {
    /// Not a recognizable version.
    Invalid,
    /// `x`
    Major,
    /// `x.y`
    MajorMinor,
    /// `x.y.z`, optionally followed by `-<pre-release>`
    MajorMinorPatch,
}

/// Strip the `-multi` suffix, if any.
pub fn trim_multi(version: &str) -> &str {
    version.strip_suffix(MULTI_SUFFIX).unwrap_or(version)
}

/// Classify a version string. A trailing `-multi` is ignored.
pub fn version_format(version: &str) -> VersionFormat {
    let version = trim_multi(version);
    let (core, pre) = match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    };

    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let segments: Vec<&str> = core.split('.').collect();
    if !segments.iter().all(|s| numeric(s)) {
        return VersionFormat::Invalid;
    }

    match (segments.len(), pre) {
        (1, None) => VersionFormat::Major,
        (2, None) => VersionFormat::MajorMinor,
        (3, None) => VersionFormat::MajorMinorPatch,
        (3, Some(pre)) if is_identifier_list(pre) => VersionFormat::MajorMinorPatch,
        _ => VersionFormat::Invalid,
    }
}

fn is_identifier_list(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            !part.is_empty() && part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

/// A parsed version.
#[derive(Debug, Clone)]
pub struct Version {
    segments: Vec<u64>,
    pre: Option<String>,
    original: String,
}

impl Version {
    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self, CatalogError> {
        let invalid = || CatalogError::InvalidVersion {
            version: input.to_string(),
        };

        let trimmed = input.trim();
        let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
        // Build metadata does not take part in ordering.
        let body = body.split_once('+').map(|(b, _)| b).unwrap_or(body);

        let (core, pre) = match body.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (body, None),
        };

        let segments = core
            .split('.')
            .map(|s| {
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                s.parse::<u64>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match pre {
            Some(pre) if pre.is_empty() => return Err(invalid()),
            Some(pre) => Some(pre.to_string()),
            None => None,
        };

        Ok(Self {
            segments,
            pre,
            original: input.to_string(),
        })
    }

    /// Numeric segment `idx`, zero when absent.
    pub fn segment(&self, idx: usize) -> u64 {
        self.segments.get(idx).copied().unwrap_or(0)
    }

    pub fn major(&self) -> u64 {
        self.segment(0)
    }

    pub fn minor(&self) -> u64 {
        self.segment(1)
    }

    /// Pre-release identifier (the part after the first `-`).
    pub fn pre_release(&self) -> Option<&str> {
        self.pre.as_deref()
    }

    pub fn is_pre_release(&self) -> bool {
        self.pre.is_some()
    }

    /// `major.minor` rendering, e.g. `4.14`.
    pub fn major_minor(&self) -> String {
        format!("{}.{}", self.major(), self.minor())
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }
}

impl FromStr for Version {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len()).max(3);
        for idx in 0..len {
            match self.segment(idx).cmp(&other.segment(idx)) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }

        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => compare_pre_release(a, b),
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Semver pre-release precedence: numeric identifiers compare numerically and
/// sort before alphanumeric ones; a shorter identifier list sorts first.
fn compare_pre_release(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// `major.minor` of a version string, e.g. `4.14.2-multi` -> `4.14`.
pub fn major_minor(version: &str) -> Result<String, CatalogError> {
    Version::parse(version).map(|v| v.major_minor())
}

/// Whether the version carries a pre-release marker (ignoring `-multi`).
pub fn is_pre_release(version: &str) -> Result<bool, CatalogError> {
    Version::parse(trim_multi(version)).map(|v| v.is_pre_release())
}

/// `a >= b`, both parsed leniently.
pub fn version_greater_or_equal(a: &str, b: &str) -> Result<bool, CatalogError> {
    Ok(Version::parse(a)? >= Version::parse(b)?)
}
