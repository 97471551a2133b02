//! Release version ordering.
//!
//! Remote manifests carry plain `major.minor.patch` strings rather
//! than full semver, so ordering is a straight three-component numeric
//! compare. Malformed input is rejected at parse time; comparison is
//! only ever defined on well-formed triples.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a version string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    /// Fewer than three dot-separated components.
    #[error("version {0:?} has fewer than three components")]
    MissingComponent(String),

    /// A component is not a non-negative integer.
    #[error("version component {0:?} is not a number")]
    NotANumber(String),
}

/// A `major.minor.patch` release version.
///
/// Derived ordering is lexicographic over (major, minor, patch).
/// Components past the third are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionTriple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionTriple {
    /// Creates a version from its three components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for VersionTriple {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut components = s.split('.');
        let mut parsed = [0u64; 3];
        for slot in &mut parsed {
            let component = components
                .next()
                .ok_or_else(|| VersionError::MissingComponent(s.to_string()))?;
            *slot = component
                .parse()
                .map_err(|_| VersionError::NotANumber(component.to_string()))?;
        }
        Ok(Self::new(parsed[0], parsed[1], parsed[2]))
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
