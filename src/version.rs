//! Blender version numbers
//!
//! Blender releases are identified by two or three dot-separated numbers
//! ("4.2", "4.2.1"). Download artifacts always use the three-component form,
//! so a two-component version is padded with `.0` before building file names.
//!
//! # Examples
//!
//! ```
//! use blenders::BlenderVersion;
//!
//! let version: BlenderVersion = "4.2".parse().unwrap();
//! assert_eq!(version.normalized(), "4.2.0");
//!
//! let newer: BlenderVersion = "4.10.0".parse().unwrap();
//! assert!(newer > "4.9.0".parse().unwrap());
//! ```

use crate::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed Blender version
///
/// Ordering compares components as integers, so `3.10.0` sorts above `3.9.0`.
/// The original text is kept because it is the key used in the config file.
#[derive(Debug, Clone)]
pub struct BlenderVersion {
    raw: String,
    components: Vec<u64>,
}

impl BlenderVersion {
    pub fn parse(version: &str) -> Result<Self> {
        let trimmed = version.trim();
        let components = trimmed
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidVersion(version.to_string()))?;

        if !(2..=3).contains(&components.len()) {
            return Err(Error::InvalidVersion(version.to_string()));
        }

        Ok(Self {
            raw: trimmed.to_string(),
            components,
        })
    }

    /// The version exactly as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Three-component form used in artifact names ("4.2" -> "4.2.0")
    pub fn normalized(&self) -> String {
        normalize_version(&self.raw)
    }
}

/// Pad a two-component version with `.0`; anything else is returned unchanged
pub fn normalize_version(version: &str) -> String {
    if version.split('.').count() == 2 {
        format!("{}.0", version)
    } else {
        version.to_string()
    }
}

impl FromStr for BlenderVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BlenderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for BlenderVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BlenderVersion {}

impl PartialOrd for BlenderVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlenderVersion {
    // "4.2" and "4.2.0" are distinct catalog keys, so the shorter one sorts first
    // instead of comparing equal.
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_two_components() {
        assert_eq!(normalize_version("4.2"), "4.2.0");
        assert_eq!(normalize_version("3.10"), "3.10.0");
    }

    #[test]
    fn test_normalize_three_components_unchanged() {
        assert_eq!(normalize_version("4.2.1"), "4.2.1");
        assert_eq!(normalize_version("4.2.0"), "4.2.0");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(BlenderVersion::parse("4").is_err());
        assert!(BlenderVersion::parse("4.2.1.3").is_err());
        assert!(BlenderVersion::parse("4.x").is_err());
        assert!(BlenderVersion::parse("").is_err());
        assert!(BlenderVersion::parse("-1.2").is_err());
    }

    #[test]
    fn test_integer_ordering() {
        let a: BlenderVersion = "3.10.0".parse().unwrap();
        let b: BlenderVersion = "3.9.0".parse().unwrap();
        assert!(a > b, "3.10.0 should sort above 3.9.0");

        let c: BlenderVersion = "4.0.0".parse().unwrap();
        assert!(c > a);
    }

    #[test]
    fn test_short_and_padded_are_distinct() {
        let short: BlenderVersion = "4.2".parse().unwrap();
        let padded: BlenderVersion = "4.2.0".parse().unwrap();
        assert_ne!(short, padded);
        assert!(short < padded);
        assert_eq!(short.normalized(), padded.as_str());
    }
}
