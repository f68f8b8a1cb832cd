//! Version identifiers (MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD])

use super::SemverError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Semantic version
///
/// Equality and ordering ignore build metadata, so two versions that differ
/// only in `+build` compare equal.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Vec<Identifier>,
    pub build: Option<String>,
}

/// A single dot-separated pre-release identifier
///
/// Variant order matters: numeric identifiers always rank below
/// alphanumeric ones, which is exactly what the derived `Ord` gives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identifier {
    Numeric(u64),
    AlphaNumeric(String),
}

impl Version {
    /// Parse a version string
    ///
    /// Exactly three release components are required, each a non-negative
    /// integer without leading zeros. Surrounding whitespace is rejected.
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        if s.is_empty() {
            return Err(SemverError::InvalidVersion(
                "empty version string".to_string(),
            ));
        }

        // Build metadata first: it may itself contain '-'
        let (version_part, build) = match s.split_once('+') {
            Some((v, b)) => {
                if b.is_empty() || !b.split('.').all(is_valid_build_part) {
                    return Err(SemverError::InvalidVersion(format!(
                        "Invalid build metadata in '{}'",
                        s
                    )));
                }
                (v, Some(b.to_string()))
            }
            None => (s, None),
        };

        let (core_version, prerelease) = match version_part.split_once('-') {
            Some((v, p)) => {
                let identifiers = p
                    .split('.')
                    .map(|id| Identifier::parse(id, s))
                    .collect::<Result<Vec<_>, _>>()?;
                (v, identifiers)
            }
            None => (version_part, Vec::new()),
        };

        let parts: Vec<&str> = core_version.split('.').collect();
        if parts.len() != 3 {
            return Err(SemverError::InvalidVersion(format!(
                "Expected MAJOR.MINOR.PATCH, got '{}'",
                s
            )));
        }

        Ok(Version {
            major: parse_component(parts[0], "major", s)?,
            minor: parse_component(parts[1], "minor", s)?,
            patch: parse_component(parts[2], "patch", s)?,
            prerelease,
            build,
        })
    }

    /// Create a new release version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            prerelease: Vec::new(),
            build: None,
        }
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// Bump major version (resets minor and patch to 0)
    ///
    /// `None` when the component is already `u64::MAX`.
    pub fn bump_major(&self) -> Option<Self> {
        Some(Version::new(self.major.checked_add(1)?, 0, 0))
    }

    /// Bump minor version (resets patch to 0)
    pub fn bump_minor(&self) -> Option<Self> {
        Some(Version::new(self.major, self.minor.checked_add(1)?, 0))
    }

    /// Bump patch version
    pub fn bump_patch(&self) -> Option<Self> {
        Some(Version::new(self.major, self.minor, self.patch.checked_add(1)?))
    }
}

impl Identifier {
    fn parse(id: &str, version: &str) -> Result<Self, SemverError> {
        let invalid = || SemverError::InvalidPrerelease {
            version: version.to_string(),
            identifier: id.to_string(),
        };

        if id.is_empty() {
            return Err(invalid());
        }

        if id.bytes().all(|b| b.is_ascii_digit()) {
            if id.len() > 1 && id.starts_with('0') {
                return Err(invalid());
            }
            return id.parse().map(Identifier::Numeric).map_err(|_| invalid());
        }

        if id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            Ok(Identifier::AlphaNumeric(id.to_string()))
        } else {
            Err(invalid())
        }
    }
}

fn parse_component(part: &str, name: &str, version: &str) -> Result<u64, SemverError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SemverError::InvalidVersion(format!(
            "Invalid {} version '{}' in '{}'",
            name, part, version
        )));
    }

    if part.len() > 1 && part.starts_with('0') {
        return Err(SemverError::InvalidVersion(format!(
            "Leading zero in {} version of '{}'",
            name, version
        )));
    }

    part.parse().map_err(|_| {
        SemverError::InvalidVersion(format!("{} version out of range in '{}'", name, version))
    })
}

fn is_valid_build_part(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{}", n),
            Identifier::AlphaNumeric(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for (i, id) in self.prerelease.iter().enumerate() {
            f.write_str(if i == 0 { "-" } else { "." })?;
            write!(f, "{}", id)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
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

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| {
                // A release outranks any of its pre-releases
                match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => self.prerelease.cmp(&other.prerelease),
                }
            })
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 2);
        assert_eq!(v.patch, 3);
        assert!(v.prerelease.is_empty());
        assert!(v.build.is_none());
    }

    #[test]
    fn test_parse_version_with_prerelease() {
        let v = Version::parse("1.2.3-alpha.1").unwrap();
        assert_eq!(
            v.prerelease,
            vec![
                Identifier::AlphaNumeric("alpha".to_string()),
                Identifier::Numeric(1)
            ]
        );
        assert!(v.is_prerelease());
    }

    #[test]
    fn test_parse_version_with_build() {
        let v = Version::parse("1.2.3-rc-1+build.123").unwrap();
        assert_eq!(v.prerelease, vec![Identifier::AlphaNumeric("rc-1".to_string())]);
        assert_eq!(v.build.as_deref(), Some("build.123"));
    }

    #[test]
    fn test_reject_malformed() {
        for bad in [
            "", "1", "1.2", "1.2.3.4", "01.2.3", "1.02.3", "1.2.03", "v1.2.3", "1.2.x",
            "-1.2.3", "1.2.3-", "1.2.3-alpha..1", "1.2.3-01", "1.2.3+", "1.2.3-al_pha",
        ] {
            assert!(Version::parse(bad).is_err(), "expected '{}' to be rejected", bad);
        }
    }

    #[test]
    fn test_zero_components_allowed() {
        assert_eq!(Version::parse("0.0.0").unwrap(), Version::new(0, 0, 0));
        assert_eq!(Version::parse("10.20.30").unwrap(), Version::new(10, 20, 30));
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(1, 0, 0) < Version::new(2, 0, 0));
        assert!(Version::new(1, 2, 0) < Version::new(1, 3, 0));
        assert!(Version::new(1, 2, 3) < Version::new(1, 2, 4));
        assert!(Version::new(1, 9, 0) < Version::new(1, 10, 0));
    }

    #[test]
    fn test_prerelease_precedence() {
        // Ordering chain from the semver precedence rules
        let chain = [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
        ];
        for pair in chain.windows(2) {
            let a = Version::parse(pair[0]).unwrap();
            let b = Version::parse(pair[1]).unwrap();
            assert!(a < b, "{} should be < {}", a, b);
        }
    }

    #[test]
    fn test_build_metadata_ignored() {
        let a = Version::parse("1.0.0+linux").unwrap();
        let b = Version::parse("1.0.0+darwin").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_display_roundtrip() {
        for s in ["1.2.3", "0.0.1-alpha.1", "2.0.0-rc.1+build.5", "1.0.0+exp.sha.5114f85"] {
            assert_eq!(Version::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_bump() {
        let v = Version::parse("1.2.3-beta").unwrap();
        assert_eq!(v.bump_major(), Some(Version::new(2, 0, 0)));
        assert_eq!(v.bump_minor(), Some(Version::new(1, 3, 0)));
        assert_eq!(v.bump_patch(), Some(Version::new(1, 2, 4)));
    }

    #[test]
    fn test_bump_at_max_component() {
        let v = Version::new(u64::MAX, u64::MAX, u64::MAX);
        assert_eq!(v.bump_major(), None);
        assert_eq!(v.bump_minor(), None);
        assert_eq!(v.bump_patch(), None);
        assert_eq!(Version::new(u64::MAX, 0, 0).bump_minor(), Some(Version::new(u64::MAX, 1, 0)));
    }

    #[test]
    fn test_reject_surrounding_whitespace() {
        for bad in [" 1.2.3", "1.2.3 ", "\t1.2.3\n", "1.2.3 +build"] {
            assert!(Version::parse(bad).is_err(), "expected {:?} to be rejected", bad);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let v = Version::parse("1.4.0-beta.2").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1.4.0-beta.2\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<Version>("\"1.4\"").is_err());
    }
}
