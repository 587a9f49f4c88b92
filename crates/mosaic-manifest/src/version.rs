use std::cmp::Ordering;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A resource version: dotted numeric segments with an optional pre-release
/// suffix (`1.0`, `2.3.1`, `1.0rc2`, `0.9b1`).
///
/// Ordering is numeric per segment, missing segments count as zero, and a
/// pre-release orders before its release (`1.0a1 < 1.0b1 < 1.0rc1 < 1.0`).
/// Equality and hashing use the literal string, so `1.0` and `1.0.0` are
/// distinct identities that sort next to each other.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    segments: Vec<u64>,
    suffix: Option<Suffix>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Suffix {
    tag: SuffixTag,
    number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SuffixTag {
    Alpha,
    Beta,
    Rc,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid version '{0}'")]
pub struct VersionError(pub String);

impl Version {
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(VersionError(raw.to_string()));
        }
        let (numeric, suffix) = match raw.find(|c: char| c.is_ascii_alphabetic()) {
            Some(idx) => (&raw[..idx], Some(parse_suffix(&raw[idx..], raw)?)),
            None => (raw, None),
        };
        let mut segments = Vec::new();
        for part in numeric.split('.') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError(raw.to_string()));
            }
            segments.push(part.parse().map_err(|_| VersionError(raw.to_string()))?);
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
            suffix,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn parse_suffix(text: &str, raw: &str) -> Result<Suffix, VersionError> {
    let (tag, rest) = if let Some(rest) = text.strip_prefix("rc") {
        (SuffixTag::Rc, rest)
    } else if let Some(rest) = text.strip_prefix('a') {
        (SuffixTag::Alpha, rest)
    } else if let Some(rest) = text.strip_prefix('b') {
        (SuffixTag::Beta, rest)
    } else {
        return Err(VersionError(raw.to_string()));
    };
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError(raw.to_string()));
    }
    let number = rest.parse().map_err(|_| VersionError(raw.to_string()))?;
    Ok(Suffix { tag, number })
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let left = self.segments.get(i).copied().unwrap_or(0);
            let right = other.segments.get(i).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        // A release outranks any of its pre-releases.
        let suffixes = match (&self.suffix, &other.suffix) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        };
        // Literal tie-break keeps the order total and consistent with Eq.
        suffixes.then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> Version {
        Version::parse(raw).expect(raw)
    }

    #[test]
    fn numeric_ordering_is_per_segment() {
        assert!(v("1.9") < v("1.10"));
        assert!(v("2.0") > v("1.99.99"));
        assert!(v("1.0.1") > v("1.0"));
    }

    #[test]
    fn missing_segments_count_as_zero() {
        assert_eq!(v("1.0").cmp(&v("1")), Ordering::Greater); // literal tie-break
        assert!(v("1.0.1") > v("1"));
        assert_ne!(v("1.0"), v("1.0.0"));
    }

    #[test]
    fn prerelease_orders_before_release() {
        assert!(v("1.0a1") < v("1.0b1"));
        assert!(v("1.0b2") < v("1.0rc1"));
        assert!(v("1.0rc9") < v("1.0"));
        assert!(v("1.0") < v("1.0.1a1"));
    }

    #[test]
    fn rejects_malformed_versions() {
        for raw in ["", "1..0", "1.x", "v1.0", "1.0-beta", "1.0rc", "1.0c1"] {
            assert!(Version::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn display_round_trips_the_literal() {
        assert_eq!(v("1.0rc2").to_string(), "1.0rc2");
        assert_eq!(v("1.0rc2").as_str(), "1.0rc2");
    }
}
