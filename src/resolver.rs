//! Identifier resolution.
//!
//! Every publication sighting is keyed by a durable identifier so that
//! repeated sightings from different author queries collide on the same
//! record. Works with a registered DOI use it verbatim (uppercased);
//! works without one fall back to a synthetic key derived from the
//! normalized year and title, which is a pure function of its inputs.

use serde::Serialize;
use std::fmt;

/// Prefix marking a synthetic key for works lacking a formal identifier.
pub const SYNTHETIC_PREFIX: &str = "NODOI:";

/// Stable lookup key for a publication record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Resolve a sighting to its key: formal identifier when present and
    /// non-empty, synthetic year+title key otherwise.
    pub fn resolve(formal_id: Option<&str>, year: &str, title: &str) -> Self {
        match formal_id {
            Some(id) if !id.trim().is_empty() => Self::from_doi(id),
            _ => Self::synthetic(year, title),
        }
    }

    /// Key from a formal registry identifier. DOIs are case-insensitive,
    /// so the key is the uppercased identifier.
    pub fn from_doi(doi: &str) -> Self {
        RecordKey(doi.trim().to_uppercase())
    }

    /// Deterministic fallback key from year and title.
    ///
    /// Independent sightings of the same untitled-identifier work must
    /// collide, so normalization keeps only alphanumerics, lowercased.
    pub fn synthetic(year: &str, title: &str) -> Self {
        let mut key = String::with_capacity(SYNTHETIC_PREFIX.len() + year.len() + title.len());
        key.push_str(SYNTHETIC_PREFIX);
        for c in year.chars().chain(title.chars()) {
            if c.is_alphanumeric() {
                key.extend(c.to_lowercase());
            }
        }
        RecordKey(key)
    }

    /// Whether this key was synthesized from year+title.
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(SYNTHETIC_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doi_key_uppercased() {
        let key = RecordKey::resolve(Some("10.1007/s11263-021-1"), "2021", "ignored");
        assert_eq!(key.as_str(), "10.1007/S11263-021-1");
        assert!(!key.is_synthetic());
    }

    #[test]
    fn test_empty_doi_falls_back_to_synthetic() {
        let key = RecordKey::resolve(Some("   "), "2022", "A Title");
        assert!(key.is_synthetic());
        assert_eq!(key.as_str(), "NODOI:2022atitle");
    }

    #[test]
    fn test_synthetic_key_normalization() {
        let key = RecordKey::synthetic("2022", "Sharing Worlds: Design of a...");
        assert_eq!(key.as_str(), "NODOI:2022sharingworldsdesignofa");
    }

    #[test]
    fn test_synthetic_key_punctuation_invariant() {
        let a = RecordKey::synthetic("2022", "Sharing Worlds -- Design, of a");
        let b = RecordKey::synthetic("2022", "sharing worlds: design of a!");
        assert_eq!(a, b);
    }
}
