//! Pipeline configuration.
//!
//! The author roster, exclusion list, venue allow-list and name
//! corrections are page-maintainer data, loaded from a JSON file.
//! Registry endpoints and retry tuning carry defaults matching the
//! public ORCID API.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;

/// Default registry base URL (ORCID public API).
pub const DEFAULT_REGISTRY_BASE: &str = "https://pub.orcid.org/v2.0";

/// Earliest year the lab listing covers.
pub const DEFAULT_FIRST_YEAR: i32 = 1993;

/// A roster member: registry identifier plus recognized contribution
/// periods. A member may have several disjoint periods.
#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    /// ORCID iD, e.g. "0000-0002-9036-1728"
    pub orcid: String,
    /// Display name (informational only)
    #[serde(default)]
    pub name: String,
    /// Closed [start, end] year intervals; 9999 means "still active"
    pub periods: Vec<(i32, i32)>,
}

impl Author {
    /// Whether `year` falls inside any contribution period.
    /// An author with no matching period fails closed.
    pub fn active_in(&self, year: i32) -> bool {
        self.periods.iter().any(|&(lo, hi)| year >= lo && year <= hi)
    }
}

/// Retry tuning for registry fetches.
///
/// Non-success responses reschedule after `short_delay_ms`; transport
/// failures (suspected rate limiting) wait ten times longer. With
/// `max_attempts` unset a fetch retries indefinitely, matching the
/// "reload the page to retry" failure model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub short_delay_ms: u64,
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            short_delay_ms: 500,
            max_attempts: None,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Registry base URL; defaults to the public ORCID v2.0 API
    pub registry_base: Option<String>,
    /// Base URL for the PDF existence probe; probe disabled when unset
    pub pdf_base: Option<String>,
    /// Roster of authors to query
    pub authors: Vec<Author>,
    /// Identifiers excluded from the listing (case-insensitive)
    pub excluded_ids: Vec<String>,
    /// Venue-name substrings permitted for works lacking a formal identifier
    pub venue_allow_list: Vec<String>,
    /// Contributor name misspellings to correct during formatting
    pub name_corrections: HashMap<String, String>,
    /// Years already covered by a hardcoded listing; never fetched
    pub hardcoded_years: Vec<i32>,
    /// Earliest year of the listing
    pub first_year: Option<i32>,
    pub retry: RetryConfig,
    /// Cap on concurrent registry requests
    pub max_concurrent: Option<usize>,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn registry_base(&self) -> &str {
        self.registry_base.as_deref().unwrap_or(DEFAULT_REGISTRY_BASE)
    }

    pub fn first_year(&self) -> i32 {
        self.first_year.unwrap_or(DEFAULT_FIRST_YEAR)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or(3)
    }

    /// Years to fetch dynamically: every year from the current one down
    /// to `first_year`, minus the hardcoded ones.
    pub fn dynamic_years(&self, current_year: i32) -> Vec<i32> {
        (self.first_year()..=current_year)
            .rev()
            .filter(|y| !self.hardcoded_years.contains(y))
            .collect()
    }
}
