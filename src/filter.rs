//! Eligibility filtering of publication sightings.
//!
//! A sighting must clear every rule to produce a record: recognized
//! type, numeric year, non-empty title, not on the exclusion list,
//! inside the reporting author's contribution period, and within the
//! dynamically fetched year range. Failures drop the sighting silently;
//! this is a filter, not a validator.

use std::collections::{HashMap, HashSet};

use crate::config::{Author, Config};
use crate::orcid::WorkSighting;
use crate::record::RecordType;

/// Stateless eligibility test built once per pipeline run.
pub struct EligibilityFilter {
    excluded_ids: HashSet<String>,
    dynamic_years: HashSet<i32>,
    roster: HashMap<String, Author>,
}

impl EligibilityFilter {
    pub fn new(config: &Config, dynamic_years: &[i32]) -> Self {
        Self {
            excluded_ids: config
                .excluded_ids
                .iter()
                .map(|id| id.to_uppercase())
                .collect(),
            dynamic_years: dynamic_years.iter().copied().collect(),
            roster: config
                .authors
                .iter()
                .map(|a| (a.orcid.to_uppercase(), a.clone()))
                .collect(),
        }
    }

    /// Test a sighting; `Some(record_type)` iff it qualifies for inclusion.
    pub fn eligible(&self, sighting: &WorkSighting) -> Option<RecordType> {
        let record_type = RecordType::from_registry_tag(&sighting.type_tag)?;

        if sighting.title.is_empty() {
            return None;
        }
        let year: i32 = sighting.year.trim().parse().ok()?;

        if let Some(doi) = &sighting.doi {
            if self.excluded_ids.contains(&doi.to_uppercase()) {
                return None;
            }
        }

        // An author missing from the roster fails closed.
        let author = self.roster.get(&sighting.author_id.to_uppercase())?;
        if !author.active_in(year) {
            return None;
        }

        if !self.dynamic_years.contains(&year) {
            return None;
        }

        Some(record_type)
    }
}
