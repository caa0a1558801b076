//! In-memory record store owned by the pipeline.
//!
//! Replaces ambient global maps with one object holding the canonical
//! records, the year buckets handed to the renderer, and the separate
//! staging area for no-identifier works awaiting investigation. All
//! mutation goes through the methods here.

use std::collections::HashMap;

use crate::record::PublicationRecord;
use crate::resolver::RecordKey;

/// Canonical record map plus year index.
///
/// Year buckets keep insertion order, which is fetch-completion order,
/// not chronological order within the year.
#[derive(Default)]
pub struct RecordStore {
    by_id: HashMap<RecordKey, PublicationRecord>,
    by_year: HashMap<i32, Vec<RecordKey>>,
    investigation: HashMap<RecordKey, PublicationRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new canonical record and bucket it under its year.
    /// The key must not already be present.
    pub fn insert(&mut self, record: PublicationRecord) {
        if let Ok(year) = record.year.parse::<i32>() {
            self.by_year.entry(year).or_default().push(record.key.clone());
        }
        self.by_id.insert(record.key.clone(), record);
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.by_id.contains_key(key)
    }

    pub fn get(&self, key: &RecordKey) -> Option<&PublicationRecord> {
        self.by_id.get(key)
    }

    pub fn get_mut(&mut self, key: &RecordKey) -> Option<&mut PublicationRecord> {
        self.by_id.get_mut(key)
    }

    /// Move a record between year buckets after a year correction.
    ///
    /// The old bucket entry is removed; the record only lands in the new
    /// bucket if that year is part of the dynamic range (a pre-existing
    /// hardcoded year keeps ownership of its listing).
    pub fn relocate(&mut self, key: &RecordKey, old_year: i32, new_year: i32, dynamic_years: &[i32]) {
        if let Some(bucket) = self.by_year.get_mut(&old_year) {
            bucket.retain(|k| k != key);
        }
        if dynamic_years.contains(&new_year) {
            self.by_year.entry(new_year).or_default().push(key.clone());
        }
    }

    /// Records bucketed under `year`, in completion order.
    pub fn records_for_year(&self, year: i32) -> Vec<&PublicationRecord> {
        self.by_year
            .get(&year)
            .map(|keys| keys.iter().filter_map(|k| self.by_id.get(k)).collect())
            .unwrap_or_default()
    }

    /// Publication counts per dynamic year, for the output-volume chart.
    pub fn year_counts(&self, dynamic_years: &[i32]) -> HashMap<i32, usize> {
        dynamic_years
            .iter()
            .map(|&y| (y, self.by_year.get(&y).map_or(0, Vec::len)))
            .collect()
    }

    /// All canonical records with lookups still pending.
    pub fn unsettled_keys(&self) -> Vec<RecordKey> {
        self.by_id
            .values()
            .filter(|r| !r.is_settled())
            .map(|r| r.key.clone())
            .collect()
    }

    // --- investigation staging -------------------------------------------

    /// Stage a synthetic-id stub for later investigation. Stubs never
    /// enter the canonical store directly.
    pub fn stage_for_investigation(&mut self, record: PublicationRecord) {
        self.investigation.insert(record.key.clone(), record);
    }

    pub fn investigated(&self, key: &RecordKey) -> Option<&PublicationRecord> {
        self.investigation.get(key)
    }

    pub fn investigated_mut(&mut self, key: &RecordKey) -> Option<&mut PublicationRecord> {
        self.investigation.get_mut(key)
    }

    /// Drop stubs that duplicate an already-canonical record.
    ///
    /// A work found both with and without a formal identifier would
    /// otherwise be listed twice; the canonical record's recomputed
    /// year+title key identifies the duplicate stub.
    pub fn prune_duplicate_stubs(&mut self) -> usize {
        let canonical_synthetic: std::collections::HashSet<RecordKey> = self
            .by_id
            .values()
            .map(|r| RecordKey::synthetic(&r.year, &r.title))
            .collect();
        let before = self.investigation.len();
        self.investigation.retain(|key, _| !canonical_synthetic.contains(key));
        before - self.investigation.len()
    }

    /// Take every staged stub for investigation, leaving the staging
    /// area empty.
    pub fn drain_investigation(&mut self) -> Vec<PublicationRecord> {
        self.investigation.drain().map(|(_, r)| r).collect()
    }

    /// Promote an investigated stub to canonical status.
    ///
    /// If the key is somehow already canonical the longer venue and
    /// author strings win, same as the merge rule.
    pub fn promote(&mut self, record: PublicationRecord) {
        match self.by_id.get_mut(&record.key) {
            Some(existing) => {
                if record.venue_name.len() > existing.venue_name.len() {
                    existing.venue_name = record.venue_name;
                }
                if record.authors_display.len() > existing.authors_display.len() {
                    existing.authors_display = record.authors_display;
                }
            }
            None => self.insert(record),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
