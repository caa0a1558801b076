//! Venue-year skew correction.
//!
//! Some registry entries carry the year the work was registered rather
//! than the venue's actual year: a 2021-registered paper whose venue is
//! "Proceedings of XYZ 2020". When the venue name contains the string
//! form of year − 1, the decremented year is taken as the true one. The
//! match is textual, so an explicit per-record flag guards against a
//! second application.

use tracing::debug;

use crate::resolver::RecordKey;
use crate::store::RecordStore;

/// Apply the year-skew rule to one record, at most once per record.
///
/// On correction the record moves to the decremented year's bucket,
/// every occurrence of the old year inside the citation text is
/// rewritten, and the record's year is decremented. Returns whether a
/// correction was applied.
pub fn correct_year_skew(store: &mut RecordStore, key: &RecordKey, dynamic_years: &[i32]) -> bool {
    let Some(record) = store.get_mut(key) else {
        return false;
    };
    if record.year_corrected || record.venue_name.is_empty() {
        return false;
    }
    let Ok(year) = record.year.parse::<i32>() else {
        return false;
    };
    let lagged = year - 1;
    if !record.venue_name.contains(&lagged.to_string()) {
        return false;
    }

    debug!(key = %record.key, from = year, to = lagged, "correcting venue-year skew");

    record.citation_text = record
        .citation_text
        .replace(&year.to_string(), &lagged.to_string());
    record.year = lagged.to_string();
    record.year_corrected = true;

    store.relocate(key, year, lagged, dynamic_years);
    true
}
