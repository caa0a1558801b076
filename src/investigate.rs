//! Investigation of works lacking a formal identifier.
//!
//! Sightings without a DOI are staged under a synthetic key rather than
//! entering the canonical store. After duplicates of already-canonical
//! records are pruned, each surviving stub is re-fetched in full and
//! admitted only if its venue passes the allow-list test; everything
//! else is dropped permanently, never retried.

use std::collections::HashMap;
use tracing::debug;

use crate::orcid::WorkDetail;
use crate::record::PublicationRecord;
use crate::resolver::RecordKey;

/// Configured set of venue-name substrings permitted for no-identifier
/// works. A venue passes when it contains at least one entry
/// (case-insensitive).
pub struct AllowList {
    entries: Vec<String>,
}

impl AllowList {
    pub fn new(entries: &[String]) -> Self {
        Self {
            entries: entries.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    pub fn permits(&self, venue: &str) -> bool {
        if venue.is_empty() {
            return false;
        }
        let venue = venue.to_lowercase();
        self.entries.iter().any(|entry| venue.contains(entry))
    }
}

/// Result of investigating one synthetic-id stub.
pub enum InvestigationOutcome {
    /// Venue passed the allow-list; the record may enter the canonical store.
    Promoted(PublicationRecord),
    /// Venue not permitted; the work is dropped for good.
    Dropped(RecordKey),
}

/// Fold the fetched detail responses into a stub and decide its fate.
pub fn resolve_stub(
    mut stub: PublicationRecord,
    details: &[WorkDetail],
    allow_list: &AllowList,
    corrections: &HashMap<String, String>,
) -> InvestigationOutcome {
    for detail in details {
        stub.apply_detail(detail, corrections);
    }
    stub.pending_lookups.clear();

    if allow_list.permits(&stub.venue_name) {
        debug!(key = %stub.key, venue = %stub.venue_name, "promoting investigated work");
        InvestigationOutcome::Promoted(stub)
    } else {
        debug!(key = %stub.key, venue = %stub.venue_name, "venue not on allow-list, dropping");
        InvestigationOutcome::Dropped(stub.key)
    }
}
