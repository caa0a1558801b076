//! Canonical publication records and field-merge rules.
//!
//! A [`PublicationRecord`] is built up from repeated sightings of the same
//! logical work across author queries and registry sources. Merging is
//! commutative under the "non-empty / longer wins" rules so the final
//! record does not depend on the order enrichment responses arrive in.

use serde::Serialize;
use std::collections::HashMap;

use crate::orcid::WorkDetail;
use crate::resolver::RecordKey;

/// Month names indexed by month number - 1.
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Convert a numeric month field ("1".."12") into its name.
///
/// Returns `None` for non-numeric or out-of-range input.
pub fn month_name(numeric: &str) -> Option<&'static str> {
    let n: usize = numeric.trim().parse().ok()?;
    MONTH_NAMES.get(n.checked_sub(1)?).copied()
}

/// Accepted publication types, as tagged by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordType {
    JournalArticle,
    ConferencePaper,
    ConferencePoster,
    BookChapter,
    Book,
    ConferenceAbstract,
    EditedBook,
    JournalIssue,
    Report,
}

impl RecordType {
    /// Parse a registry type tag. Unrecognized tags are ineligible and
    /// yield `None`.
    pub fn from_registry_tag(tag: &str) -> Option<Self> {
        match tag {
            "JOURNAL_ARTICLE" => Some(Self::JournalArticle),
            "CONFERENCE_PAPER" => Some(Self::ConferencePaper),
            "CONFERENCE_POSTER" => Some(Self::ConferencePoster),
            "BOOK_CHAPTER" => Some(Self::BookChapter),
            "BOOK" => Some(Self::Book),
            "CONFERENCE_ABSTRACT" => Some(Self::ConferenceAbstract),
            "EDITED_BOOK" => Some(Self::EditedBook),
            "JOURNAL_ISSUE" => Some(Self::JournalIssue),
            "REPORT" => Some(Self::Report),
            _ => None,
        }
    }
}

/// Trust tier of the registry source that produced a response.
///
/// Ordering matters: `Curated > Aggregator > SelfAsserted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SourceQuality {
    SelfAsserted,
    Aggregator,
    Curated,
}

/// Source name of the curated bibliographic database tier.
pub const CURATED_SOURCE: &str = "Scopus - Elsevier";

/// Source name of the citation aggregator tier.
pub const AGGREGATOR_SOURCE: &str = "Crossref";

impl SourceQuality {
    pub fn from_source_name(name: &str) -> Self {
        match name {
            CURATED_SOURCE => Self::Curated,
            AGGREGATOR_SOURCE => Self::Aggregator,
            _ => Self::SelfAsserted,
        }
    }
}

/// A pending record-level lookup: (author id, work handle).
pub type PendingLookup = (String, String);

/// The canonical publication entity, keyed by [`RecordKey`].
#[derive(Debug, Clone, Serialize)]
pub struct PublicationRecord {
    pub key: RecordKey,
    pub title: String,
    /// Formatted contributor string; empty until a record-level response
    /// supplies contributors. Longest known string wins.
    pub authors_display: String,
    pub venue_name: String,
    /// Four-digit year. Mutable exactly once, by the venue-year corrector.
    pub year: String,
    pub month: String,
    pub record_type: RecordType,
    pub source_quality: SourceQuality,
    pub source_name: String,
    pub citation_format: String,
    pub citation_text: String,
    /// Guard against double venue-year correction. The textual match
    /// alone is not a safe guard once the year has been rewritten.
    pub year_corrected: bool,
    /// Record-level lookups still to be fetched for this record.
    #[serde(skip)]
    pub pending_lookups: Vec<PendingLookup>,
    /// Set by the PDF probe when a reachable PDF exists for this record.
    pub pdf_url: Option<String>,
}

impl PublicationRecord {
    pub fn new(key: RecordKey, title: String, year: String, record_type: RecordType) -> Self {
        Self {
            key,
            title,
            authors_display: String::new(),
            venue_name: String::new(),
            year,
            month: String::new(),
            record_type,
            source_quality: SourceQuality::SelfAsserted,
            source_name: String::new(),
            citation_format: String::new(),
            citation_text: String::new(),
            year_corrected: false,
            pending_lookups: Vec::new(),
            pdf_url: None,
        }
    }

    /// "Complete enough to stop querying": all five completeness fields
    /// populated and the latest response came from the top-trust tier.
    pub fn is_complete(&self) -> bool {
        !self.title.is_empty()
            && !self.authors_display.is_empty()
            && !self.venue_name.is_empty()
            && !self.year.is_empty()
            && !self.month.is_empty()
            && self.source_quality == SourceQuality::Curated
    }

    /// A record with no outstanding lookups is settled and excluded from
    /// further fetch scheduling.
    pub fn is_settled(&self) -> bool {
        self.pending_lookups.is_empty()
    }

    /// Fold a record-level enrichment response into this record.
    ///
    /// Field rules: title/venue/month fill only when currently empty,
    /// authors replace only when strictly longer, citation sets whenever
    /// present, source tag is last-write. The year is never touched here.
    pub fn apply_detail(&mut self, detail: &WorkDetail, corrections: &HashMap<String, String>) {
        if self.title.is_empty() && !detail.title.is_empty() {
            self.title = detail.title.clone();
        }

        let authors = format_authors(&detail.contributors, corrections);
        if authors.len() > self.authors_display.len() {
            self.authors_display = authors;
        }

        if self.venue_name.is_empty() && !detail.venue.is_empty() {
            self.venue_name = detail.venue.clone();
        }

        if self.month.is_empty() {
            if let Some(name) = month_name(&detail.month) {
                self.month = name.to_string();
            }
        }

        if !detail.citation_text.is_empty() {
            self.citation_format = detail.citation_format.clone();
            self.citation_text = detail.citation_text.clone();
        }

        if !detail.source_name.is_empty() {
            self.source_name = detail.source_name.clone();
            self.source_quality = SourceQuality::from_source_name(&detail.source_name);
        }
    }
}

/// Build the display string from raw contributor credit names.
///
/// Each contributor renders as "F. Surname, " with ", and " joining
/// before the last one. Raw names come in two shapes: "Surname, First"
/// and "First Middle Surname". Known misspellings are corrected first.
pub fn format_authors(raw_names: &[String], corrections: &HashMap<String, String>) -> String {
    // Unparseable credit names are skipped, so the joiner position must
    // come from the parsed list, not the raw one.
    let parsed: Vec<(String, &str)> = raw_names
        .iter()
        .map(|raw| corrections.get(raw.as_str()).unwrap_or(raw))
        .filter_map(|name| split_credit_name(name))
        .collect();

    let mut out = String::new();
    let total = parsed.len();
    for (i, (initial, surname)) in parsed.iter().enumerate() {
        out.push_str(initial);
        out.push_str(". ");
        out.push_str(surname);
        if total >= 2 && i == total - 2 {
            out.push_str(", and ");
        } else {
            out.push_str(", ");
        }
    }

    out
}

/// Extract (first initial, surname) from a raw credit name.
fn split_credit_name(name: &str) -> Option<(String, &str)> {
    if let Some((surname, first)) = name.split_once(", ") {
        let initial = first.chars().next()?;
        Some((initial.to_string(), surname))
    } else {
        let mut parts = name.split_whitespace();
        let first = parts.next()?;
        let surname = parts.last().unwrap_or(first);
        let initial = first.chars().next()?;
        Some((initial.to_string(), surname))
    }
}
