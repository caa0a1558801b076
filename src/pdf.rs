//! PDF existence probe.
//!
//! The lab hosts PDFs under predictable names:
//! `<base>/<year>_<initialSurname>_<titleHead>_<titleTail>.pdf`, built
//! from the first author and the first and last words of the title. A
//! reachable resource is the sole signal that a PDF link is offered;
//! probe failures just mean no link.

use std::time::Duration;
use tracing::debug;

use crate::error::{PubsError, Result};
use crate::record::PublicationRecord;

pub struct PdfProber {
    client: reqwest::Client,
    base: String,
}

impl PdfProber {
    pub fn new(base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PubsError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// Probe for a record's PDF; `Some(url)` when the resource is reachable.
    pub async fn probe(&self, record: &PublicationRecord) -> Option<String> {
        let name = probe_filename(&record.year, &record.authors_display, &record.title)?;
        let url = format!("{}/{}", self.base, name);

        let response = self.client.head(&url).send().await.ok()?;
        if response.status().is_success() {
            debug!(url = %url, "PDF found");
            Some(url)
        } else {
            None
        }
    }
}

/// Build the conventional PDF filename for a record.
///
/// Returns `None` when the record lacks the pieces the convention needs
/// (an author string or a title).
pub fn probe_filename(year: &str, authors_display: &str, title: &str) -> Option<String> {
    // "P. Vicente, and A. Bernardino, " -> "PVicente"
    let first_author = authors_display.split(',').next()?;
    let author: String = first_author
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if author.is_empty() {
        return None;
    }

    let mut words = title.split_whitespace().map(sanitize_word);
    let head = words.next().filter(|w| !w.is_empty())?;
    let tail = words.last().filter(|w| !w.is_empty()).unwrap_or_else(|| head.clone());

    Some(format!("{}_{}_{}_{}.pdf", year, author, head, tail))
}

fn sanitize_word(word: &str) -> String {
    word.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_filename() {
        let name = probe_filename("2021", "P. Vicente, and A. Bernardino, ", "Sharing Worlds: Design of Robots");
        assert_eq!(name.as_deref(), Some("2021_PVicente_Sharing_Robots.pdf"));
    }

    #[test]
    fn test_single_word_title_repeats_head() {
        let name = probe_filename("2021", "P. Vicente, ", "Grasping");
        assert_eq!(name.as_deref(), Some("2021_PVicente_Grasping_Grasping.pdf"));
    }

    #[test]
    fn test_missing_authors_no_probe() {
        assert_eq!(probe_filename("2021", "", "A Title"), None);
    }
}
