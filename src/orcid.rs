//! ORCID public API client.
//!
//! Two fetch kinds share one retry policy: author-level work summaries
//! (`GET <base>/<orcid>/works`) and record-level work detail
//! (`GET <base>/<orcid>/work/<put-code>`). Non-success responses
//! reschedule after a short delay; transport failures (suspected rate
//! limiting) wait ten times longer. A 404 on a record-level fetch is
//! terminal. Both endpoints speak `application/orcid+json`.

use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{PubsError, Result};

/// Media type of the registry's JSON representation.
const ORCID_MEDIA_TYPE: &str = "application/orcid+json";

/// One reported occurrence of a publication in an author's work list.
#[derive(Debug, Clone)]
pub struct WorkSighting {
    /// ORCID iD of the author whose list reported this work
    pub author_id: String,
    /// Opaque per-work reference (put-code) for the record-level fetch
    pub work_handle: String,
    /// Formal identifier, uppercased, when the group carries one
    pub doi: Option<String>,
    pub title: String,
    pub year: String,
    /// Registry type tag, e.g. "JOURNAL_ARTICLE"
    pub type_tag: String,
    pub source_name: String,
}

/// Parsed record-level response.
#[derive(Debug, Clone)]
pub struct WorkDetail {
    pub doi: Option<String>,
    pub title: String,
    /// Raw contributor credit names, in list order
    pub contributors: Vec<String>,
    /// Journal title, or the BibTeX booktitle when the journal field is absent
    pub venue: String,
    pub year: String,
    /// Numeric month field, empty when absent
    pub month: String,
    pub citation_format: String,
    pub citation_text: String,
    pub source_name: String,
}

/// Named backoff policy, carried as data rather than re-derived per call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before retrying a non-success response
    pub short_delay: Duration,
    /// `None` retries indefinitely
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            short_delay: Duration::from_millis(config.short_delay_ms),
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before retrying after a transport failure.
    pub fn long_delay(&self) -> Duration {
        self.short_delay * 10
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt + 1 >= max)
    }
}

/// Registry client with bounded request concurrency.
pub struct OrcidClient {
    client: reqwest::Client,
    base: String,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
    status_tx: Option<mpsc::UnboundedSender<String>>,
}

impl OrcidClient {
    pub fn new(base: &str, retry: RetryPolicy, max_concurrent: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("labpubs/0.1")
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| PubsError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            retry,
            status_tx: None,
        })
    }

    /// Attach a channel receiving one transient status message per fetch
    /// whose first response was a non-success status. The message is sent
    /// on the first occurrence, before any retry, so a call that retries
    /// indefinitely still surfaces.
    pub fn with_status_sender(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    /// Fetch and parse one author's work-summary list.
    ///
    /// Retries per the policy; an `Err` means the call was given up on
    /// and the batch should treat it as handled-but-degraded.
    pub async fn author_works(&self, orcid_id: &str) -> Result<Vec<WorkSighting>> {
        let url = format!("{}/{}/works", self.base, orcid_id);
        let body = self.fetch_with_retry(&url, false).await?;
        parse_works_json(orcid_id, &body)
    }

    /// Fetch and parse one work's full detail.
    ///
    /// A 404 is terminal and reported as [`PubsError::NotFound`].
    pub async fn work_detail(&self, author_id: &str, work_handle: &str) -> Result<WorkDetail> {
        let url = format!("{}/{}/work/{}", self.base, author_id, work_handle);
        let body = self.fetch_with_retry(&url, true).await?;
        parse_detail_json(&body)
    }

    /// Shared fetch loop. `not_found_terminal` is set for record-level
    /// fetches, where a 404 abandons the lookup instead of retrying.
    async fn fetch_with_retry(&self, url: &str, not_found_terminal: bool) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            let _permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|_| PubsError::Config("request semaphore closed".to_string()))?;

            let result = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, ORCID_MEDIA_TYPE)
                .send()
                .await;
            drop(_permit);

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }
                    if not_found_terminal && status == reqwest::StatusCode::NOT_FOUND {
                        return Err(PubsError::NotFound(url.to_string()));
                    }
                    warn!(url = %url, status = status.as_u16(), attempt = attempt + 1, "non-success response");
                    if attempt == 0 {
                        if let Some(tx) = &self.status_tx {
                            let _ = tx.send("Failed to get some data from ORCID.".to_string());
                        }
                    }
                    if self.retry.exhausted(attempt) {
                        return Err(PubsError::Registry {
                            code: status.as_u16(),
                            message: format!("giving up after {} attempts", attempt + 1),
                        });
                    }
                    tokio::time::sleep(self.retry.short_delay).await;
                }
                Err(e) => {
                    // Transport failure: likely the registry throttling
                    // us, so slow down much more before the next try.
                    warn!(url = %url, error = %e, attempt = attempt + 1, "transport failure");
                    if self.retry.exhausted(attempt) {
                        return Err(PubsError::Network(e));
                    }
                    tokio::time::sleep(self.retry.long_delay()).await;
                }
            }
            attempt += 1;
        }
    }
}

// === Registry response types ===

#[derive(Debug, Deserialize)]
struct ValueField {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    group: Vec<WorkGroup>,
}

#[derive(Debug, Deserialize)]
struct WorkGroup {
    #[serde(rename = "external-ids")]
    external_ids: Option<ExternalIds>,
    #[serde(rename = "work-summary", default)]
    work_summary: Vec<WorkSummary>,
}

#[derive(Debug, Deserialize, Default)]
struct ExternalIds {
    #[serde(rename = "external-id", default)]
    external_id: Vec<ExternalId>,
}

#[derive(Debug, Deserialize)]
struct ExternalId {
    #[serde(rename = "external-id-type", default)]
    id_type: String,
    #[serde(rename = "external-id-value", default)]
    id_value: String,
}

#[derive(Debug, Deserialize)]
struct WorkSummary {
    #[serde(rename = "put-code")]
    put_code: Option<u64>,
    source: Option<SourceBlock>,
    #[serde(rename = "type")]
    type_tag: Option<String>,
    title: Option<TitleBlock>,
    #[serde(rename = "publication-date")]
    publication_date: Option<PublicationDate>,
}

#[derive(Debug, Deserialize)]
struct SourceBlock {
    #[serde(rename = "source-name")]
    source_name: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct TitleBlock {
    title: Option<ValueField>,
    subtitle: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct PublicationDate {
    year: Option<ValueField>,
    month: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct WorkResponse {
    title: Option<TitleBlock>,
    #[serde(rename = "journal-title")]
    journal_title: Option<ValueField>,
    #[serde(rename = "publication-date")]
    publication_date: Option<PublicationDate>,
    contributors: Option<Contributors>,
    citation: Option<Citation>,
    source: Option<SourceBlock>,
    #[serde(rename = "external-ids")]
    external_ids: Option<ExternalIds>,
}

#[derive(Debug, Deserialize, Default)]
struct Contributors {
    #[serde(default)]
    contributor: Vec<Contributor>,
}

#[derive(Debug, Deserialize)]
struct Contributor {
    #[serde(rename = "credit-name")]
    credit_name: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct Citation {
    #[serde(rename = "citation-type", default)]
    citation_type: String,
    #[serde(rename = "citation-value", default)]
    citation_value: String,
}

// === Parsing ===

/// Parse an author-level works response into sightings, one per group.
pub fn parse_works_json(author_id: &str, body: &str) -> Result<Vec<WorkSighting>> {
    let response: WorksResponse = serde_json::from_str(body)
        .map_err(|e| PubsError::Parse(format!("works response: {}", e)))?;

    let mut sightings = Vec::new();
    for group in &response.group {
        let Some(summary) = preferred_summary(&group.work_summary) else {
            continue;
        };
        let Some(put_code) = summary.put_code else {
            continue;
        };

        let doi = group
            .external_ids
            .as_ref()
            .and_then(|ids| find_doi(&ids.external_id));

        sightings.push(WorkSighting {
            author_id: author_id.to_string(),
            work_handle: put_code.to_string(),
            doi,
            title: title_string(summary.title.as_ref()),
            year: summary
                .publication_date
                .as_ref()
                .and_then(|d| d.year.as_ref())
                .map(|v| v.value.clone())
                .unwrap_or_default(),
            type_tag: summary.type_tag.clone().unwrap_or_default(),
            source_name: source_name(summary.source.as_ref()),
        });
    }

    debug!(author = author_id, sightings = sightings.len(), "parsed author works");
    Ok(sightings)
}

/// Pick the summary to key a sighting on: the curated source first, the
/// aggregator next, else the last summary in the group (the registry
/// keeps the most recently updated one at the end).
fn preferred_summary(summaries: &[WorkSummary]) -> Option<&WorkSummary> {
    let by_source = |name: &str| {
        summaries
            .iter()
            .rev()
            .find(|s| source_name(s.source.as_ref()) == name)
    };
    by_source(crate::record::CURATED_SOURCE)
        .or_else(|| by_source(crate::record::AGGREGATOR_SOURCE))
        .or_else(|| summaries.last())
}

/// Parse a record-level work response.
pub fn parse_detail_json(body: &str) -> Result<WorkDetail> {
    let response: WorkResponse = serde_json::from_str(body)
        .map_err(|e| PubsError::Parse(format!("work response: {}", e)))?;

    let (citation_format, citation_text) = match &response.citation {
        // BibTeX is the one citation format the pipeline understands.
        Some(c) if c.citation_type == "BIBTEX" => {
            (c.citation_type.clone(), c.citation_value.clone())
        }
        _ => (String::new(), String::new()),
    };

    let venue = match &response.journal_title {
        Some(v) if !v.value.is_empty() => v.value.clone(),
        _ => booktitle_from_bibtex(&citation_text).unwrap_or_default(),
    };

    let (year, month) = response
        .publication_date
        .as_ref()
        .map(|d| {
            (
                d.year.as_ref().map(|v| v.value.clone()).unwrap_or_default(),
                d.month.as_ref().map(|v| v.value.clone()).unwrap_or_default(),
            )
        })
        .unwrap_or_default();

    Ok(WorkDetail {
        doi: response
            .external_ids
            .as_ref()
            .and_then(|ids| find_doi(&ids.external_id)),
        title: title_string(response.title.as_ref()),
        contributors: response
            .contributors
            .unwrap_or_default()
            .contributor
            .iter()
            .filter_map(|c| c.credit_name.as_ref())
            .map(|v| v.value.clone())
            .collect(),
        venue,
        year,
        month,
        citation_format,
        citation_text,
        source_name: source_name(response.source.as_ref()),
    })
}

fn find_doi(ids: &[ExternalId]) -> Option<String> {
    ids.iter()
        .find(|id| id.id_type.eq_ignore_ascii_case("doi") && !id.id_value.is_empty())
        .map(|id| id.id_value.to_uppercase())
}

fn title_string(block: Option<&TitleBlock>) -> String {
    let Some(block) = block else {
        return String::new();
    };
    let mut title = block
        .title
        .as_ref()
        .map(|v| v.value.clone())
        .unwrap_or_default();
    if let Some(subtitle) = &block.subtitle {
        if !subtitle.value.is_empty() {
            title.push_str(". ");
            title.push_str(&subtitle.value);
        }
    }
    title
}

fn source_name(block: Option<&SourceBlock>) -> String {
    block
        .and_then(|s| s.source_name.as_ref())
        .map(|v| v.value.clone())
        .unwrap_or_default()
}

/// Recover the venue from an `inproceedings` BibTeX entry's booktitle
/// field when the registry record has no journal title.
fn booktitle_from_bibtex(citation: &str) -> Option<String> {
    static BOOKTITLE_RE: OnceLock<Regex> = OnceLock::new();

    if !citation.contains("inproceedings") {
        return None;
    }
    let re = BOOKTITLE_RE.get_or_init(|| {
        Regex::new(r#"booktitle\s*=\s*(?:\{([^}]*)\}|"([^"]*)")"#)
            .expect("booktitle pattern compiles")
    });
    let caps = re.captures(citation)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}


#[cfg(test)]
mod tests {
    use super::test_server::{http_response, serve};
    use super::*;

    const WORKS_FIXTURE: &str = r#"{
        "group": [
            {
                "external-ids": {"external-id": [
                    {"external-id-type": "eid", "external-id-value": "2-s2.0-1"},
                    {"external-id-type": "doi", "external-id-value": "10.1109/iros.2021.123"}
                ]},
                "work-summary": [
                    {
                        "put-code": 111,
                        "source": {"source-name": {"value": "Universidade de Lisboa"}},
                        "type": "CONFERENCE_PAPER",
                        "title": {"title": {"value": "Old Title"}},
                        "publication-date": {"year": {"value": "2021"}}
                    },
                    {
                        "put-code": 222,
                        "source": {"source-name": {"value": "Scopus - Elsevier"}},
                        "type": "CONFERENCE_PAPER",
                        "title": {"title": {"value": "A Robot Paper"}},
                        "publication-date": {"year": {"value": "2021"}}
                    }
                ]
            },
            {
                "external-ids": {"external-id": []},
                "work-summary": [
                    {
                        "put-code": 333,
                        "source": {"source-name": {"value": "Universidade de Lisboa"}},
                        "type": "CONFERENCE_PAPER",
                        "title": {"title": {"value": "Workshop Paper"}},
                        "publication-date": {"year": {"value": "2022"}}
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_works_prefers_curated_summary() {
        let sightings =
            parse_works_json("0000-0002-9678-9055", WORKS_FIXTURE).expect("parses");
        assert_eq!(sightings.len(), 2);

        let first = &sightings[0];
        assert_eq!(first.work_handle, "222");
        assert_eq!(first.title, "A Robot Paper");
        assert_eq!(first.doi.as_deref(), Some("10.1109/IROS.2021.123"));
        assert_eq!(first.source_name, "Scopus - Elsevier");
    }

    #[test]
    fn test_parse_works_no_doi_group() {
        let sightings =
            parse_works_json("0000-0002-9678-9055", WORKS_FIXTURE).expect("parses");
        let second = &sightings[1];
        assert_eq!(second.doi, None);
        assert_eq!(second.work_handle, "333");
        assert_eq!(second.year, "2022");
    }

    #[test]
    fn test_parse_detail_with_journal_title() {
        let body = r#"{
            "title": {"title": {"value": "A Robot Paper"}, "subtitle": {"value": "An Extension"}},
            "journal-title": {"value": "IEEE Transactions on Robotics"},
            "publication-date": {"year": {"value": "2021"}, "month": {"value": "06"}},
            "contributors": {"contributor": [
                {"credit-name": {"value": "Vicente, Pedro"}},
                {"credit-name": {"value": "Alexandre Bernardino"}}
            ]},
            "citation": {"citation-type": "BIBTEX", "citation-value": "@article{v21, year={2021}}"},
            "source": {"source-name": {"value": "Scopus - Elsevier"}},
            "external-ids": {"external-id": [
                {"external-id-type": "doi", "external-id-value": "10.1109/tro.2021.9"}
            ]}
        }"#;
        let detail = parse_detail_json(body).expect("parses");
        assert_eq!(detail.title, "A Robot Paper. An Extension");
        assert_eq!(detail.venue, "IEEE Transactions on Robotics");
        assert_eq!(detail.month, "06");
        assert_eq!(detail.doi.as_deref(), Some("10.1109/TRO.2021.9"));
        assert_eq!(detail.contributors.len(), 2);
        assert_eq!(detail.citation_format, "BIBTEX");
    }

    #[test]
    fn test_parse_detail_venue_from_booktitle() {
        let body = r#"{
            "title": {"title": {"value": "Workshop Paper"}},
            "journal-title": null,
            "publication-date": {"year": {"value": "2022"}},
            "contributors": {"contributor": []},
            "citation": {
                "citation-type": "BIBTEX",
                "citation-value": "@inproceedings{w22, booktitle = {Portuguese Conference on Pattern Recognition}, year={2022}}"
            },
            "source": {"source-name": {"value": "Universidade de Lisboa"}},
            "external-ids": {"external-id": []}
        }"#;
        let detail = parse_detail_json(body).expect("parses");
        assert_eq!(detail.venue, "Portuguese Conference on Pattern Recognition");
        assert_eq!(detail.doi, None);
    }

    #[test]
    fn test_booktitle_quoted_form() {
        let cit = r#"@inproceedings{x, booktitle = "RECPAD 2022", year={2022}}"#;
        assert_eq!(booktitle_from_bibtex(cit).as_deref(), Some("RECPAD 2022"));
    }

    #[test]
    fn test_booktitle_requires_inproceedings() {
        let cit = r#"@article{x, booktitle = {Should Not Happen}}"#;
        assert_eq!(booktitle_from_bibtex(cit), None);
    }

    fn quick_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            short_delay: Duration::from_millis(1),
            max_attempts: Some(max_attempts),
        }
    }

    #[tokio::test]
    async fn test_record_level_404_is_terminal() {
        // A second, successful response is queued: reaching it would mean
        // the 404 was retried instead of abandoned.
        let base = serve(vec![
            http_response("404 Not Found", ""),
            http_response("200 OK", r#"{"title": {"title": {"value": "T"}}}"#),
        ])
        .await;
        let client = OrcidClient::new(&base, quick_retry(5), 1).expect("client builds");

        let result = client.work_detail("0000-0002-9678-9055", "123").await;
        assert!(matches!(result, Err(PubsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_non_success_retries_then_succeeds() {
        let base = serve(vec![
            http_response("500 Internal Server Error", ""),
            http_response("200 OK", r#"{"group": []}"#),
        ])
        .await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = OrcidClient::new(&base, quick_retry(5), 1)
            .expect("client builds")
            .with_status_sender(tx);

        let sightings = client
            .author_works("0000-0002-9678-9055")
            .await
            .expect("succeeds on retry");
        assert!(sightings.is_empty());

        // The first non-success surfaced even though the call recovered.
        let status = rx.try_recv().expect("status sent on first occurrence");
        assert_eq!(status, "Failed to get some data from ORCID.");
        assert!(rx.try_recv().is_err(), "one status per call, not per attempt");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let base = serve(vec![
            http_response("500 Internal Server Error", ""),
            http_response("500 Internal Server Error", ""),
        ])
        .await;
        let client = OrcidClient::new(&base, quick_retry(2), 1).expect("client builds");

        let result = client.author_works("0000-0002-9678-9055").await;
        assert!(matches!(result, Err(PubsError::Registry { code: 500, .. })));
    }

    #[test]
    fn test_non_bibtex_citation_ignored() {
        let body = r#"{
            "title": {"title": {"value": "T"}},
            "citation": {"citation-type": "RIS", "citation-value": "TY  - JOUR"},
            "source": {"source-name": {"value": "X"}}
        }"#;
        let detail = parse_detail_json(body).expect("parses");
        assert_eq!(detail.citation_text, "");
        assert_eq!(detail.citation_format, "");
    }
}
