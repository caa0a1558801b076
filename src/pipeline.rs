//! Pipeline orchestration.
//!
//! Sequencing: author-level queries fill the store with sightings, the
//! eligibility filter and identifier resolver deciding what lands where;
//! record-level lookups then enrich every unsettled record; synthetic-id
//! stubs go through the investigation queue; the venue-year corrector
//! runs after each enrichment response. A [`PendingBatch`] gates each
//! phase so the year index is only handed over once all in-flight work
//! has settled.
//!
//! Fetch tasks never touch the store: they send parsed responses over a
//! channel and the pipeline task applies them one at a time, so no two
//! mutations ever interleave.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::corrector::correct_year_skew;
use crate::error::{PubsError, Result};
use crate::filter::EligibilityFilter;
use crate::investigate::{resolve_stub, AllowList, InvestigationOutcome};
use crate::latch::PendingBatch;
use crate::orcid::{OrcidClient, RetryPolicy, WorkDetail, WorkSighting};
use crate::pdf::PdfProber;
use crate::record::PublicationRecord;
use crate::render::YearIndex;
use crate::resolver::RecordKey;
use crate::store::RecordStore;

/// Final pipeline result: the year-bucketed records plus the status
/// messages accumulated from degraded fetches, for the renderer's
/// status line.
pub struct PipelineOutput {
    pub index: YearIndex,
    pub statuses: Vec<String>,
}

pub struct Pipeline {
    config: Config,
    client: Arc<OrcidClient>,
    store: RecordStore,
    filter: EligibilityFilter,
    allow_list: AllowList,
    dynamic_years: Vec<i32>,
    statuses: Vec<String>,
    status_rx: mpsc::UnboundedReceiver<String>,
}

impl Pipeline {
    pub fn new(config: Config, current_year: i32) -> Result<Self> {
        let dynamic_years = config.dynamic_years(current_year);
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let client = OrcidClient::new(
            config.registry_base(),
            RetryPolicy::from_config(&config.retry),
            config.max_concurrent(),
        )?
        .with_status_sender(status_tx);
        Ok(Self {
            filter: EligibilityFilter::new(&config, &dynamic_years),
            allow_list: AllowList::new(&config.venue_allow_list),
            client: Arc::new(client),
            store: RecordStore::new(),
            dynamic_years,
            config,
            statuses: Vec::new(),
            status_rx,
        })
    }

    /// Run the full pipeline: author queries, canonical enrichment,
    /// investigation, optional PDF probing, year index construction.
    pub async fn run(mut self) -> Result<PipelineOutput> {
        self.fetch_author_batch().await?;
        info!(records = self.store.len(), "author-level phase settled");

        self.enrich_canonical_records().await?;
        self.investigate_stubs().await?;
        self.probe_pdfs().await?;
        self.drain_client_statuses();

        let index = YearIndex::build(&self.store, &self.dynamic_years);
        Ok(PipelineOutput {
            index,
            statuses: self.statuses,
        })
    }

    // --- author-level batch ----------------------------------------------

    async fn fetch_author_batch(&mut self) -> Result<()> {
        let batch = PendingBatch::new(self.config.authors.len());
        let (tx, mut rx) = mpsc::unbounded_channel();

        for author in &self.config.authors {
            let client = Arc::clone(&self.client);
            let orcid = author.orcid.clone();
            let tx = tx.clone();
            let batch = batch.clone();
            tokio::spawn(async move {
                let result = client.author_works(&orcid).await;
                let _ = tx.send((orcid, result));
                batch.arrive();
            });
        }
        drop(tx);

        while let Some((orcid, result)) = rx.recv().await {
            match result {
                Ok(sightings) => self.absorb_sightings(sightings),
                Err(e) => {
                    warn!(author = %orcid, error = %e, "author query degraded");
                    self.statuses
                        .push(format!("Problem loading references for {}: {}", orcid, e));
                }
            }
        }
        batch.settled().await;
        Ok(())
    }

    /// Route each eligible sighting to the canonical store or the
    /// investigation staging area, and note the record-level lookup it
    /// contributes unless the record is already complete.
    fn absorb_sightings(&mut self, sightings: Vec<WorkSighting>) {
        for sighting in sightings {
            let Some(record_type) = self.filter.eligible(&sighting) else {
                continue;
            };
            let key =
                RecordKey::resolve(sighting.doi.as_deref(), &sighting.year, &sighting.title);
            let lookup = (sighting.author_id.clone(), sighting.work_handle.clone());

            if key.is_synthetic() {
                match self.store.investigated_mut(&key) {
                    Some(stub) => stub.pending_lookups.push(lookup),
                    None => {
                        let mut stub = PublicationRecord::new(
                            key,
                            sighting.title,
                            sighting.year,
                            record_type,
                        );
                        stub.pending_lookups.push(lookup);
                        self.store.stage_for_investigation(stub);
                    }
                }
                continue;
            }

            if !self.store.contains(&key) {
                self.store.insert(PublicationRecord::new(
                    key.clone(),
                    sighting.title,
                    sighting.year,
                    record_type,
                ));
            }
            if let Some(record) = self.store.get_mut(&key) {
                if !record.is_complete() {
                    record.pending_lookups.push(lookup);
                }
            }
        }
    }

    // --- record-level enrichment -----------------------------------------

    async fn enrich_canonical_records(&mut self) -> Result<()> {
        let batch = PendingBatch::new(0);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut scheduled = 0usize;
        for key in self.store.unsettled_keys() {
            let Some(record) = self.store.get_mut(&key) else {
                continue;
            };
            // Completeness is re-checked before issuing: a record that
            // became complete during the author phase fetches nothing.
            if record.is_complete() {
                record.pending_lookups.clear();
                continue;
            }
            for (author_id, handle) in record.pending_lookups.drain(..) {
                batch.add(1);
                scheduled += 1;
                let client = Arc::clone(&self.client);
                let tx = tx.clone();
                let batch = batch.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    let result = client.work_detail(&author_id, &handle).await;
                    let _ = tx.send((key, result));
                    batch.arrive();
                });
            }
        }
        drop(tx);
        info!(lookups = scheduled, "record-level phase started");

        while let Some((key, result)) = rx.recv().await {
            self.handle_detail_response(key, result);
        }
        batch.settled().await;
        Ok(())
    }

    fn handle_detail_response(&mut self, scheduled_key: RecordKey, result: Result<WorkDetail>) {
        match result {
            Ok(detail) => self.apply_enrichment(scheduled_key, detail),
            Err(PubsError::NotFound(url)) => {
                warn!(url = %url, "work vanished from registry, skipping");
                self.statuses
                    .push("Failed to get some data from ORCID.".to_string());
            }
            Err(e) => {
                warn!(key = %scheduled_key, error = %e, "record lookup degraded");
            }
        }
    }

    /// Merge one detail response into its record and run the year-skew
    /// correction. The response's own DOI takes precedence for
    /// association, falling back to the synthetic key, then to the key
    /// the lookup was scheduled under.
    fn apply_enrichment(&mut self, scheduled_key: RecordKey, detail: WorkDetail) {
        let response_key = RecordKey::resolve(detail.doi.as_deref(), &detail.year, &detail.title);
        let key = if self.store.contains(&response_key) {
            response_key
        } else {
            scheduled_key
        };

        let Some(record) = self.store.get_mut(&key) else {
            return;
        };
        record.apply_detail(&detail, &self.config.name_corrections);
        correct_year_skew(&mut self.store, &key, &self.dynamic_years);
    }

    // --- investigation ----------------------------------------------------

    async fn investigate_stubs(&mut self) -> Result<()> {
        let pruned = self.store.prune_duplicate_stubs();
        if pruned > 0 {
            info!(pruned, "dropped stubs duplicating canonical records");
        }

        let stubs = self.store.drain_investigation();
        if stubs.is_empty() {
            return Ok(());
        }
        info!(stubs = stubs.len(), "investigating works without identifiers");

        let batch = PendingBatch::new(0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut staged: HashMap<RecordKey, PublicationRecord> = HashMap::new();

        for mut stub in stubs {
            let lookups = std::mem::take(&mut stub.pending_lookups);
            for (author_id, handle) in lookups {
                batch.add(1);
                let client = Arc::clone(&self.client);
                let tx = tx.clone();
                let batch = batch.clone();
                let key = stub.key.clone();
                tokio::spawn(async move {
                    let result = client.work_detail(&author_id, &handle).await;
                    let _ = tx.send((key, result));
                    batch.arrive();
                });
            }
            staged.insert(stub.key.clone(), stub);
        }
        drop(tx);

        let mut details: HashMap<RecordKey, Vec<WorkDetail>> = HashMap::new();
        while let Some((key, result)) = rx.recv().await {
            match result {
                Ok(detail) => details.entry(key).or_default().push(detail),
                Err(PubsError::NotFound(url)) => {
                    warn!(url = %url, "investigated work not found");
                    self.statuses
                        .push("Failed to get some data from ORCID.".to_string());
                }
                Err(e) => warn!(key = %key, error = %e, "investigation lookup degraded"),
            }
        }
        batch.settled().await;

        for (key, stub) in staged {
            let fetched = details.remove(&key).unwrap_or_default();
            match resolve_stub(
                stub,
                &fetched,
                &self.allow_list,
                &self.config.name_corrections,
            ) {
                InvestigationOutcome::Promoted(record) => {
                    let key = record.key.clone();
                    self.store.promote(record);
                    correct_year_skew(&mut self.store, &key, &self.dynamic_years);
                }
                InvestigationOutcome::Dropped(_) => {}
            }
        }
        Ok(())
    }

    /// Collect the transient statuses the client reported for fetches
    /// whose first response was a non-success, deduplicated for the
    /// status line.
    fn drain_client_statuses(&mut self) {
        while let Ok(message) = self.status_rx.try_recv() {
            if !self.statuses.contains(&message) {
                self.statuses.push(message);
            }
        }
    }

    // --- PDF probing ------------------------------------------------------

    async fn probe_pdfs(&mut self) -> Result<()> {
        let Some(base) = self.config.pdf_base.clone() else {
            return Ok(());
        };
        let prober = PdfProber::new(&base)?;

        let years = self.dynamic_years.clone();
        for year in years {
            let keys: Vec<RecordKey> = self
                .store
                .records_for_year(year)
                .iter()
                .map(|r| r.key.clone())
                .collect();
            for key in keys {
                let found = match self.store.get(&key) {
                    Some(record) => prober.probe(record).await,
                    None => None,
                };
                if let (Some(url), Some(record)) = (found, self.store.get_mut(&key)) {
                    record.pdf_url = Some(url);
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn store(&self) -> &RecordStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{SourceQuality, AGGREGATOR_SOURCE, CURATED_SOURCE};

    fn config() -> Config {
        let raw = r#"{
            "authors": [
                {"orcid": "0000-0002-9678-9055", "name": "Pedro Vicente", "periods": [[2013, 9999]]}
            ],
            "venue_allow_list": ["Pattern Recognition"],
            "first_year": 2020,
            "retry": {"short_delay_ms": 1, "max_attempts": 1}
        }"#;
        serde_json::from_str(raw).expect("config parses")
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(config(), 2022).expect("pipeline builds")
    }

    fn sighting(doi: Option<&str>, title: &str, handle: &str) -> WorkSighting {
        WorkSighting {
            author_id: "0000-0002-9678-9055".to_string(),
            work_handle: handle.to_string(),
            doi: doi.map(str::to_string),
            title: title.to_string(),
            year: "2021".to_string(),
            type_tag: "JOURNAL_ARTICLE".to_string(),
            source_name: CURATED_SOURCE.to_string(),
        }
    }

    fn detail(source: &str, month: &str) -> WorkDetail {
        WorkDetail {
            doi: Some("10.1/X".to_string()),
            title: "A Study".to_string(),
            contributors: vec!["Vicente, Pedro".to_string(), "Bernardino, Alexandre".to_string()],
            venue: "IEEE Transactions on Robotics".to_string(),
            year: "2021".to_string(),
            month: month.to_string(),
            citation_format: "BIBTEX".to_string(),
            citation_text: "@article{x, year={2021}}".to_string(),
            source_name: source.to_string(),
        }
    }

    #[test]
    fn test_absorb_routes_synthetic_to_investigation() {
        let mut p = pipeline();
        p.absorb_sightings(vec![
            sighting(Some("10.1/X"), "A Study", "1"),
            sighting(None, "Workshop Paper", "2"),
        ]);

        assert_eq!(p.store().len(), 1);
        let stub_key = RecordKey::synthetic("2021", "Workshop Paper");
        assert!(p.store().investigated(&stub_key).is_some());
    }

    #[test]
    fn test_duplicate_sightings_share_one_record() {
        let mut p = pipeline();
        p.absorb_sightings(vec![sighting(Some("10.1/x"), "A Study", "1")]);
        p.absorb_sightings(vec![sighting(Some("10.1/X"), "A Study", "7")]);

        assert_eq!(p.store().len(), 1);
        let key = RecordKey::from_doi("10.1/x");
        let record = p.store().get(&key).expect("record exists");
        assert_eq!(record.pending_lookups.len(), 2);
    }

    #[test]
    fn test_two_source_merge_scenario() {
        // The curated response lacks a month, the generic one provides
        // it: the final record carries the generic month and the curated
        // fields, whichever order the responses land in.
        let mut p = pipeline();
        p.absorb_sightings(vec![sighting(Some("10.1/X"), "A Study", "1")]);
        let key = RecordKey::from_doi("10.1/X");

        p.apply_enrichment(key.clone(), detail(CURATED_SOURCE, ""));
        p.apply_enrichment(key.clone(), detail("Universidade de Lisboa", "7"));
        p.apply_enrichment(key.clone(), detail(CURATED_SOURCE, ""));

        let record = p.store().get(&key).expect("record exists");
        assert_eq!(record.month, "July");
        assert_eq!(record.venue_name, "IEEE Transactions on Robotics");
        assert_eq!(record.source_quality, SourceQuality::Curated);
        assert!(record.is_complete());
    }

    #[test]
    fn test_enrichment_associates_by_response_doi() {
        let mut p = pipeline();
        p.absorb_sightings(vec![sighting(Some("10.1/X"), "A Study", "1")]);

        // Scheduled under a stale key, response carries the real DOI.
        let stale = RecordKey::from_doi("10.1/OLD");
        p.apply_enrichment(stale, detail(AGGREGATOR_SOURCE, "3"));

        let record = p
            .store()
            .get(&RecordKey::from_doi("10.1/X"))
            .expect("record exists");
        assert_eq!(record.month, "March");
    }

    #[test]
    fn test_enrichment_triggers_year_correction() {
        let mut p = pipeline();
        p.absorb_sightings(vec![sighting(Some("10.1/X"), "A Study", "1")]);
        let key = RecordKey::from_doi("10.1/X");

        let mut skewed = detail(CURATED_SOURCE, "7");
        skewed.venue = "Proceedings of ICRA 2020".to_string();
        p.apply_enrichment(key.clone(), skewed);

        let record = p.store().get(&key).expect("record exists");
        assert_eq!(record.year, "2020");
        assert!(record.year_corrected);
        assert_eq!(p.store().records_for_year(2020).len(), 1);
        assert!(p.store().records_for_year(2021).is_empty());
    }

    #[tokio::test]
    async fn test_first_non_success_surfaces_status() {
        use crate::orcid::test_server::{http_response, serve};

        // The author query fails once and then recovers; the status line
        // must still carry the failure.
        let base = serve(vec![
            http_response("500 Internal Server Error", ""),
            http_response("200 OK", r#"{"group": []}"#),
        ])
        .await;

        let mut config = config();
        config.registry_base = Some(base);
        config.retry.max_attempts = Some(5);
        let p = Pipeline::new(config, 2022).expect("pipeline builds");
        let output = p.run().await.expect("run succeeds");

        assert!(output
            .statuses
            .contains(&"Failed to get some data from ORCID.".to_string()));
    }

    #[tokio::test]
    async fn test_empty_roster_settles_immediately() {
        let mut config = config();
        config.authors.clear();
        let p = Pipeline::new(config, 2022).expect("pipeline builds");
        let output = p.run().await.expect("run succeeds");
        assert!(output.index.years.iter().all(|(_, recs)| recs.is_empty()));
        assert!(output.statuses.is_empty());
    }
}
