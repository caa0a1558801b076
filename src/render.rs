//! Rendering boundary.
//!
//! The pipeline hands over a [`YearIndex`]: per-year ordered record
//! lists plus a year→count map for the output-volume chart. Everything
//! past that point is presentation. The bundled writers produce a
//! static HTML listing, the chart data as CSV, a CSV dump of the
//! records, and `.bib` files for citation export.

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::record::PublicationRecord;
use crate::store::RecordStore;

/// Year-bucketed view of the finalized records.
///
/// Years run newest-first; records within a year keep fetch-completion
/// order.
pub struct YearIndex {
    pub years: Vec<(i32, Vec<PublicationRecord>)>,
    pub counts: HashMap<i32, usize>,
}

impl YearIndex {
    pub fn build(store: &RecordStore, dynamic_years: &[i32]) -> Self {
        let years = dynamic_years
            .iter()
            .map(|&y| {
                (
                    y,
                    store.records_for_year(y).into_iter().cloned().collect(),
                )
            })
            .collect();
        Self {
            years,
            counts: store.year_counts(dynamic_years),
        }
    }

    pub fn total_records(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Display collaborator consuming the finalized index.
///
/// `is_busy` is the display-state toggle the pipeline observes: a
/// render request while one is in progress is skipped rather than
/// queued.
pub trait Renderer {
    fn is_busy(&self) -> bool;
    fn render(&mut self, index: &YearIndex) -> Result<()>;
}

/// Static HTML listing writer.
pub struct HtmlListing {
    path: std::path::PathBuf,
    busy: bool,
}

impl HtmlListing {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            busy: false,
        }
    }
}

impl Renderer for HtmlListing {
    fn is_busy(&self) -> bool {
        self.busy
    }

    fn render(&mut self, index: &YearIndex) -> Result<()> {
        if self.busy {
            debug!("render in progress, skipping request");
            return Ok(());
        }
        self.busy = true;

        let mut html = String::new();
        for (year, records) in &index.years {
            if records.is_empty() {
                continue;
            }
            html.push_str(&format!("<ul id=\"pubs_{}\">\n", year));
            for record in records {
                html.push_str("<li>");
                html.push_str(&record_html(record));
                html.push_str("</li>\n");
            }
            html.push_str("</ul>\n");
        }

        let result = std::fs::write(&self.path, html);
        self.busy = false;
        result?;
        info!(path = %self.path.display(), "wrote listing");
        Ok(())
    }
}

fn record_html(record: &PublicationRecord) -> String {
    let mut html = String::new();
    if record.key.is_synthetic() {
        html.push_str(&format!("<strong>{}</strong>, ", record.title));
    } else {
        html.push_str(&format!(
            "<a href='https://doi.org/{}'><strong>{}</strong></a>, ",
            record.key, record.title
        ));
    }
    html.push_str(&format!("<em>{}</em>{}", record.authors_display, record.venue_name));
    html.push_str(&format!(", {} {}", record.month, record.year));
    if let Some(pdf) = &record.pdf_url {
        html.push_str(&format!(" <a href='{}'>[PDF]</a>", pdf));
    }
    html
}

/// Chart data: one row per dynamic year, newest first.
pub fn write_counts_csv(path: &Path, index: &YearIndex) -> Result<()> {
    #[derive(Serialize)]
    struct Row {
        year: i32,
        papers: usize,
    }

    let mut wtr = csv::Writer::from_path(path)?;
    for (year, _) in &index.years {
        wtr.serialize(Row {
            year: *year,
            papers: index.counts.get(year).copied().unwrap_or(0),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Flat CSV dump of every finalized record.
pub fn write_records_csv(path: &Path, index: &YearIndex) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for (_, records) in &index.years {
        for record in records {
            wtr.serialize(record)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Write one `<id>.bib` file per record carrying citation text.
///
/// Identifier path separators are flattened for the filesystem.
pub fn export_citations(dir: &Path, index: &YearIndex) -> Result<usize> {
    let mut written = 0;
    for (_, records) in &index.years {
        for record in records {
            if record.citation_text.is_empty() {
                continue;
            }
            let name: String = record
                .key
                .as_str()
                .chars()
                .map(|c| if c == '/' || c == ':' { '_' } else { c })
                .collect();
            std::fs::write(dir.join(format!("{}.bib", name)), &record.citation_text)?;
            written += 1;
        }
    }
    Ok(written)
}
