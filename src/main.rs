//! labpubs - researcher publication listing builder
//!
//! Queries ORCID for each roster author, reconciles the sightings into
//! deduplicated records, and writes the year-grouped listing plus chart
//! data to an output directory.
//!
//! ```bash
//! labpubs fetch --config roster.json --output ./public
//! ```

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use labpubs::config::Config;
use labpubs::pipeline::Pipeline;
use labpubs::render::{self, HtmlListing, Renderer};

/// Researcher publication listing builder
#[derive(Parser)]
#[command(name = "labpubs")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch publications and write the listing
    Fetch {
        /// Roster/configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Skip the .bib citation export
        #[arg(long)]
        no_citations: bool,
    },

    /// Parse a configuration file and report what would be fetched
    Validate {
        /// Roster/configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Fetch {
            config,
            output,
            no_citations,
        } => run_fetch(config, output, no_citations).await,
        Commands::Validate { config } => run_validate(config),
    }
}

async fn run_fetch(config_path: PathBuf, output: PathBuf, no_citations: bool) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if config.authors.is_empty() {
        anyhow::bail!("Config lists no authors");
    }

    std::fs::create_dir_all(&output).context("Failed to create output directory")?;

    let current_year = Local::now().year();
    let pipeline = Pipeline::new(config, current_year)?;

    info!(year = current_year, "starting fetch");
    let result = pipeline.run().await?;

    for status in &result.statuses {
        println!("! {}", status);
    }
    println!(
        "Fetched {} publications across {} years.",
        result.index.total_records(),
        result.index.years.len()
    );

    let mut listing = HtmlListing::new(&output.join("listing.html"));
    if !listing.is_busy() {
        listing.render(&result.index)?;
    }
    render::write_counts_csv(&output.join("counts.csv"), &result.index)?;
    render::write_records_csv(&output.join("records.csv"), &result.index)?;

    if !no_citations {
        let written = render::export_citations(&output, &result.index)?;
        println!("Exported {} citation files.", written);
    }

    println!("Done. Results in: {}", output.display());
    Ok(())
}

fn run_validate(config_path: PathBuf) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let current_year = Local::now().year();
    let dynamic_years = config.dynamic_years(current_year);

    println!("Authors: {}", config.authors.len());
    for author in &config.authors {
        println!("  {} ({})", author.orcid, author.name);
    }
    println!("Excluded identifiers: {}", config.excluded_ids.len());
    println!("Venue allow-list entries: {}", config.venue_allow_list.len());
    println!(
        "Dynamic years: {} ({}..{})",
        dynamic_years.len(),
        dynamic_years.last().copied().unwrap_or(current_year),
        dynamic_years.first().copied().unwrap_or(current_year),
    );
    Ok(())
}
