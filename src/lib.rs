//! # labpubs
//!
//! ORCID-backed researcher publication listing pipeline.
//!
//! Queries the registry for each roster author, reconciles duplicate
//! and partial sightings into one record per work, enriches records
//! with full detail and citation text, corrects venue-year skew, and
//! hands the renderer a year-bucketed index once every in-flight call
//! has settled.
//!
//! ## Modules
//!
//! - [`orcid`] - registry client (author works, work detail, retries)
//! - [`resolver`] - stable record keys, synthetic fallback included
//! - [`filter`] - sighting eligibility rules
//! - [`record`] - canonical records and field-merge rules
//! - [`corrector`] - venue-year skew correction
//! - [`investigate`] - allow-list investigation of no-identifier works
//! - [`latch`] - pending-batch countdown latch
//! - [`store`] - canonical store, year buckets, investigation staging
//! - [`pipeline`] - orchestration
//! - [`render`] - year index handoff and output writers
//! - [`pdf`] - PDF existence probe
//! - [`error`] - custom error types

pub mod config;
pub mod corrector;
pub mod error;
pub mod filter;
pub mod investigate;
pub mod latch;
pub mod orcid;
pub mod pdf;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod resolver;
pub mod store;

pub use error::{PubsError, Result};
