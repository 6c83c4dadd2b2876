//! Study-row ingestion for the Meridian engine.
//!
//! Parses raw per-study effect rows (the hand-off format of the upstream
//! abstract extractor) into `Paper` and `Estimate` values, and provides the
//! in-memory `EvidenceSource` used for tests and LITERATURE_LIVE mocking.

pub mod rows;

pub use rows::*;

use meridian_core::pooling::SourceError;
use meridian_core::{Estimate, EvidenceSource, Paper};

/// In-memory evidence source: a fixed set of papers and estimates handed
/// back on every fetch.
pub struct StaticSource {
    name: String,
    papers: Vec<Paper>,
    estimates: Vec<Estimate>,
}

impl StaticSource {
    pub fn new(name: &str, papers: Vec<Paper>, estimates: Vec<Estimate>) -> Self {
        Self {
            name: name.to_string(),
            papers,
            estimates,
        }
    }

    /// Build a source directly from a raw study-row payload.
    pub fn from_json(name: &str, json: &str) -> Result<Self, IngestError> {
        let records = parse_study_rows(json)?;
        let (papers, estimates) = to_evidence(&records)?;
        Ok(Self::new(name, papers, estimates))
    }
}

impl EvidenceSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<(Vec<Paper>, Vec<Estimate>), SourceError> {
        Ok((self.papers.clone(), self.estimates.clone()))
    }
}
