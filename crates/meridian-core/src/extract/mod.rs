//! HPI extractor.
//!
//! Pipeline: normalization -> demographics -> factor extraction ->
//! deduplication -> demographic-derived factors. Pure and single-threaded;
//! empty input yields empty output rather than an error.

mod demographics;
mod factors;
mod normalize;

pub use normalize::{normalize, NormalizedText, Token};

use crate::config::ExtractConfig;
use crate::models::{Demographics, ExtractedFactor};
use crate::ontology::Ontology;

/// Extractor output.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub demographics: Demographics,
    pub factors: Vec<ExtractedFactor>,
    /// Non-empty text that produced zero factors.
    pub degraded: bool,
}

/// Rule-based extractor over the closed ontology.
pub struct HpiExtractor<'a> {
    ontology: &'a Ontology,
    config: &'a ExtractConfig,
}

impl<'a> HpiExtractor<'a> {
    pub fn new(ontology: &'a Ontology, config: &'a ExtractConfig) -> Self {
        Self { ontology, config }
    }

    /// Map free text to demographics plus a confidence-weighted factor set.
    pub fn extract(&self, hpi_text: &str) -> Extraction {
        let norm = normalize::normalize(hpi_text);
        if norm.tokens.is_empty() {
            return Extraction {
                demographics: Demographics::default(),
                factors: Vec::new(),
                degraded: false,
            };
        }

        let demographics = demographics::extract_demographics(&norm, self.ontology);
        let mut factors = factors::extract_factors(&norm, self.ontology, self.config);
        self.push_derived(&demographics, &mut factors);
        let factors = factors::deduplicate(factors);

        let degraded = factors.is_empty();
        if degraded {
            tracing::warn!(chars = hpi_text.len(), "no factors extracted from non-empty HPI");
        }

        Extraction {
            demographics,
            factors,
            degraded,
        }
    }

    /// Demographic-derived factors (age band, sex) carry confidence 1.0
    /// when the underlying field is known.
    fn push_derived(&self, demographics: &Demographics, factors: &mut Vec<ExtractedFactor>) {
        if let Some(token) = demographics.age_band.token() {
            if let Some(term) = self.ontology.term(token) {
                factors.push(ExtractedFactor {
                    token: term.token.clone(),
                    plain_label: term.plain_label.clone(),
                    confidence: 1.0,
                    evidence_text: vec!["derived: age".to_string()],
                    category: term.category.clone(),
                    severity_weight: term.severity_weight,
                });
            }
        }
        if let Some(sex) = demographics.sex {
            if let Some(term) = self.ontology.term(sex.token()) {
                factors.push(ExtractedFactor {
                    token: term.token.clone(),
                    plain_label: term.plain_label.clone(),
                    confidence: 1.0,
                    evidence_text: vec!["derived: sex".to_string()],
                    category: term.category.clone(),
                    severity_weight: term.severity_weight,
                });
            }
        }
    }
}
