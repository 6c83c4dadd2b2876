//! Ontology term models.

use serde::{Deserialize, Serialize};

/// Kind of a term in the clinical ontology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TermType {
    /// An adverse perioperative event (e.g. LARYNGOSPASM).
    Outcome,
    /// A patient attribute that modifies outcome probability.
    RiskFactor,
    /// A drug the planner can recommend or contraindicate.
    Medication,
    /// Demographic-derived tokens (age bands, sex).
    Demographic,
    /// A surgical procedure; its category supplies the case-type context dimension.
    Procedure,
}

impl TermType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TermType::Outcome => "OUTCOME",
            TermType::RiskFactor => "RISK_FACTOR",
            TermType::Medication => "MEDICATION",
            TermType::Demographic => "DEMOGRAPHIC",
            TermType::Procedure => "PROCEDURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OUTCOME" => Some(TermType::Outcome),
            "RISK_FACTOR" => Some(TermType::RiskFactor),
            "MEDICATION" => Some(TermType::Medication),
            "DEMOGRAPHIC" => Some(TermType::Demographic),
            "PROCEDURE" => Some(TermType::Procedure),
            _ => None,
        }
    }
}

/// How strongly a synonym identifies its term. Drives extraction confidence,
/// so the tiers live in data rather than in extractor code. Ordering:
/// Canonical is strongest (`Canonical < Listed < Weak`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SynonymStrength {
    /// The canonical label itself.
    Canonical,
    /// A listed alternate spelling or lay phrase.
    Listed,
    /// A short abbreviation that may collide with other text.
    Weak,
}

impl SynonymStrength {
    /// Base extraction confidence for a match at this strength.
    pub fn base_confidence(&self) -> f64 {
        match self {
            SynonymStrength::Canonical => 0.95,
            SynonymStrength::Listed => 0.85,
            SynonymStrength::Weak => 0.70,
        }
    }
}

/// A synonym with its strength tier. Always stored lowercase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synonym {
    pub text: String,
    pub strength: SynonymStrength,
}

impl Synonym {
    pub fn new(text: &str, strength: SynonymStrength) -> Self {
        Self {
            text: text.to_lowercase(),
            strength,
        }
    }
}

/// A single term in the closed clinical vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyTerm {
    /// Stable uppercase identifier, unique across the ontology.
    pub token: String,
    pub term_type: TermType,
    /// Human-readable label.
    pub plain_label: String,
    /// Lowercase synonyms with strength tiers.
    pub synonyms: Vec<Synonym>,
    /// Clinical grouping (airway, pulmonary, cardiac, ...). For procedures
    /// this is the case-type dimension of the context tuple.
    pub category: String,
    /// Clinical importance prior, >= 0.
    pub severity_weight: f64,
    /// Optional hierarchy (e.g. SMOKING -> SMOKING_HEAVY).
    pub parent_token: Option<String>,
    /// Set when the token carries a time window (e.g. RECENT_URI_2W); the
    /// extractor requires a temporal cue for these.
    pub time_windowed: bool,
}

impl OntologyTerm {
    pub fn new(token: &str, term_type: TermType, plain_label: &str, category: &str) -> Self {
        Self {
            token: token.to_uppercase(),
            term_type,
            plain_label: plain_label.to_string(),
            synonyms: Vec::new(),
            category: category.to_string(),
            severity_weight: 1.0,
            parent_token: None,
            time_windowed: false,
        }
    }

    pub fn with_severity(mut self, weight: f64) -> Self {
        self.severity_weight = weight;
        self
    }

    pub fn with_synonyms(mut self, listed: &[&str]) -> Self {
        for s in listed {
            self.synonyms.push(Synonym::new(s, SynonymStrength::Listed));
        }
        self
    }

    pub fn with_weak_synonyms(mut self, weak: &[&str]) -> Self {
        for s in weak {
            self.synonyms.push(Synonym::new(s, SynonymStrength::Weak));
        }
        self
    }

    pub fn time_windowed(mut self) -> Self {
        self.time_windowed = true;
        self
    }

    /// All match candidates for this term: the canonical label plus synonyms.
    pub fn match_candidates(&self) -> Vec<Synonym> {
        let mut out = vec![Synonym::new(&self.plain_label, SynonymStrength::Canonical)];
        out.extend(self.synonyms.iter().cloned());
        out
    }
}
