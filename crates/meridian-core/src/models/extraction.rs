//! Extraction outputs: demographics and confidence-weighted factors.

use serde::{Deserialize, Serialize};

use super::Population;

/// Age band derived from parsed age. Missing age stays Unknown; it never
/// defaults silently to a specific band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    Lt1,
    Age1To5,
    Age6To12,
    Age13To17,
    Age18To64,
    Ge65,
    Unknown,
}

impl AgeBand {
    pub fn from_years(age_years: f64) -> Self {
        if age_years < 0.0 {
            AgeBand::Unknown
        } else if age_years < 1.0 {
            AgeBand::Lt1
        } else if age_years < 6.0 {
            AgeBand::Age1To5
        } else if age_years < 13.0 {
            AgeBand::Age6To12
        } else if age_years < 18.0 {
            AgeBand::Age13To17
        } else if age_years < 65.0 {
            AgeBand::Age18To64
        } else {
            AgeBand::Ge65
        }
    }

    /// Ontology token for the derived demographic factor.
    pub fn token(&self) -> Option<&'static str> {
        match self {
            AgeBand::Lt1 => Some("AGE_LT_1"),
            AgeBand::Age1To5 => Some("AGE_1_5"),
            AgeBand::Age6To12 => Some("AGE_6_12"),
            AgeBand::Age13To17 => Some("AGE_13_17"),
            AgeBand::Age18To64 => Some("AGE_18_64"),
            AgeBand::Ge65 => Some("AGE_GE_65"),
            AgeBand::Unknown => None,
        }
    }

    pub fn is_pediatric(&self) -> bool {
        matches!(
            self,
            AgeBand::Lt1 | AgeBand::Age1To5 | AgeBand::Age6To12 | AgeBand::Age13To17
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn token(&self) -> &'static str {
        match self {
            Sex::Male => "SEX_MALE",
            Sex::Female => "SEX_FEMALE",
        }
    }
}

/// Case urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Urgency {
    Elective,
    Urgent,
    Emergent,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Elective => "ELECTIVE",
            Urgency::Urgent => "URGENT",
            Urgency::Emergent => "EMERGENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ELECTIVE" => Some(Urgency::Elective),
            "URGENT" => Some(Urgency::Urgent),
            "EMERGENT" => Some(Urgency::Emergent),
            _ => None,
        }
    }
}

/// Patient demographics extracted from HPI text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub age_years: Option<f64>,
    pub age_band: AgeBand,
    pub sex: Option<Sex>,
    /// Matched procedure ontology token.
    pub procedure: Option<String>,
    pub urgency: Urgency,
    pub weight_kg: Option<f64>,
}

impl Default for Demographics {
    fn default() -> Self {
        Self {
            age_years: None,
            age_band: AgeBand::Unknown,
            sex: None,
            procedure: None,
            urgency: Urgency::Elective,
            weight_kg: None,
        }
    }
}

impl Demographics {
    /// Request population for context resolution. Pregnancy is handled by
    /// the caller since it is carried as a factor, not a demographic field.
    pub fn population(&self) -> Option<Population> {
        match self.age_band {
            AgeBand::Unknown => None,
            band if band.is_pediatric() => Some(Population::Pediatric),
            _ => Some(Population::Adult),
        }
    }

    pub fn is_pediatric(&self) -> bool {
        self.age_band.is_pediatric()
    }
}

/// A risk factor recognized in HPI text, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFactor {
    /// Ontology token.
    pub token: String,
    pub plain_label: String,
    /// In (0, 1]: base synonym confidence x negation penalty x temporal modifier.
    pub confidence: f64,
    /// Matched spans from the source text.
    pub evidence_text: Vec<String>,
    pub category: String,
    pub severity_weight: f64,
}
