//! Quantitative findings extracted from studies, and the context tuple
//! used to index pooled evidence.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Population, Urgency};

/// Effect measure of an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectMeasure {
    /// Baseline incidence in [0, 1]; only valid with no modifier.
    Incidence,
    OddsRatio,
    RiskRatio,
    HazardRatio,
}

impl EffectMeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectMeasure::Incidence => "INCIDENCE",
            EffectMeasure::OddsRatio => "OR",
            EffectMeasure::RiskRatio => "RR",
            EffectMeasure::HazardRatio => "HR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INCIDENCE" => Some(EffectMeasure::Incidence),
            "OR" => Some(EffectMeasure::OddsRatio),
            "RR" => Some(EffectMeasure::RiskRatio),
            "HR" => Some(EffectMeasure::HazardRatio),
            _ => None,
        }
    }
}

/// Canonical `population x case_type x urgency` tuple. Missing dimensions
/// are wildcards, rendered as `*` (e.g. `PEDIATRIC×ENT×ELECTIVE`,
/// `ADULT×CARDIAC×*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextLabel {
    pub population: Option<Population>,
    pub case_type: Option<String>,
    pub urgency: Option<Urgency>,
}

impl ContextLabel {
    pub fn new(population: Option<Population>, case_type: Option<&str>, urgency: Option<Urgency>) -> Self {
        Self {
            population,
            case_type: case_type.map(|c| c.to_uppercase()),
            urgency,
        }
    }

    /// Fully wildcarded context.
    pub fn any() -> Self {
        Self {
            population: None,
            case_type: None,
            urgency: None,
        }
    }

    /// Parse a canonical tuple string. Unknown dimension values are an error
    /// so malformed labels do not silently become wildcards.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('×').collect();
        if parts.len() != 3 {
            return None;
        }
        let population = match parts[0] {
            "*" => None,
            p => Some(Population::parse(p)?),
        };
        let case_type = match parts[1] {
            "*" => None,
            c => Some(c.to_string()),
        };
        let urgency = match parts[2] {
            "*" => None,
            u => Some(Urgency::parse(u)?),
        };
        Some(Self {
            population,
            case_type,
            urgency,
        })
    }

    /// Fallback chain from most to least specific: the label itself, then
    /// urgency wildcarded, then case type, then everything.
    pub fn fallback_chain(&self) -> Vec<ContextLabel> {
        let mut chain = vec![self.clone()];
        if self.urgency.is_some() {
            chain.push(ContextLabel {
                urgency: None,
                ..self.clone()
            });
        }
        if self.case_type.is_some() {
            chain.push(ContextLabel {
                case_type: None,
                urgency: None,
                ..self.clone()
            });
        }
        if self.population.is_some() {
            chain.push(ContextLabel::any());
        }
        chain.dedup();
        chain
    }

    /// The label itself plus every parent wildcard cell it rolls up into.
    /// Used by the pooler to precompute pools at all levels.
    pub fn self_and_parents(&self) -> Vec<ContextLabel> {
        self.fallback_chain()
    }
}

impl fmt::Display for ContextLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}×{}×{}",
            self.population.map(|p| p.as_str()).unwrap_or("*"),
            self.case_type.as_deref().unwrap_or("*"),
            self.urgency.map(|u| u.as_str()).unwrap_or("*"),
        )
    }
}

/// One extracted quantitative finding.
///
/// Invariants: `modifier_token` None implies `measure == Incidence` with
/// `value` in [0, 1]; a present modifier implies a ratio measure with
/// `value` > 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub id: String,
    pub pmid: String,
    pub outcome_token: String,
    /// None means this row is a baseline incidence.
    pub modifier_token: Option<String>,
    pub measure: EffectMeasure,
    pub value: f64,
    /// 95% CI bounds when reported.
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
    pub adjusted: bool,
    pub population: Population,
    pub context: ContextLabel,
    /// Study-level quality multiplier in (0, 1].
    pub quality_weight: f64,
    /// Parser confidence in (0, 1]; rows below the pooling floor are dropped.
    pub extraction_confidence: f64,
    /// Set when an RR/HR was pooled via the OR approximation because no
    /// baseline incidence was available for the conversion.
    pub approximate: bool,
}

impl Estimate {
    /// Validate the measure/modifier invariants.
    pub fn is_well_formed(&self) -> bool {
        match self.modifier_token {
            None => {
                self.measure == EffectMeasure::Incidence
                    && (0.0..=1.0).contains(&self.value)
            }
            Some(_) => self.measure != EffectMeasure::Incidence && self.value > 0.0,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.modifier_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_roundtrip() {
        let ctx = ContextLabel::new(Some(Population::Pediatric), Some("ENT"), Some(Urgency::Elective));
        assert_eq!(ctx.to_string(), "PEDIATRIC×ENT×ELECTIVE");
        assert_eq!(ContextLabel::parse("PEDIATRIC×ENT×ELECTIVE"), Some(ctx));
    }

    #[test]
    fn test_context_wildcards() {
        let ctx = ContextLabel::new(Some(Population::Adult), Some("CARDIAC"), None);
        assert_eq!(ctx.to_string(), "ADULT×CARDIAC×*");
        assert_eq!(ContextLabel::parse("ADULT×CARDIAC×*"), Some(ctx));
        assert!(ContextLabel::parse("ADULT×CARDIAC").is_none());
        assert!(ContextLabel::parse("MARTIAN×CARDIAC×*").is_none());
    }

    #[test]
    fn test_fallback_chain_order() {
        let ctx = ContextLabel::new(Some(Population::Pediatric), Some("ENT"), Some(Urgency::Elective));
        let chain = ctx.fallback_chain();
        let rendered: Vec<String> = chain.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "PEDIATRIC×ENT×ELECTIVE",
                "PEDIATRIC×ENT×*",
                "PEDIATRIC×*×*",
                "*×*×*",
            ]
        );
    }

    #[test]
    fn test_fallback_chain_from_wildcard() {
        assert_eq!(ContextLabel::any().fallback_chain().len(), 1);
    }

    #[test]
    fn test_estimate_invariants() {
        let mut est = Estimate {
            id: "e1".into(),
            pmid: "100".into(),
            outcome_token: "LARYNGOSPASM".into(),
            modifier_token: None,
            measure: EffectMeasure::Incidence,
            value: 0.02,
            ci_low: None,
            ci_high: None,
            adjusted: false,
            population: Population::Pediatric,
            context: ContextLabel::any(),
            quality_weight: 1.0,
            extraction_confidence: 0.9,
            approximate: false,
        };
        assert!(est.is_well_formed());
        assert!(est.is_baseline());

        est.measure = EffectMeasure::OddsRatio;
        assert!(!est.is_well_formed());

        est.modifier_token = Some("ASTHMA".into());
        est.value = 2.5;
        assert!(est.is_well_formed());
        assert!(!est.is_baseline());
    }
}
