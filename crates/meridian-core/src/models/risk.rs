//! Risk assessment outputs.

use serde::{Deserialize, Serialize};

use super::EvidenceGrade;

/// One modifier's contribution to an adjusted risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub factor: String,
    /// Pooled odds ratio applied for this factor.
    pub odds_ratio: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    /// Extraction confidence that exponent-weighted the OR.
    pub confidence: f64,
    pub grade: EvidenceGrade,
    pub pmids: Vec<String>,
}

/// Per-outcome risk assessment. When `no_evidence` is set the numeric
/// fields are absent rather than zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub outcome: String,
    pub outcome_label: String,
    pub baseline_risk: Option<f64>,
    pub adjusted_risk: Option<f64>,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
    /// adjusted / baseline.
    pub risk_ratio: Option<f64>,
    /// Best grade present across baseline and contributing modifiers.
    pub evidence_grade: Option<EvidenceGrade>,
    /// Context the baseline actually resolved from (after wildcard fallback).
    pub context: Option<String>,
    /// Studies behind the pooled baseline.
    pub baseline_pmids: Vec<String>,
    pub contributing_factors: Vec<ContributingFactor>,
    pub no_evidence: bool,
    /// Set when the plausibility cap clamped the adjusted risk.
    pub capped: bool,
}

impl RiskAssessment {
    pub fn no_evidence(outcome: &str, label: &str) -> Self {
        Self {
            outcome: outcome.to_string(),
            outcome_label: label.to_string(),
            baseline_risk: None,
            adjusted_risk: None,
            ci_low: None,
            ci_high: None,
            risk_ratio: None,
            evidence_grade: None,
            context: None,
            baseline_pmids: Vec::new(),
            contributing_factors: Vec::new(),
            no_evidence: true,
            capped: false,
        }
    }

    /// All PMIDs cited across baseline and modifiers.
    pub fn pmids(&self) -> Vec<String> {
        let mut out: Vec<String> = self.baseline_pmids.clone();
        out.extend(
            self.contributing_factors
                .iter()
                .flat_map(|f| f.pmids.iter().cloned()),
        );
        out.sort();
        out.dedup();
        out
    }
}

/// Overall request risk label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Moderate,
    Low,
}

impl RiskLevel {
    /// HIGH if any adjusted risk >= 0.10 or ratio >= 3, MODERATE if
    /// >= 0.05 or >= 1.5, else LOW.
    pub fn classify(assessments: &[RiskAssessment]) -> Self {
        let mut level = RiskLevel::Low;
        for a in assessments {
            let risk = a.adjusted_risk.unwrap_or(0.0);
            let ratio = a.risk_ratio.unwrap_or(0.0);
            if risk >= 0.10 || ratio >= 3.0 {
                return RiskLevel::High;
            }
            if risk >= 0.05 || ratio >= 1.5 {
                level = RiskLevel::Moderate;
            }
        }
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(risk: f64, ratio: f64) -> RiskAssessment {
        RiskAssessment {
            outcome: "X".into(),
            outcome_label: "X".into(),
            baseline_risk: Some(risk / ratio),
            adjusted_risk: Some(risk),
            ci_low: Some(risk / 2.0),
            ci_high: Some(risk * 2.0),
            risk_ratio: Some(ratio),
            evidence_grade: Some(EvidenceGrade::B),
            context: None,
            baseline_pmids: Vec::new(),
            contributing_factors: Vec::new(),
            no_evidence: false,
            capped: false,
        }
    }

    #[test]
    fn test_risk_level_thresholds() {
        assert_eq!(RiskLevel::classify(&[assessment(0.12, 1.2)]), RiskLevel::High);
        assert_eq!(RiskLevel::classify(&[assessment(0.02, 3.5)]), RiskLevel::High);
        assert_eq!(
            RiskLevel::classify(&[assessment(0.06, 1.2)]),
            RiskLevel::Moderate
        );
        assert_eq!(
            RiskLevel::classify(&[assessment(0.01, 1.8)]),
            RiskLevel::Moderate
        );
        assert_eq!(RiskLevel::classify(&[assessment(0.01, 1.1)]), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(&[]), RiskLevel::Low);
    }

    #[test]
    fn test_no_evidence_has_no_numbers() {
        let a = RiskAssessment::no_evidence("PONV", "Postoperative nausea and vomiting");
        assert!(a.no_evidence);
        assert!(a.adjusted_risk.is_none());
        assert!(a.pmids().is_empty());
    }
}
