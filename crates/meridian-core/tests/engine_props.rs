//! Property tests for the engine's stated laws.
//!
//! Uses proptest for randomized checking with shrinking; the fixture
//! snapshot is built in memory without touching SQLite so cases stay fast.

use std::collections::HashMap;

use proptest::prelude::*;

use meridian_core::config::{PoolingConfig, RiskConfig};
use meridian_core::models::{
    ContextLabel, EffectMeasure, Population, StudyDesign, TermType, Urgency,
};
use meridian_core::pooling::build_snapshot;
use meridian_core::risk::{CancelToken, RiskCalculator};
use meridian_core::{Estimate, ExtractedFactor, Ontology, Paper};

fn peds_ent() -> ContextLabel {
    ContextLabel::new(Some(Population::Pediatric), Some("ENT"), Some(Urgency::Elective))
}

fn papers() -> HashMap<String, Paper> {
    [
        ("100", Paper::new("100", "A", 2021, StudyDesign::Rct, 900, Population::Pediatric)),
        ("101", Paper::new("101", "B", 2020, StudyDesign::Cohort, 400, Population::Pediatric)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn baseline(id: &str, pmid: &str, p: f64) -> Estimate {
    Estimate {
        id: id.into(),
        pmid: pmid.into(),
        outcome_token: "LARYNGOSPASM".into(),
        modifier_token: None,
        measure: EffectMeasure::Incidence,
        value: p,
        ci_low: None,
        ci_high: None,
        adjusted: false,
        population: Population::Pediatric,
        context: peds_ent(),
        quality_weight: 0.9,
        extraction_confidence: 0.9,
        approximate: false,
    }
}

fn modifier(id: &str, pmid: &str, token: &str, or: f64) -> Estimate {
    Estimate {
        id: id.into(),
        pmid: pmid.into(),
        outcome_token: "LARYNGOSPASM".into(),
        modifier_token: Some(token.into()),
        measure: EffectMeasure::OddsRatio,
        value: or,
        ci_low: Some(or * 0.6),
        ci_high: Some(or * 1.7),
        adjusted: true,
        population: Population::Pediatric,
        context: peds_ent(),
        quality_weight: 0.9,
        extraction_confidence: 0.9,
        approximate: false,
    }
}

fn factor(token: &str, confidence: f64) -> ExtractedFactor {
    ExtractedFactor {
        token: token.into(),
        plain_label: token.into(),
        confidence,
        evidence_text: vec![],
        category: "pulmonary".into(),
        severity_weight: 2.0,
    }
}

proptest! {
    /// Law 2: adding a factor whose pooled OR exceeds 1 never decreases
    /// the adjusted risk (absent the cap).
    #[test]
    fn monotone_factor_effect(
        baseline_p in 0.005f64..0.10,
        or_value in 1.05f64..4.0,
        confidence in 0.5f64..1.0,
    ) {
        let estimates = vec![
            baseline("b1", "100", baseline_p),
            baseline("b2", "101", baseline_p * 1.2),
            modifier("m1", "100", "ASTHMA", or_value),
            modifier("m2", "101", "ASTHMA", or_value * 1.1),
        ];
        let snapshot = build_snapshot("v2025.01", &estimates, &papers(), &PoolingConfig::default());
        let ontology = Ontology::builtin();
        let config = RiskConfig::standard();
        let calc = RiskCalculator::new(&snapshot, &ontology, &config);

        let without = calc.assess(&[], &peds_ent(), &CancelToken::new(), None);
        let with = calc.assess(&[factor("ASTHMA", confidence)], &peds_ent(), &CancelToken::new(), None);

        let base = without.assessments[0].adjusted_risk.unwrap();
        let adjusted = &with.assessments[0];
        if !adjusted.capped {
            prop_assert!(adjusted.adjusted_risk.unwrap() >= base);
        }
    }

    /// Law 3: the cap bounds hold for arbitrary factor stacks.
    #[test]
    fn cap_bounds_hold(
        baseline_p in 0.001f64..0.30,
        ors in prop::collection::vec(1.0f64..8.0, 1..5),
        confidences in prop::collection::vec(0.5f64..1.0, 5),
    ) {
        let tokens = ["ASTHMA", "RECENT_URI_2W", "OSA", "COPD", "OBESITY"];
        let mut estimates = vec![
            baseline("b1", "100", baseline_p),
            baseline("b2", "101", baseline_p * 1.1),
        ];
        for (i, or) in ors.iter().enumerate() {
            estimates.push(modifier(&format!("ma{i}"), "100", tokens[i], *or));
            estimates.push(modifier(&format!("mb{i}"), "101", tokens[i], *or * 1.2));
        }
        let snapshot = build_snapshot("v2025.01", &estimates, &papers(), &PoolingConfig::default());
        let ontology = Ontology::builtin();
        let config = RiskConfig::standard();
        let calc = RiskCalculator::new(&snapshot, &ontology, &config);

        let factors: Vec<ExtractedFactor> = ors
            .iter()
            .enumerate()
            .map(|(i, _)| factor(tokens[i], confidences[i]))
            .collect();
        let out = calc.assess(&factors, &peds_ent(), &CancelToken::new(), None);

        for assessment in &out.assessments {
            let risk = assessment.adjusted_risk.unwrap();
            let ratio = assessment.risk_ratio.unwrap();
            prop_assert!(risk <= 0.95 + 1e-9, "risk {risk} exceeds cap");
            prop_assert!(ratio <= 25.0 + 1e-9, "ratio {ratio} exceeds cap");
        }
    }

    /// Law 1 (calculator determinism): identical inputs give identical
    /// assessments.
    #[test]
    fn assessment_deterministic(
        baseline_p in 0.005f64..0.10,
        or_value in 1.05f64..4.0,
    ) {
        let estimates = vec![
            baseline("b1", "100", baseline_p),
            baseline("b2", "101", baseline_p * 1.3),
            modifier("m1", "100", "ASTHMA", or_value),
            modifier("m2", "101", "ASTHMA", or_value * 1.15),
        ];
        let snapshot_a = build_snapshot("v2025.01", &estimates, &papers(), &PoolingConfig::default());
        let snapshot_b = build_snapshot("v2025.01", &estimates, &papers(), &PoolingConfig::default());
        let ontology = Ontology::builtin();
        let config = RiskConfig::standard();

        let out_a = RiskCalculator::new(&snapshot_a, &ontology, &config)
            .assess(&[factor("ASTHMA", 0.9)], &peds_ent(), &CancelToken::new(), None);
        let out_b = RiskCalculator::new(&snapshot_b, &ontology, &config)
            .assess(&[factor("ASTHMA", 0.9)], &peds_ent(), &CancelToken::new(), None);
        prop_assert_eq!(out_a.assessments, out_b.assessments);
    }
}

/// Law 4: for every synonym of every risk factor, a denied mention is not
/// emitted above the confidence floor. Exhaustive over the ontology rather
/// than randomized.
#[test]
fn negation_suppresses_every_synonym() {
    let ontology = Ontology::builtin();
    let config = RiskConfig::standard();
    let extractor = meridian_core::extract::HpiExtractor::new(&ontology, &config.extract);

    for term in ontology.terms_of_type(TermType::RiskFactor) {
        for synonym in term.match_candidates() {
            let text = format!("patient denies {}", synonym.text);
            let out = extractor.extract(&text);
            let leaked = out
                .factors
                .iter()
                .any(|f| f.token == term.token && f.confidence > 0.5);
            assert!(
                !leaked,
                "negated synonym {:?} still emitted {} above 0.5",
                synonym.text, term.token
            );
        }
    }
}
