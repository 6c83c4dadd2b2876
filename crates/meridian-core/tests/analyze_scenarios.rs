//! End-to-end scenarios for the full analyze pipeline.
//!
//! Each case seeds the same evidence fixture, runs one HPI through the
//! engine, and checks the structured output.

use meridian_core::models::{
    ContextLabel, EffectMeasure, Population, StudyDesign, Urgency,
};
use meridian_core::{
    AnalysisOptions, AnalysisStatus, Engine, Estimate, EvidenceGrade, MedBucket, Paper, RiskLevel,
};

fn peds_ent() -> ContextLabel {
    ContextLabel::new(Some(Population::Pediatric), Some("ENT"), Some(Urgency::Elective))
}

fn adult_cardiac() -> ContextLabel {
    ContextLabel::new(Some(Population::Adult), Some("CARDIAC"), None)
}

fn baseline(id: &str, pmid: &str, outcome: &str, p: f64, pop: Population, ctx: ContextLabel) -> Estimate {
    Estimate {
        id: id.into(),
        pmid: pmid.into(),
        outcome_token: outcome.into(),
        modifier_token: None,
        measure: EffectMeasure::Incidence,
        value: p,
        ci_low: None,
        ci_high: None,
        adjusted: false,
        population: pop,
        context: ctx,
        quality_weight: 0.9,
        extraction_confidence: 0.95,
        approximate: false,
    }
}

fn effect(
    id: &str,
    pmid: &str,
    outcome: &str,
    modifier: &str,
    or: f64,
    pop: Population,
    ctx: ContextLabel,
) -> Estimate {
    Estimate {
        id: id.into(),
        pmid: pmid.into(),
        outcome_token: outcome.into(),
        modifier_token: Some(modifier.into()),
        measure: EffectMeasure::OddsRatio,
        value: or,
        ci_low: Some(or * 0.6),
        ci_high: Some(or * 1.7),
        adjusted: true,
        population: pop,
        context: ctx,
        quality_weight: 0.9,
        extraction_confidence: 0.95,
        approximate: false,
    }
}

/// Seed the shared evidence fixture and publish v2025.01.
fn seeded_engine() -> Engine {
    let engine = Engine::in_memory().unwrap();

    let papers = vec![
        Paper::new("100", "Laryngospasm in pediatric ENT surgery", 2021, StudyDesign::Rct, 900, Population::Pediatric),
        Paper::new("101", "Airway events after adenotonsillectomy", 2020, StudyDesign::Cohort, 450, Population::Pediatric),
        Paper::new("102", "URI and perioperative airway complications", 2019, StudyDesign::Cohort, 300, Population::Pediatric),
        Paper::new("103", "Hemodynamic outcomes in adult cardiac surgery", 2022, StudyDesign::Rct, 700, Population::Adult),
        Paper::new("104", "PONV across mixed surgical cohorts", 2018, StudyDesign::MetaAnalysis, 5000, Population::Mixed),
        Paper::new("105", "Delirium modifiers in elderly patients", 2021, StudyDesign::Cohort, 220, Population::Adult),
    ];

    let peds = Population::Pediatric;
    let adult = Population::Adult;
    let mixed = Population::Mixed;

    let estimates = vec![
        // Laryngospasm: pediatric ENT baselines + airway modifiers
        baseline("b1", "100", "LARYNGOSPASM", 0.017, peds, peds_ent()),
        baseline("b2", "101", "LARYNGOSPASM", 0.022, peds, peds_ent()),
        effect("m1", "100", "LARYNGOSPASM", "ASTHMA", 2.2, peds, peds_ent()),
        effect("m2", "101", "LARYNGOSPASM", "ASTHMA", 2.8, peds, peds_ent()),
        effect("m3", "101", "LARYNGOSPASM", "RECENT_URI_2W", 3.0, peds, peds_ent()),
        effect("m4", "102", "LARYNGOSPASM", "RECENT_URI_2W", 3.4, peds, peds_ent()),
        // Bronchospasm
        baseline("b3", "100", "BRONCHOSPASM", 0.031, peds, peds_ent()),
        baseline("b4", "102", "BRONCHOSPASM", 0.026, peds, peds_ent()),
        effect("m5", "102", "BRONCHOSPASM", "ASTHMA", 3.1, peds, peds_ent()),
        // Adult cardiac hypotension
        baseline("b5", "103", "INTRAOP_HYPOTENSION", 0.28, adult, adult_cardiac()),
        effect("m6", "103", "INTRAOP_HYPOTENSION", "HEART_FAILURE", 1.9, adult, adult_cardiac()),
        // PONV, mixed population
        baseline("b6", "104", "PONV", 0.24, mixed, ContextLabel::any()),
        effect("m7", "104", "PONV", "SEX_FEMALE", 1.8, mixed, ContextLabel::any()),
        // Delirium carries modifiers only: no baseline anywhere (S5)
        effect("m8", "105", "POSTOP_DELIRIUM", "AGE_GE_65", 2.4, adult, adult_cardiac()),
    ];

    engine.ingest(&papers, &estimates).unwrap();
    engine.pool_and_publish("v2025.01").unwrap();
    engine
}

#[test]
fn s1_pediatric_uri_asthma_tonsillectomy() {
    let engine = seeded_engine();
    let result = engine
        .analyze(
            "5-year-old male presenting for tonsillectomy. History significant \
             for asthma and recent URI 2 weeks ago.",
            &AnalysisOptions::default(),
        )
        .unwrap();

    // Factors include the clinical findings and the derived demographics
    for token in ["ASTHMA", "RECENT_URI_2W", "AGE_1_5", "SEX_MALE"] {
        assert!(
            result
                .factors
                .iter()
                .any(|f| f.token == token && f.confidence > 0.5),
            "missing factor {token}"
        );
    }

    let laryngospasm = result
        .risks
        .iter()
        .find(|r| r.outcome == "LARYNGOSPASM")
        .unwrap();
    assert!(!laryngospasm.no_evidence);
    assert!(laryngospasm.risk_ratio.unwrap() >= 3.0);
    assert!(matches!(
        laryngospasm.evidence_grade.unwrap(),
        EvidenceGrade::A | EvidenceGrade::B
    ));
    assert!(!laryngospasm.pmids().is_empty());
    assert_eq!(result.risk_level, RiskLevel::High);

    assert!(result.medications.contains(MedBucket::DrawNow, "ALBUTEROL"));
    assert!(result
        .medications
        .contains(MedBucket::Contraindicated, "SUCCINYLCHOLINE"));
    assert!(result
        .medications
        .contains(MedBucket::Contraindicated, "DESFLURANE"));
}

#[test]
fn s2_adult_cardiac_with_ckd() {
    let engine = seeded_engine();
    let result = engine
        .analyze(
            "68-year-old male with CAD, diabetes, hypertension, CKD stage 4 for CABG.",
            &AnalysisOptions::default(),
        )
        .unwrap();

    assert_eq!(result.demographics.age_years, Some(68.0));
    assert_eq!(result.demographics.urgency, Urgency::Elective);
    for token in ["CAD", "DIABETES", "HYPERTENSION", "CKD"] {
        assert!(
            result
                .factors
                .iter()
                .any(|f| f.token == token && f.confidence > 0.5),
            "missing factor {token}"
        );
    }

    assert!(result
        .medications
        .contains(MedBucket::Contraindicated, "KETOROLAC"));
    assert!(result
        .medications
        .contains(MedBucket::Contraindicated, "SUCCINYLCHOLINE"));
    assert!(result
        .medications
        .contains(MedBucket::Standard, "CISATRACURIUM"));
}

#[test]
fn s3_negation_suppresses_factors() {
    let engine = seeded_engine();
    let result = engine
        .analyze(
            "Patient denies asthma, no history of smoking.",
            &AnalysisOptions::default(),
        )
        .unwrap();

    for token in ["ASTHMA", "SMOKING_HISTORY"] {
        assert!(
            !result
                .factors
                .iter()
                .any(|f| f.token == token && f.confidence > 0.5),
            "negated factor {token} leaked through"
        );
    }
}

#[test]
fn s4_unknown_age_adult_hernia() {
    let engine = seeded_engine();
    let result = engine
        .analyze(
            "Adult for elective hernia repair, otherwise healthy.",
            &AnalysisOptions::default(),
        )
        .unwrap();

    assert_eq!(result.demographics.age_band, meridian_core::models::AgeBand::Age18To64);
    assert!(!result.medications.standard.is_empty());
    assert!(result.medications.draw_now.is_empty());
    // Pediatric-only succinylcholine rule must not fire
    assert!(!result
        .medications
        .contains(MedBucket::Contraindicated, "SUCCINYLCHOLINE"));
}

#[test]
fn s5_missing_evidence_is_partial_success() {
    let engine = seeded_engine();
    let result = engine
        .analyze(
            "68-year-old male with CAD for CABG.",
            &AnalysisOptions::default(),
        )
        .unwrap();

    // POSTOP_DELIRIUM has modifiers but no pooled baseline anywhere
    let delirium = result
        .risks
        .iter()
        .find(|r| r.outcome == "POSTOP_DELIRIUM")
        .unwrap();
    assert!(delirium.no_evidence);
    assert!(delirium.adjusted_risk.is_none());
    assert_eq!(result.status, AnalysisStatus::PartialSuccess);

    // Other outcomes are unaffected
    let hypotension = result
        .risks
        .iter()
        .find(|r| r.outcome == "INTRAOP_HYPOTENSION")
        .unwrap();
    assert!(!hypotension.no_evidence);
}

#[test]
fn s6_stale_uri_not_emitted() {
    let engine = seeded_engine();
    let result = engine
        .analyze("had URI 3 months ago.", &AnalysisOptions::default())
        .unwrap();

    assert!(!result.factors.iter().any(|f| f.token == "RECENT_URI_2W"));
}

#[test]
fn analyze_is_deterministic() {
    let engine = seeded_engine();
    let hpi = "5-year-old male presenting for tonsillectomy. History significant \
               for asthma and recent URI 2 weeks ago.";
    let options = AnalysisOptions::default();

    let a = engine.analyze(hpi, &options).unwrap();
    let b = engine.analyze(hpi, &options).unwrap();
    assert_eq!(
        a.to_canonical_json().unwrap(),
        b.to_canonical_json().unwrap()
    );
}

#[test]
fn version_pinning_survives_republish() {
    let engine = seeded_engine();
    let hpi = "5-year-old male for tonsillectomy with asthma.";

    let pinned = AnalysisOptions {
        evidence_version: Some("v2025.01".into()),
        ..AnalysisOptions::default()
    };
    let before = engine.analyze(hpi, &pinned).unwrap();

    // New estimates arrive and a new version is published
    let extra_paper = Paper::new("199", "New laryngospasm cohort", 2024, StudyDesign::Cohort, 500, Population::Pediatric);
    let extra = baseline("b99", "199", "LARYNGOSPASM", 0.05, Population::Pediatric, peds_ent());
    engine.ingest(&[extra_paper], &[extra]).unwrap();
    engine.pool_and_publish("v2025.02").unwrap();

    // The pinned version still answers identically
    let after = engine.analyze(hpi, &pinned).unwrap();
    assert_eq!(
        before.to_canonical_json().unwrap(),
        after.to_canonical_json().unwrap()
    );

    // The default request now rides the new current version
    let current = engine.analyze(hpi, &AnalysisOptions::default()).unwrap();
    assert_eq!(current.evidence_version, "v2025.02");
}

#[test]
fn audit_chain_records_requests() {
    let engine = seeded_engine();
    engine
        .analyze("5 year old with asthma for tonsillectomy", &AnalysisOptions::default())
        .unwrap();
    engine
        .analyze("adult for hernia repair", &AnalysisOptions::default())
        .unwrap();

    assert_eq!(engine.audit_len().unwrap(), 2);
    assert!(engine.verify_audit_chain().unwrap());
}

#[test]
fn medications_can_be_skipped() {
    let engine = seeded_engine();
    let options = AnalysisOptions {
        include_medications: false,
        ..AnalysisOptions::default()
    };
    let result = engine
        .analyze("5 year old with asthma for tonsillectomy", &options)
        .unwrap();
    assert!(result.medications.standard.is_empty());
    assert!(result.medications.draw_now.is_empty());
}

#[test]
fn citation_coverage_on_non_standard_buckets() {
    let engine = seeded_engine();
    let result = engine
        .analyze(
            "5-year-old male presenting for tonsillectomy. History significant \
             for asthma and recent URI 2 weeks ago.",
            &AnalysisOptions::default(),
        )
        .unwrap();

    for rec in result.medications.all() {
        if rec.bucket != MedBucket::Standard && !rec.unsupported {
            assert!(!rec.citations.is_empty(), "{} lacks citations", rec.token);
        }
    }
    for risk in &result.risks {
        if !risk.no_evidence {
            assert!(!risk.pmids().is_empty(), "{} lacks pmids", risk.outcome);
        }
    }
}

#[test]
fn pediatric_dose_rules_are_weight_based() {
    let engine = seeded_engine();
    let result = engine
        .analyze(
            "5-year-old male, 18 kg, for tonsillectomy with asthma.",
            &AnalysisOptions::default(),
        )
        .unwrap();

    assert!(result.demographics.age_years.unwrap() < 18.0);
    for rec in result.medications.all() {
        if rec.bucket == MedBucket::Contraindicated {
            continue;
        }
        if let Some(dose) = &rec.dose_rule {
            assert!(
                dose.contains("/kg") || dose.contains("{weight_kg}") || dose.contains("%"),
                "{} pediatric dose is not weight-based: {dose}",
                rec.token
            );
        }
    }
}
