//! Risk calculator.
//!
//! Per request: resolve the context tuple, look up the pooled baseline for
//! each outcome, fold in confidence-weighted modifier odds ratios, cap to
//! clinical plausibility, and propagate variance into a probability CI.
//! Cooperative cancellation and the wall-clock budget are checked between
//! outcomes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::RiskConfig;
use crate::models::{
    ContextLabel, ContributingFactor, Degradation, Demographics, EvidenceGrade, ExtractedFactor,
    Population, RiskAssessment,
};
use crate::ontology::Ontology;
use crate::pooling::{convert, EvidenceSnapshot};

/// Cooperative cancel token shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a risk-calculation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskOutput {
    pub assessments: Vec<RiskAssessment>,
    pub degradations: Vec<Degradation>,
    pub timed_out: bool,
    pub cancelled: bool,
}

/// Derive the request's context tuple from demographics, the matched
/// procedure, and the factor set. A pregnancy factor overrides the
/// age-derived population.
pub fn resolve_context(
    demographics: &Demographics,
    factors: &[ExtractedFactor],
    ontology: &Ontology,
) -> ContextLabel {
    let pregnant = factors
        .iter()
        .any(|f| f.token == "PREGNANCY" && f.confidence > 0.5);
    let population = if pregnant {
        Some(Population::Obstetric)
    } else {
        demographics.population()
    };

    let case_type = demographics
        .procedure
        .as_deref()
        .and_then(|token| ontology.term(token))
        .map(|term| term.category.clone());

    ContextLabel::new(population, case_type.as_deref(), Some(demographics.urgency))
}

/// Short-lived per-request calculator borrowing the pinned snapshot.
pub struct RiskCalculator<'a> {
    snapshot: &'a EvidenceSnapshot,
    config: &'a RiskConfig,
    ontology: &'a Ontology,
}

impl<'a> RiskCalculator<'a> {
    pub fn new(snapshot: &'a EvidenceSnapshot, ontology: &'a Ontology, config: &'a RiskConfig) -> Self {
        Self {
            snapshot,
            config,
            ontology,
        }
    }

    /// Assess every outcome the snapshot carries evidence for.
    pub fn assess(
        &self,
        factors: &[ExtractedFactor],
        context: &ContextLabel,
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> RiskOutput {
        let mut assessments = Vec::new();
        let mut degradations = Vec::new();
        let mut timed_out = false;

        for outcome in self.snapshot.outcomes() {
            if cancel.is_cancelled() {
                // Cancellation discards partial results.
                return RiskOutput {
                    assessments: Vec::new(),
                    degradations: vec![Degradation::Cancelled],
                    timed_out: false,
                    cancelled: true,
                };
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    degradations.push(Degradation::Timeout {
                        completed_outcomes: assessments.len(),
                    });
                    timed_out = true;
                    break;
                }
            }

            let (assessment, mut degs) = self.assess_outcome(&outcome, factors, context);
            assessments.push(assessment);
            degradations.append(&mut degs);
        }

        RiskOutput {
            assessments,
            degradations,
            timed_out,
            cancelled: false,
        }
    }

    fn assess_outcome(
        &self,
        outcome: &str,
        factors: &[ExtractedFactor],
        context: &ContextLabel,
    ) -> (RiskAssessment, Vec<Degradation>) {
        let label = self
            .ontology
            .term(outcome)
            .map(|t| t.plain_label.clone())
            .unwrap_or_else(|| outcome.to_string());

        let baseline = match self.snapshot.baseline(outcome, context) {
            Some(b) => b,
            None => {
                let degradation = if self.snapshot.baseline_unavailable(outcome, context) {
                    Degradation::PoolingUnavailable {
                        outcome: outcome.to_string(),
                        modifier: None,
                    }
                } else {
                    Degradation::EvidenceMissing {
                        outcome: outcome.to_string(),
                        context: context.to_string(),
                    }
                };
                return (RiskAssessment::no_evidence(outcome, &label), vec![degradation]);
            }
        };

        let mut degradations = Vec::new();
        let mut log_or_sum = 0.0;
        let mut variance = baseline.logit_variance;
        let mut grades = vec![baseline.grade];
        let mut contributing = Vec::new();

        for factor in factors {
            let effect = match self.snapshot.effect(outcome, &factor.token, context) {
                Some(e) => e,
                None => {
                    if self.snapshot.effect_unavailable(outcome, &factor.token, context) {
                        degradations.push(Degradation::PoolingUnavailable {
                            outcome: outcome.to_string(),
                            modifier: Some(factor.token.clone()),
                        });
                    }
                    continue;
                }
            };
            let confidence = factor.confidence.clamp(0.0, 1.0);
            // Confidence-weighted composition: o <- o * r^c, so weak
            // extractions cannot dominate.
            log_or_sum += confidence * effect.or_mean.ln();
            variance += confidence * confidence * effect.log_variance;
            grades.push(effect.grade);
            contributing.push(ContributingFactor {
                factor: factor.token.clone(),
                odds_ratio: effect.or_mean,
                ci_low: effect.or_ci_low,
                ci_high: effect.or_ci_high,
                confidence,
                grade: effect.grade,
                pmids: effect.pmids.clone(),
            });
        }

        let p0 = baseline.p0;
        let raw = convert::inv_logit(convert::logit(p0) + log_or_sum);
        let cap = self
            .config
            .caps
            .max_probability
            .min(self.config.caps.max_risk_ratio * p0);
        let adjusted = raw.min(cap);
        let capped = adjusted < raw;
        if capped {
            tracing::warn!(
                outcome,
                raw_risk = raw,
                capped_risk = adjusted,
                "plausibility cap engaged"
            );
            degradations.push(Degradation::RiskCapped {
                outcome: outcome.to_string(),
            });
        }

        let half = 1.96 * variance.sqrt();
        let center = convert::logit(adjusted);
        let assessment = RiskAssessment {
            outcome: outcome.to_string(),
            outcome_label: label,
            baseline_risk: Some(p0),
            adjusted_risk: Some(adjusted),
            ci_low: Some(convert::inv_logit(center - half)),
            ci_high: Some(convert::inv_logit(center + half)),
            risk_ratio: Some(adjusted / p0),
            evidence_grade: Some(best_grade(&grades)),
            context: Some(baseline.context.to_string()),
            baseline_pmids: baseline.pmids.clone(),
            contributing_factors: contributing,
            no_evidence: false,
            capped,
        };
        (assessment, degradations)
    }
}

/// First of A-D actually present among the contributing grades: the
/// assessment reports the best tier any of its inputs reaches.
fn best_grade(grades: &[EvidenceGrade]) -> EvidenceGrade {
    for grade in [
        EvidenceGrade::A,
        EvidenceGrade::B,
        EvidenceGrade::C,
        EvidenceGrade::D,
    ] {
        if grades.contains(&grade) {
            return grade;
        }
    }
    EvidenceGrade::D
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolingConfig;
    use crate::models::{
        AgeBand, EffectMeasure, Estimate, Paper, Population, Sex, StudyDesign, Urgency,
    };
    use crate::pooling::build_snapshot;
    use std::collections::HashMap;
    use std::time::Duration;

    fn peds_ent() -> ContextLabel {
        ContextLabel::new(Some(Population::Pediatric), Some("ENT"), Some(Urgency::Elective))
    }

    fn papers() -> HashMap<String, Paper> {
        [
            ("100", Paper::new("100", "Baseline study", 2021, StudyDesign::Rct, 900, Population::Pediatric)),
            ("101", Paper::new("101", "Cohort study", 2020, StudyDesign::Cohort, 400, Population::Pediatric)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn baseline_est(id: &str, pmid: &str, p: f64) -> Estimate {
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

    fn effect_est(id: &str, pmid: &str, modifier: &str, or: f64) -> Estimate {
        Estimate {
            id: id.into(),
            pmid: pmid.into(),
            outcome_token: "LARYNGOSPASM".into(),
            modifier_token: Some(modifier.into()),
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

    fn snapshot() -> EvidenceSnapshot {
        let estimates = vec![
            baseline_est("b1", "100", 0.015),
            baseline_est("b2", "101", 0.022),
            effect_est("m1", "100", "ASTHMA", 2.2),
            effect_est("m2", "101", "ASTHMA", 2.8),
            effect_est("m3", "100", "RECENT_URI_2W", 3.0),
            effect_est("m4", "101", "RECENT_URI_2W", 3.4),
        ];
        build_snapshot("v2025.01", &estimates, &papers(), &PoolingConfig::default())
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

    fn demographics() -> Demographics {
        Demographics {
            age_years: Some(5.0),
            age_band: AgeBand::Age1To5,
            sex: Some(Sex::Male),
            procedure: Some("TONSILLECTOMY".into()),
            urgency: Urgency::Elective,
            weight_kg: Some(18.0),
        }
    }

    #[test]
    fn test_resolve_context() {
        let ontology = Ontology::builtin();
        let ctx = resolve_context(&demographics(), &[], &ontology);
        assert_eq!(ctx.to_string(), "PEDIATRIC×ENT×ELECTIVE");
    }

    #[test]
    fn test_resolve_context_pregnancy_overrides() {
        let ontology = Ontology::builtin();
        let mut demo = demographics();
        demo.age_years = Some(30.0);
        demo.age_band = AgeBand::Age18To64;
        demo.procedure = Some("CESAREAN_SECTION".into());
        let ctx = resolve_context(&demo, &[factor("PREGNANCY", 0.95)], &ontology);
        assert_eq!(ctx.to_string(), "OBSTETRIC×OBSTETRIC×ELECTIVE");
    }

    #[test]
    fn test_factors_raise_risk() {
        let snap = snapshot();
        let ontology = Ontology::builtin();
        let config = RiskConfig::standard();
        let calc = RiskCalculator::new(&snap, &ontology, &config);

        let bare = calc.assess(&[], &peds_ent(), &CancelToken::new(), None);
        let with_factors = calc.assess(
            &[factor("ASTHMA", 0.95), factor("RECENT_URI_2W", 0.95)],
            &peds_ent(),
            &CancelToken::new(),
            None,
        );

        let bare_risk = bare.assessments[0].adjusted_risk.unwrap();
        let adj = &with_factors.assessments[0];
        assert!(adj.adjusted_risk.unwrap() > bare_risk);
        assert!(adj.risk_ratio.unwrap() > 3.0);
        assert_eq!(adj.contributing_factors.len(), 2);
        assert!(!adj.pmids().is_empty());
    }

    #[test]
    fn test_low_confidence_contributes_less() {
        let snap = snapshot();
        let ontology = Ontology::builtin();
        let config = RiskConfig::standard();
        let calc = RiskCalculator::new(&snap, &ontology, &config);

        let strong = calc.assess(&[factor("ASTHMA", 0.95)], &peds_ent(), &CancelToken::new(), None);
        let weak = calc.assess(&[factor("ASTHMA", 0.1)], &peds_ent(), &CancelToken::new(), None);

        assert!(
            strong.assessments[0].adjusted_risk.unwrap()
                > weak.assessments[0].adjusted_risk.unwrap()
        );
    }

    #[test]
    fn test_caps_engage() {
        let snap = snapshot();
        let ontology = Ontology::builtin();
        // A tight ratio cap forces the clamp with ordinary factors.
        let mut config = RiskConfig::standard();
        config.caps.max_risk_ratio = 1.5;
        let calc = RiskCalculator::new(&snap, &ontology, &config);

        let out = calc.assess(
            &[factor("ASTHMA", 0.95), factor("RECENT_URI_2W", 0.95)],
            &peds_ent(),
            &CancelToken::new(),
            None,
        );
        let a = &out.assessments[0];
        assert!(a.capped);
        assert!(a.risk_ratio.unwrap() <= 1.5 + 1e-9);
        assert!(out
            .degradations
            .iter()
            .any(|d| matches!(d, Degradation::RiskCapped { .. })));
    }

    #[test]
    fn test_empty_snapshot_assesses_nothing() {
        let ontology = Ontology::builtin();
        let config = RiskConfig::standard();
        let empty = build_snapshot("v2025.01", &[], &HashMap::new(), &PoolingConfig::default());
        let calc = RiskCalculator::new(&empty, &ontology, &config);
        let out = calc.assess(&[], &peds_ent(), &CancelToken::new(), None);
        assert!(out.assessments.is_empty());
    }

    #[test]
    fn test_cancellation_discards_partials() {
        let snap = snapshot();
        let ontology = Ontology::builtin();
        let config = RiskConfig::standard();
        let calc = RiskCalculator::new(&snap, &ontology, &config);

        let cancel = CancelToken::new();
        cancel.cancel();
        let out = calc.assess(&[], &peds_ent(), &cancel, None);
        assert!(out.cancelled);
        assert!(out.assessments.is_empty());
        assert_eq!(out.degradations, vec![Degradation::Cancelled]);
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let snap = snapshot();
        let ontology = Ontology::builtin();
        let config = RiskConfig::standard();
        let calc = RiskCalculator::new(&snap, &ontology, &config);

        let past = Instant::now() - Duration::from_millis(1);
        let out = calc.assess(&[], &peds_ent(), &CancelToken::new(), Some(past));
        assert!(out.timed_out);
        assert!(out
            .degradations
            .iter()
            .any(|d| matches!(d, Degradation::Timeout { .. })));
    }

    #[test]
    fn test_best_grade_selected() {
        let snap = snapshot();
        let ontology = Ontology::builtin();
        let config = RiskConfig::standard();
        let calc = RiskCalculator::new(&snap, &ontology, &config);

        let out = calc.assess(&[factor("ASTHMA", 0.95)], &peds_ent(), &CancelToken::new(), None);
        let a = &out.assessments[0];
        // The assessment reports the best tier among baseline + modifiers
        let baseline_grade = snap.baseline("LARYNGOSPASM", &peds_ent()).unwrap().grade;
        let modifier_grade = snap
            .effect("LARYNGOSPASM", "ASTHMA", &peds_ent())
            .unwrap()
            .grade;
        assert_eq!(
            a.evidence_grade.unwrap(),
            baseline_grade.min(modifier_grade)
        );
    }

    #[test]
    fn test_best_grade_prefers_a_over_d() {
        assert_eq!(
            best_grade(&[EvidenceGrade::D, EvidenceGrade::A]),
            EvidenceGrade::A
        );
        assert_eq!(
            best_grade(&[EvidenceGrade::C, EvidenceGrade::B]),
            EvidenceGrade::B
        );
        assert_eq!(best_grade(&[]), EvidenceGrade::D);
    }
}
