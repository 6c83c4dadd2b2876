//! Medication decider.
//!
//! Builds the five-bucket recommendation set: per-procedure STANDARD base,
//! rule-table matches, contraindication-wins conflict resolution, dose
//! resolution, citation enforcement, and deterministic ordering.

mod dosing;
mod rules;

pub use dosing::{resolve_dose_rule, ResolvedDose};
pub use rules::{default_rules, standard_set, MedRule, Predicate, RuleContext, StandardItem};

use std::collections::BTreeMap;

use crate::config::RiskConfig;
use crate::models::{
    Demographics, ExtractedFactor, MedBucket, MedicationPlan, MedicationRecommendation,
    RiskAssessment,
};
use crate::ontology::Ontology;

/// Rule-driven planner over the built-in formulary.
pub struct MedicationPlanner<'a> {
    ontology: &'a Ontology,
    config: &'a RiskConfig,
    rules: Vec<MedRule>,
}

impl<'a> MedicationPlanner<'a> {
    pub fn new(ontology: &'a Ontology, config: &'a RiskConfig) -> Self {
        Self::with_rules(ontology, config, default_rules())
    }

    /// Planner over a caller-supplied rule table.
    pub fn with_rules(ontology: &'a Ontology, config: &'a RiskConfig, rules: Vec<MedRule>) -> Self {
        Self {
            ontology,
            config,
            rules,
        }
    }

    /// Produce the bucketed recommendation set.
    pub fn plan(
        &self,
        factors: &[ExtractedFactor],
        demographics: &Demographics,
        risks: &[RiskAssessment],
    ) -> MedicationPlan {
        let ctx = RuleContext {
            factors,
            demographics,
            risks,
            confidence_floor: self.config.med_rule_confidence_floor,
        };
        let pediatric = ctx.effective_age().map(|a| a < 18.0).unwrap_or(false);

        let mut candidates: Vec<MedicationRecommendation> = Vec::new();

        // 1. Base STANDARD set for the procedure.
        if let Some(procedure) = demographics.procedure.as_deref() {
            let indication = match self.ontology.term(procedure) {
                Some(term) => format!("Standard for {}", term.plain_label.to_lowercase()),
                None => "Standard for procedure".to_string(),
            };
            for item in standard_set(procedure) {
                let dose = if pediatric {
                    item.dose_pediatric
                } else {
                    item.dose_adult
                };
                let resolved = resolve_dose_rule(dose, demographics);
                candidates.push(MedicationRecommendation {
                    token: item.medication.to_string(),
                    generic_name: self.generic_name(item.medication),
                    bucket: MedBucket::Standard,
                    indication: indication.clone(),
                    dose_rule: Some(resolved.text),
                    evidence_grade: item.grade,
                    patient_factors: Vec::new(),
                    citations: Vec::new(),
                    justification: indication.clone(),
                    missing_weight: resolved.missing_weight,
                    unsupported: false,
                });
            }
        }

        // 2. Rule-table matches.
        for rule in &self.rules {
            if !rule.predicate.matches(&ctx) {
                continue;
            }
            let mut patient_factors = Vec::new();
            rule.predicate.collect_factors(&ctx, &mut patient_factors);

            let dose = if pediatric {
                rule.dose_pediatric.or(rule.dose_adult)
            } else {
                rule.dose_adult
            };
            let resolved = dose.map(|d| resolve_dose_rule(d, demographics));

            let mut rec = MedicationRecommendation {
                token: rule.medication.to_string(),
                generic_name: self.generic_name(rule.medication),
                bucket: rule.bucket,
                indication: rule.indication.to_string(),
                dose_rule: resolved.as_ref().map(|d| d.text.clone()),
                evidence_grade: rule.grade,
                patient_factors,
                citations: rule.citations.iter().map(|c| c.to_string()).collect(),
                justification: rule.justification.to_string(),
                missing_weight: resolved.map(|d| d.missing_weight).unwrap_or(false),
                unsupported: false,
            };

            // Citation enforcement: a non-STANDARD recommendation without a
            // citation is downgraded rather than emitted unsupported.
            if rec.bucket != MedBucket::Standard && rec.citations.is_empty() {
                rec.bucket = MedBucket::Consider;
                rec.unsupported = true;
            }

            candidates.push(rec);
        }

        self.resolve_conflicts(candidates)
    }

    /// One recommendation per medication: the highest-priority bucket wins,
    /// and CONTRAINDICATED removes the medication from every lower bucket
    /// with the blocking factors on its justification.
    fn resolve_conflicts(&self, candidates: Vec<MedicationRecommendation>) -> MedicationPlan {
        let mut by_token: BTreeMap<String, Vec<MedicationRecommendation>> = BTreeMap::new();
        for rec in candidates {
            by_token.entry(rec.token.clone()).or_default().push(rec);
        }

        let mut plan = MedicationPlan::default();
        for (_, mut recs) in by_token {
            let winning_bucket = recs.iter().map(|r| r.bucket).min().unwrap_or(MedBucket::Standard);
            let winner_idx = recs
                .iter()
                .position(|r| r.bucket == winning_bucket)
                .unwrap_or(0);
            let mut winner = recs.remove(winner_idx);

            if winner.bucket == MedBucket::Contraindicated && !winner.patient_factors.is_empty() {
                winner.justification = format!(
                    "{} (blocking: {})",
                    winner.justification,
                    winner.patient_factors.join(", ")
                );
            }
            plan.bucket_mut(winner.bucket).push(winner);
        }

        // Deterministic ordering: grade A->D, then token.
        for bucket in [
            MedBucket::Standard,
            MedBucket::DrawNow,
            MedBucket::Consider,
            MedBucket::EnsureAvailable,
            MedBucket::Contraindicated,
        ] {
            plan.bucket_mut(bucket)
                .sort_by(|a, b| (a.evidence_grade, &a.token).cmp(&(b.evidence_grade, &b.token)));
        }
        plan
    }

    fn generic_name(&self, token: &str) -> String {
        self.ontology
            .term(token)
            .map(|t| t.plain_label.clone())
            .unwrap_or_else(|| token.to_string())
    }
}
