//! Medication recommendation outputs.

use serde::{Deserialize, Serialize};

use super::EvidenceGrade;

/// Recommendation bucket. Conflict priority is declaration order:
/// CONTRAINDICATED beats everything, STANDARD loses to everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MedBucket {
    Contraindicated,
    DrawNow,
    Consider,
    EnsureAvailable,
    Standard,
}

impl MedBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            MedBucket::Contraindicated => "CONTRAINDICATED",
            MedBucket::DrawNow => "DRAW_NOW",
            MedBucket::Consider => "CONSIDER",
            MedBucket::EnsureAvailable => "ENSURE_AVAILABLE",
            MedBucket::Standard => "STANDARD",
        }
    }
}

/// A single medication recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationRecommendation {
    /// Ontology token.
    pub token: String,
    pub generic_name: String,
    pub bucket: MedBucket,
    pub indication: String,
    /// Symbolic dose string; may contain `{weight_kg}` / `{age_years}`
    /// placeholders until resolved against demographics.
    pub dose_rule: Option<String>,
    pub evidence_grade: EvidenceGrade,
    /// Factors that triggered this recommendation.
    pub patient_factors: Vec<String>,
    /// PMIDs or guideline ids.
    pub citations: Vec<String>,
    pub justification: String,
    /// Dose rule needed a weight the request did not provide.
    pub missing_weight: bool,
    /// Non-STANDARD recommendation that arrived without a citation and was
    /// downgraded to CONSIDER.
    pub unsupported: bool,
}

/// The five-bucket recommendation set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MedicationPlan {
    pub standard: Vec<MedicationRecommendation>,
    pub draw_now: Vec<MedicationRecommendation>,
    pub consider: Vec<MedicationRecommendation>,
    pub ensure_available: Vec<MedicationRecommendation>,
    pub contraindicated: Vec<MedicationRecommendation>,
}

impl MedicationPlan {
    pub fn bucket(&self, bucket: MedBucket) -> &Vec<MedicationRecommendation> {
        match bucket {
            MedBucket::Standard => &self.standard,
            MedBucket::DrawNow => &self.draw_now,
            MedBucket::Consider => &self.consider,
            MedBucket::EnsureAvailable => &self.ensure_available,
            MedBucket::Contraindicated => &self.contraindicated,
        }
    }

    pub fn bucket_mut(&mut self, bucket: MedBucket) -> &mut Vec<MedicationRecommendation> {
        match bucket {
            MedBucket::Standard => &mut self.standard,
            MedBucket::DrawNow => &mut self.draw_now,
            MedBucket::Consider => &mut self.consider,
            MedBucket::EnsureAvailable => &mut self.ensure_available,
            MedBucket::Contraindicated => &mut self.contraindicated,
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &MedicationRecommendation> {
        self.standard
            .iter()
            .chain(self.draw_now.iter())
            .chain(self.consider.iter())
            .chain(self.ensure_available.iter())
            .chain(self.contraindicated.iter())
    }

    pub fn contains(&self, bucket: MedBucket, token: &str) -> bool {
        self.bucket(bucket).iter().any(|m| m.token == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_priority_order() {
        assert!(MedBucket::Contraindicated < MedBucket::DrawNow);
        assert!(MedBucket::DrawNow < MedBucket::Consider);
        assert!(MedBucket::Consider < MedBucket::EnsureAvailable);
        assert!(MedBucket::EnsureAvailable < MedBucket::Standard);
    }

    #[test]
    fn test_plan_lookup() {
        let mut plan = MedicationPlan::default();
        plan.draw_now.push(MedicationRecommendation {
            token: "ALBUTEROL".into(),
            generic_name: "Albuterol".into(),
            bucket: MedBucket::DrawNow,
            indication: "Bronchospasm prophylaxis".into(),
            dose_rule: Some("2.5 mg nebulized".into()),
            evidence_grade: EvidenceGrade::A,
            patient_factors: vec!["ASTHMA".into()],
            citations: vec!["PMID:100".into()],
            justification: "Reactive airway".into(),
            missing_weight: false,
            unsupported: false,
        });
        assert!(plan.contains(MedBucket::DrawNow, "ALBUTEROL"));
        assert!(!plan.contains(MedBucket::Standard, "ALBUTEROL"));
        assert_eq!(plan.all().count(), 1);
    }
}
