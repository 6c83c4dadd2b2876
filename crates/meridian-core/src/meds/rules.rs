//! Medication rule table: trigger predicates, the built-in rule set, and
//! per-procedure standard formularies.

use crate::models::{
    AgeBand, Demographics, EvidenceGrade, ExtractedFactor, MedBucket, RiskAssessment, Urgency,
};

/// Inputs a predicate is evaluated against.
pub struct RuleContext<'a> {
    pub factors: &'a [ExtractedFactor],
    pub demographics: &'a Demographics,
    pub risks: &'a [RiskAssessment],
    /// Factors at or below this confidence (negated or dubious matches)
    /// do not trigger rules.
    pub confidence_floor: f64,
}

impl<'a> RuleContext<'a> {
    pub fn has_factor(&self, token: &str) -> bool {
        self.factors
            .iter()
            .any(|f| f.token == token && f.confidence > self.confidence_floor)
    }

    pub fn risk(&self, outcome: &str) -> Option<&RiskAssessment> {
        self.risks.iter().find(|r| r.outcome == outcome)
    }

    /// Age in years, taking a band-derived representative value when the
    /// numeric age was not stated ("adult", "toddler").
    pub fn effective_age(&self) -> Option<f64> {
        if let Some(age) = self.demographics.age_years {
            return Some(age);
        }
        match self.demographics.age_band {
            AgeBand::Lt1 => Some(0.5),
            AgeBand::Age1To5 => Some(3.0),
            AgeBand::Age6To12 => Some(9.0),
            AgeBand::Age13To17 => Some(15.0),
            AgeBand::Age18To64 => Some(40.0),
            AgeBand::Ge65 => Some(70.0),
            AgeBand::Unknown => None,
        }
    }
}

/// Closed predicate algebra over factors, risks, and demographics.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Factor(String),
    RiskAtLeast(String, f64),
    RiskRatioAtLeast(String, f64),
    AgeUnder(f64),
    AgeAtLeast(f64),
    UrgencyIs(Urgency),
    ProcedureIs(String),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn matches(&self, ctx: &RuleContext<'_>) -> bool {
        match self {
            Predicate::Factor(token) => ctx.has_factor(token),
            Predicate::RiskAtLeast(outcome, threshold) => ctx
                .risk(outcome)
                .and_then(|r| r.adjusted_risk)
                .map(|p| p >= *threshold)
                .unwrap_or(false),
            Predicate::RiskRatioAtLeast(outcome, threshold) => ctx
                .risk(outcome)
                .and_then(|r| r.risk_ratio)
                .map(|ratio| ratio >= *threshold)
                .unwrap_or(false),
            Predicate::AgeUnder(years) => {
                ctx.effective_age().map(|a| a < *years).unwrap_or(false)
            }
            Predicate::AgeAtLeast(years) => {
                ctx.effective_age().map(|a| a >= *years).unwrap_or(false)
            }
            Predicate::UrgencyIs(urgency) => ctx.demographics.urgency == *urgency,
            Predicate::ProcedureIs(token) => {
                ctx.demographics.procedure.as_deref() == Some(token.as_str())
            }
            Predicate::All(inner) => inner.iter().all(|p| p.matches(ctx)),
            Predicate::Any(inner) => inner.iter().any(|p| p.matches(ctx)),
        }
    }

    /// Factor tokens that actually satisfied this predicate, for the
    /// recommendation's `patient_factors` and contraindication
    /// justifications.
    pub fn collect_factors(&self, ctx: &RuleContext<'_>, out: &mut Vec<String>) {
        match self {
            Predicate::Factor(token) => {
                if ctx.has_factor(token) && !out.contains(token) {
                    out.push(token.clone());
                }
            }
            Predicate::All(inner) | Predicate::Any(inner) => {
                for p in inner {
                    p.collect_factors(ctx, out);
                }
            }
            _ => {}
        }
    }
}

/// One row of the rule table.
#[derive(Debug, Clone)]
pub struct MedRule {
    pub predicate: Predicate,
    /// Medication ontology token.
    pub medication: &'static str,
    pub bucket: MedBucket,
    pub indication: &'static str,
    pub dose_adult: Option<&'static str>,
    pub dose_pediatric: Option<&'static str>,
    pub grade: EvidenceGrade,
    pub citations: &'static [&'static str],
    pub justification: &'static str,
}

/// A standard-formulary item for a procedure.
#[derive(Debug, Clone)]
pub struct StandardItem {
    pub medication: &'static str,
    pub dose_adult: &'static str,
    pub dose_pediatric: &'static str,
    pub grade: EvidenceGrade,
}

/// Base STANDARD set per procedure token.
pub fn standard_set(procedure: &str) -> Vec<StandardItem> {
    match procedure {
        "TONSILLECTOMY" | "ADENOIDECTOMY" => vec![
            StandardItem {
                medication: "PROPOFOL",
                dose_adult: "1.5-2.5 mg/kg IV induction",
                dose_pediatric: "2.5-3.5 mg/kg IV induction ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "SEVOFLURANE",
                dose_adult: "0.5-3% inhaled maintenance",
                dose_pediatric: "2-3% inhaled maintenance",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "FENTANYL",
                dose_adult: "1-2 mcg/kg IV",
                dose_pediatric: "1 mcg/kg IV ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "DEXAMETHASONE",
                dose_adult: "4-8 mg IV",
                dose_pediatric: "0.5 mg/kg IV, max 8 mg ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "ONDANSETRON",
                dose_adult: "4 mg IV",
                dose_pediatric: "0.1 mg/kg IV ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
        ],
        "CABG" => vec![
            StandardItem {
                medication: "PROPOFOL",
                dose_adult: "1-1.5 mg/kg IV induction",
                dose_pediatric: "2 mg/kg IV induction ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "SEVOFLURANE",
                dose_adult: "0.5-2% inhaled maintenance",
                dose_pediatric: "2% inhaled maintenance",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "FENTANYL",
                dose_adult: "5-10 mcg/kg IV divided",
                dose_pediatric: "5 mcg/kg IV divided ({weight_kg} kg)",
                grade: EvidenceGrade::B,
            },
            StandardItem {
                medication: "MIDAZOLAM",
                dose_adult: "0.02-0.05 mg/kg IV",
                dose_pediatric: "0.05 mg/kg IV ({weight_kg} kg)",
                grade: EvidenceGrade::B,
            },
            StandardItem {
                medication: "CISATRACURIUM",
                dose_adult: "0.15-0.2 mg/kg IV",
                dose_pediatric: "0.15 mg/kg IV ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
        ],
        "HERNIA_REPAIR" => vec![
            StandardItem {
                medication: "PROPOFOL",
                dose_adult: "1.5-2.5 mg/kg IV induction",
                dose_pediatric: "2.5-3.5 mg/kg IV induction ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "SEVOFLURANE",
                dose_adult: "0.5-3% inhaled maintenance",
                dose_pediatric: "2-3% inhaled maintenance",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "FENTANYL",
                dose_adult: "1-2 mcg/kg IV",
                dose_pediatric: "1 mcg/kg IV ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "ONDANSETRON",
                dose_adult: "4 mg IV",
                dose_pediatric: "0.1 mg/kg IV ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
        ],
        "APPENDECTOMY" => vec![
            StandardItem {
                medication: "PROPOFOL",
                dose_adult: "1.5-2.5 mg/kg IV induction",
                dose_pediatric: "2.5-3.5 mg/kg IV induction ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "SEVOFLURANE",
                dose_adult: "0.5-3% inhaled maintenance",
                dose_pediatric: "2-3% inhaled maintenance",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "FENTANYL",
                dose_adult: "1-2 mcg/kg IV",
                dose_pediatric: "1 mcg/kg IV ({weight_kg} kg)",
                grade: EvidenceGrade::A,
            },
            StandardItem {
                medication: "ROCURONIUM",
                dose_adult: "0.6 mg/kg IV",
                dose_pediatric: "0.6 mg/kg IV ({weight_kg} kg)",
                grade: EvidenceGrade::B,
            },
        ],
        _ => Vec::new(),
    }
}

/// The built-in rule table. Evaluation order is the declaration order;
/// conflict resolution happens downstream.
pub fn default_rules() -> Vec<MedRule> {
    vec![
        MedRule {
            predicate: Predicate::Factor("ASTHMA".into()),
            medication: "ALBUTEROL",
            bucket: MedBucket::DrawNow,
            indication: "Bronchospasm prophylaxis and rescue",
            dose_adult: Some("2.5 mg nebulized pre-induction"),
            dose_pediatric: Some("0.15 mg/kg nebulized, max 2.5 mg ({weight_kg} kg)"),
            grade: EvidenceGrade::A,
            citations: &["PMID:20216394", "PMID:28045707"],
            justification: "Reactive airway disease raises perioperative bronchospasm risk",
        },
        MedRule {
            predicate: Predicate::Factor("RECENT_URI_2W".into()),
            medication: "ALBUTEROL",
            bucket: MedBucket::EnsureAvailable,
            indication: "Airway reactivity after recent URI",
            dose_adult: Some("2.5 mg nebulized"),
            dose_pediatric: Some("0.15 mg/kg nebulized, max 2.5 mg ({weight_kg} kg)"),
            grade: EvidenceGrade::B,
            citations: &["PMID:11573631"],
            justification: "Airway hyperreactivity persists for weeks after a URI",
        },
        MedRule {
            predicate: Predicate::Any(vec![
                Predicate::Factor("ASTHMA".into()),
                Predicate::Factor("RECENT_URI_2W".into()),
                Predicate::Factor("COPD".into()),
            ]),
            medication: "DESFLURANE",
            bucket: MedBucket::Contraindicated,
            indication: "Volatile maintenance",
            dose_adult: None,
            dose_pediatric: None,
            grade: EvidenceGrade::A,
            citations: &["PMID:18211826"],
            justification: "Pungent volatile provokes bronchospasm in reactive airways",
        },
        MedRule {
            predicate: Predicate::AgeUnder(18.0),
            medication: "SUCCINYLCHOLINE",
            bucket: MedBucket::Contraindicated,
            indication: "Neuromuscular blockade",
            dose_adult: None,
            dose_pediatric: None,
            grade: EvidenceGrade::A,
            citations: &["PMID:8424572"],
            justification: "Routine use in children risks hyperkalemic arrest with occult myopathy",
        },
        MedRule {
            predicate: Predicate::Factor("CKD".into()),
            medication: "SUCCINYLCHOLINE",
            bucket: MedBucket::Contraindicated,
            indication: "Neuromuscular blockade",
            dose_adult: None,
            dose_pediatric: None,
            grade: EvidenceGrade::A,
            citations: &["PMID:16690774"],
            justification: "Potassium release is hazardous with impaired renal clearance",
        },
        MedRule {
            predicate: Predicate::Any(vec![
                Predicate::Factor("CKD".into()),
                Predicate::RiskAtLeast("ACUTE_KIDNEY_INJURY".into(), 0.05),
            ]),
            medication: "KETOROLAC",
            bucket: MedBucket::Contraindicated,
            indication: "Nonsteroidal analgesia",
            dose_adult: None,
            dose_pediatric: None,
            grade: EvidenceGrade::A,
            citations: &["PMID:21676944"],
            justification: "NSAID nephrotoxicity in chronic kidney disease",
        },
        MedRule {
            predicate: Predicate::Any(vec![
                Predicate::Factor("CKD".into()),
                Predicate::RiskAtLeast("ACUTE_KIDNEY_INJURY".into(), 0.05),
            ]),
            medication: "IBUPROFEN",
            bucket: MedBucket::Contraindicated,
            indication: "Nonsteroidal analgesia",
            dose_adult: None,
            dose_pediatric: None,
            grade: EvidenceGrade::A,
            citations: &["PMID:21676944"],
            justification: "NSAID nephrotoxicity in chronic kidney disease",
        },
        MedRule {
            predicate: Predicate::RiskRatioAtLeast("LARYNGOSPASM".into(), 2.0),
            medication: "ATROPINE",
            bucket: MedBucket::EnsureAvailable,
            indication: "Laryngospasm rescue adjunct",
            dose_adult: Some("0.5 mg IV"),
            dose_pediatric: Some("0.02 mg/kg IV, min 0.1 mg ({weight_kg} kg)"),
            grade: EvidenceGrade::B,
            citations: &["PMID:18811039"],
            justification: "Elevated laryngospasm risk for this case",
        },
        MedRule {
            predicate: Predicate::RiskRatioAtLeast("LARYNGOSPASM".into(), 3.0),
            medication: "EPINEPHRINE",
            bucket: MedBucket::EnsureAvailable,
            indication: "Airway emergency standby",
            dose_adult: Some("10-100 mcg IV titrated"),
            dose_pediatric: Some("1 mcg/kg IV titrated ({weight_kg} kg)"),
            grade: EvidenceGrade::B,
            citations: &["PMID:18811039"],
            justification: "High laryngospasm risk warrants immediate vasoactive availability",
        },
        MedRule {
            predicate: Predicate::Factor("OSA".into()),
            medication: "DEXMEDETOMIDINE",
            bucket: MedBucket::Consider,
            indication: "Opioid-sparing sedation",
            dose_adult: Some("0.5-1 mcg/kg IV over 10 min"),
            dose_pediatric: Some("0.5 mcg/kg IV over 10 min ({weight_kg} kg)"),
            grade: EvidenceGrade::B,
            citations: &["PMID:24253425"],
            justification: "Obstructive sleep apnea favors opioid-sparing technique",
        },
        MedRule {
            predicate: Predicate::Factor("HEART_FAILURE".into()),
            medication: "ETOMIDATE",
            bucket: MedBucket::Consider,
            indication: "Hemodynamically stable induction",
            dose_adult: Some("0.2-0.3 mg/kg IV"),
            dose_pediatric: Some("0.3 mg/kg IV ({weight_kg} kg)"),
            grade: EvidenceGrade::C,
            citations: &["PMID:25501689"],
            justification: "Reduced ejection fraction tolerates etomidate induction better",
        },
        MedRule {
            predicate: Predicate::All(vec![
                Predicate::AgeAtLeast(18.0),
                Predicate::Any(vec![
                    Predicate::Factor("GERD".into()),
                    Predicate::UrgencyIs(Urgency::Emergent),
                ]),
            ]),
            medication: "SUCCINYLCHOLINE",
            bucket: MedBucket::Consider,
            indication: "Rapid sequence induction",
            dose_adult: Some("1-1.5 mg/kg IV"),
            dose_pediatric: None,
            grade: EvidenceGrade::B,
            citations: &["PMID:26161324"],
            justification: "Aspiration risk favors rapid sequence induction",
        },
        MedRule {
            predicate: Predicate::RiskRatioAtLeast("PONV".into(), 1.5),
            medication: "DEXAMETHASONE",
            bucket: MedBucket::Consider,
            indication: "PONV prophylaxis",
            dose_adult: Some("4-8 mg IV"),
            dose_pediatric: Some("0.15 mg/kg IV ({weight_kg} kg)"),
            grade: EvidenceGrade::A,
            citations: &["PMID:32049362"],
            justification: "Elevated PONV risk justifies combination prophylaxis",
        },
    ]
}
