//! Source study records and evidence grading.

use serde::{Deserialize, Serialize};

/// Study design taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudyDesign {
    Rct,
    MetaAnalysis,
    Cohort,
    CaseControl,
    CaseSeries,
    Other,
}

impl StudyDesign {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyDesign::Rct => "RCT",
            StudyDesign::MetaAnalysis => "META_ANALYSIS",
            StudyDesign::Cohort => "COHORT",
            StudyDesign::CaseControl => "CASE_CONTROL",
            StudyDesign::CaseSeries => "CASE_SERIES",
            StudyDesign::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RCT" => Some(StudyDesign::Rct),
            "META_ANALYSIS" => Some(StudyDesign::MetaAnalysis),
            "COHORT" => Some(StudyDesign::Cohort),
            "CASE_CONTROL" => Some(StudyDesign::CaseControl),
            "CASE_SERIES" => Some(StudyDesign::CaseSeries),
            "OTHER" => Some(StudyDesign::Other),
            _ => None,
        }
    }
}

/// Study or request population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Population {
    Pediatric,
    Adult,
    Obstetric,
    Mixed,
}

impl Population {
    pub fn as_str(&self) -> &'static str {
        match self {
            Population::Pediatric => "PEDIATRIC",
            Population::Adult => "ADULT",
            Population::Obstetric => "OBSTETRIC",
            Population::Mixed => "MIXED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PEDIATRIC" => Some(Population::Pediatric),
            "ADULT" => Some(Population::Adult),
            "OBSTETRIC" => Some(Population::Obstetric),
            "MIXED" => Some(Population::Mixed),
            _ => None,
        }
    }

    /// Study weight multiplier against a target population.
    /// Exact match 1.0, MIXED 0.6, mismatch 0.3.
    pub fn match_weight(&self, target: Population) -> f64 {
        if *self == target {
            1.0
        } else if *self == Population::Mixed {
            0.6
        } else {
            0.3
        }
    }
}

/// A-D evidence quality tier. Ordering: A is best (`A < B < C < D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EvidenceGrade {
    A,
    B,
    C,
    D,
}

impl EvidenceGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceGrade::A => "A",
            EvidenceGrade::B => "B",
            EvidenceGrade::C => "C",
            EvidenceGrade::D => "D",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(EvidenceGrade::A),
            "B" => Some(EvidenceGrade::B),
            "C" => Some(EvidenceGrade::C),
            "D" => Some(EvidenceGrade::D),
            _ => None,
        }
    }

    /// Deterministic grade from design and size:
    /// A = systematic review or large RCT (n >= 500), B = RCT or large
    /// cohort (n >= 200), C = smaller cohort or case-control, D = case
    /// series / expert. Decays one level on population mismatch.
    pub fn derive(design: StudyDesign, n_total: u32, population_mismatch: bool) -> Self {
        let base = match design {
            StudyDesign::MetaAnalysis => EvidenceGrade::A,
            StudyDesign::Rct if n_total >= 500 => EvidenceGrade::A,
            StudyDesign::Rct => EvidenceGrade::B,
            StudyDesign::Cohort if n_total >= 200 => EvidenceGrade::B,
            StudyDesign::Cohort | StudyDesign::CaseControl => EvidenceGrade::C,
            StudyDesign::CaseSeries | StudyDesign::Other => EvidenceGrade::D,
        };
        if population_mismatch {
            base.decay()
        } else {
            base
        }
    }

    /// One level worse, saturating at D.
    pub fn decay(&self) -> Self {
        match self {
            EvidenceGrade::A => EvidenceGrade::B,
            EvidenceGrade::B => EvidenceGrade::C,
            EvidenceGrade::C | EvidenceGrade::D => EvidenceGrade::D,
        }
    }
}

/// A source study record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub pmid: String,
    pub title: String,
    pub year: u16,
    pub design: StudyDesign,
    pub n_total: u32,
    pub population: Population,
    /// Free label (e.g. "24h", "30d", "inhospital").
    pub time_horizon: String,
    pub evidence_grade: EvidenceGrade,
    /// Methodological quality in [0, 1].
    pub quality_score: f64,
}

impl Paper {
    pub fn new(pmid: &str, title: &str, year: u16, design: StudyDesign, n_total: u32, population: Population) -> Self {
        Self {
            pmid: pmid.to_string(),
            title: title.to_string(),
            year,
            design,
            n_total,
            population,
            time_horizon: "inhospital".to_string(),
            evidence_grade: EvidenceGrade::derive(design, n_total, false),
            quality_score: 0.8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_derivation() {
        assert_eq!(
            EvidenceGrade::derive(StudyDesign::MetaAnalysis, 0, false),
            EvidenceGrade::A
        );
        assert_eq!(
            EvidenceGrade::derive(StudyDesign::Rct, 800, false),
            EvidenceGrade::A
        );
        assert_eq!(
            EvidenceGrade::derive(StudyDesign::Rct, 120, false),
            EvidenceGrade::B
        );
        assert_eq!(
            EvidenceGrade::derive(StudyDesign::Cohort, 500, false),
            EvidenceGrade::B
        );
        assert_eq!(
            EvidenceGrade::derive(StudyDesign::Cohort, 80, false),
            EvidenceGrade::C
        );
        assert_eq!(
            EvidenceGrade::derive(StudyDesign::CaseSeries, 10, false),
            EvidenceGrade::D
        );
    }

    #[test]
    fn test_grade_decay_on_population_mismatch() {
        assert_eq!(
            EvidenceGrade::derive(StudyDesign::Rct, 800, true),
            EvidenceGrade::B
        );
        assert_eq!(
            EvidenceGrade::derive(StudyDesign::CaseSeries, 10, true),
            EvidenceGrade::D
        );
    }

    #[test]
    fn test_grade_ordering_a_is_best() {
        assert!(EvidenceGrade::A < EvidenceGrade::B);
        assert!(EvidenceGrade::C < EvidenceGrade::D);
    }

    #[test]
    fn test_population_match_weight() {
        assert_eq!(Population::Pediatric.match_weight(Population::Pediatric), 1.0);
        assert_eq!(Population::Mixed.match_weight(Population::Pediatric), 0.6);
        assert_eq!(Population::Adult.match_weight(Population::Pediatric), 0.3);
    }
}
