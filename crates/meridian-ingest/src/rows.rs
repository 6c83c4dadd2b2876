//! Raw study-row records and their conversion into store types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use meridian_core::models::{
    ContextLabel, EffectMeasure, Population, StudyDesign,
};
use meridian_core::pooling::convert::haldane_anscombe_log_or;
use meridian_core::{Estimate, EvidenceGrade, Paper};

/// Ingestion errors.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid payload format: {0}")]
    InvalidFormat(String),

    #[error("Unknown value in record {record}: {detail}")]
    UnknownValue { record: String, detail: String },
}

/// One raw per-study record as handed off by the abstract extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStudyRecord {
    pub pmid: String,
    pub title: String,
    pub year: u16,
    pub design: String,
    pub n_total: u32,
    pub population: String,
    #[serde(default)]
    pub time_horizon: Option<String>,
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub effects: Vec<RawEffectRow>,
}

/// One quantitative finding inside a study record. Rows either carry a
/// point estimate (with optional CI) or a 2x2 table to derive one from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEffectRow {
    pub outcome: String,
    #[serde(default)]
    pub modifier: Option<String>,
    pub measure: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub ci_low: Option<f64>,
    #[serde(default)]
    pub ci_high: Option<f64>,
    #[serde(default)]
    pub adjusted: Option<bool>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub quality_weight: Option<f64>,
    #[serde(default)]
    pub extraction_confidence: Option<f64>,
    #[serde(default)]
    pub events_exposed: Option<u32>,
    #[serde(default)]
    pub n_exposed: Option<u32>,
    #[serde(default)]
    pub events_control: Option<u32>,
    #[serde(default)]
    pub n_control: Option<u32>,
}

/// Parse a study-row payload. The upstream extractor sometimes wraps the
/// array in prose, so the parser slices from the first `[` to the last `]`.
pub fn parse_study_rows(payload: &str) -> Result<Vec<RawStudyRecord>, IngestError> {
    let start = payload
        .find('[')
        .ok_or_else(|| IngestError::InvalidFormat("no JSON array found in payload".into()))?;
    let end = payload
        .rfind(']')
        .ok_or_else(|| IngestError::InvalidFormat("no closing bracket found in payload".into()))?;
    if end < start {
        return Err(IngestError::InvalidFormat("malformed bracketing".into()));
    }

    let records: Vec<RawStudyRecord> = serde_json::from_str(&payload[start..=end])?;
    Ok(records)
}

/// Convert raw records into store types. Grades are derived from design
/// and size; effect rows without a point estimate fall back to their 2x2
/// table via the Haldane-Anscombe correction.
pub fn to_evidence(records: &[RawStudyRecord]) -> Result<(Vec<Paper>, Vec<Estimate>), IngestError> {
    let mut papers = Vec::new();
    let mut estimates = Vec::new();

    for record in records {
        let design = StudyDesign::parse(&record.design).ok_or_else(|| IngestError::UnknownValue {
            record: record.pmid.clone(),
            detail: format!("design {}", record.design),
        })?;
        let population =
            Population::parse(&record.population).ok_or_else(|| IngestError::UnknownValue {
                record: record.pmid.clone(),
                detail: format!("population {}", record.population),
            })?;

        let mut paper = Paper::new(&record.pmid, &record.title, record.year, design, record.n_total, population);
        if let Some(horizon) = &record.time_horizon {
            paper.time_horizon = horizon.clone();
        }
        if let Some(quality) = record.quality_score {
            paper.quality_score = quality.clamp(0.0, 1.0);
        }
        paper.evidence_grade = EvidenceGrade::derive(design, record.n_total, false);

        for (index, row) in record.effects.iter().enumerate() {
            estimates.push(convert_row(record, row, index, population)?);
        }
        papers.push(paper);
    }

    Ok((papers, estimates))
}

fn convert_row(
    record: &RawStudyRecord,
    row: &RawEffectRow,
    index: usize,
    population: Population,
) -> Result<Estimate, IngestError> {
    let measure = EffectMeasure::parse(&row.measure).ok_or_else(|| IngestError::UnknownValue {
        record: record.pmid.clone(),
        detail: format!("measure {}", row.measure),
    })?;

    let context = match &row.context {
        Some(raw) => ContextLabel::parse(raw).ok_or_else(|| IngestError::UnknownValue {
            record: record.pmid.clone(),
            detail: format!("context {raw}"),
        })?,
        None => ContextLabel::any(),
    };

    let (value, ci_low, ci_high) = match row.value {
        Some(v) => (v, row.ci_low, row.ci_high),
        None => counts_to_or(record, row)?,
    };

    let estimate = Estimate {
        id: format!("{}-{}", record.pmid, index),
        pmid: record.pmid.clone(),
        outcome_token: row.outcome.to_uppercase(),
        modifier_token: row.modifier.as_ref().map(|m| m.to_uppercase()),
        measure,
        value,
        ci_low,
        ci_high,
        adjusted: row.adjusted.unwrap_or(false),
        population,
        context,
        quality_weight: row.quality_weight.unwrap_or(0.8).clamp(0.05, 1.0),
        extraction_confidence: row.extraction_confidence.unwrap_or(0.9).clamp(0.05, 1.0),
        approximate: false,
    };

    if !estimate.is_well_formed() {
        return Err(IngestError::UnknownValue {
            record: record.pmid.clone(),
            detail: format!(
                "estimate {} violates measure/modifier invariants",
                estimate.id
            ),
        });
    }
    Ok(estimate)
}

/// Derive an OR and CI from a 2x2 table.
fn counts_to_or(
    record: &RawStudyRecord,
    row: &RawEffectRow,
) -> Result<(f64, Option<f64>, Option<f64>), IngestError> {
    match (row.events_exposed, row.n_exposed, row.events_control, row.n_control) {
        (Some(a), Some(n1), Some(c), Some(n0)) if n1 >= a && n0 >= c => {
            let (log_or, se) = haldane_anscombe_log_or(a, n1 - a, c, n0 - c);
            let or = log_or.exp();
            Ok((
                or,
                Some((log_or - 1.96 * se).exp()),
                Some((log_or + 1.96 * se).exp()),
            ))
        }
        _ => Err(IngestError::UnknownValue {
            record: record.pmid.clone(),
            detail: format!("effect row for {} has neither value nor counts", row.outcome),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_effect(effect: RawEffectRow) -> RawStudyRecord {
        RawStudyRecord {
            pmid: "200".into(),
            title: "Bronchospasm and smoking".into(),
            year: 2019,
            design: "COHORT".into(),
            n_total: 350,
            population: "ADULT".into(),
            time_horizon: None,
            quality_score: Some(0.7),
            effects: vec![effect],
        }
    }

    #[test]
    fn test_parse_with_prose_prefix() {
        let payload = r#"Extracted rows follow:
        [{"pmid":"1","title":"T","year":2020,"design":"RCT","n_total":600,
          "population":"ADULT","effects":[]}]
        "#;
        let records = parse_study_rows(payload).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pmid, "1");
    }

    #[test]
    fn test_parse_rejects_missing_array() {
        assert!(matches!(
            parse_study_rows("no rows here"),
            Err(IngestError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_grade_derived_from_design() {
        let record = record_with_effect(RawEffectRow {
            outcome: "BRONCHOSPASM".into(),
            modifier: None,
            measure: "INCIDENCE".into(),
            value: Some(0.04),
            ci_low: None,
            ci_high: None,
            adjusted: None,
            context: None,
            quality_weight: None,
            extraction_confidence: None,
            events_exposed: None,
            n_exposed: None,
            events_control: None,
            n_control: None,
        });
        let (papers, estimates) = to_evidence(&[record]).unwrap();
        // Cohort with n >= 200 grades B
        assert_eq!(papers[0].evidence_grade, EvidenceGrade::B);
        assert_eq!(estimates.len(), 1);
        assert_eq!(estimates[0].id, "200-0");
    }

    #[test]
    fn test_counts_fallback() {
        let record = record_with_effect(RawEffectRow {
            outcome: "BRONCHOSPASM".into(),
            modifier: Some("SMOKING_HISTORY".into()),
            measure: "OR".into(),
            value: None,
            ci_low: None,
            ci_high: None,
            adjusted: None,
            context: None,
            quality_weight: None,
            extraction_confidence: None,
            events_exposed: Some(12),
            n_exposed: Some(100),
            events_control: Some(5),
            n_control: Some(250),
        });
        let (_, estimates) = to_evidence(&[record]).unwrap();
        let est = &estimates[0];
        assert!(est.value > 1.0);
        assert!(est.ci_low.unwrap() < est.value);
        assert!(est.ci_high.unwrap() > est.value);
        assert!(est.is_well_formed());
    }

    #[test]
    fn test_unknown_design_rejected() {
        let mut record = record_with_effect(RawEffectRow {
            outcome: "BRONCHOSPASM".into(),
            modifier: None,
            measure: "INCIDENCE".into(),
            value: Some(0.04),
            ci_low: None,
            ci_high: None,
            adjusted: None,
            context: None,
            quality_weight: None,
            extraction_confidence: None,
            events_exposed: None,
            n_exposed: None,
            events_control: None,
            n_control: None,
        });
        record.design = "ANECDOTE".into();
        assert!(matches!(
            to_evidence(&[record]),
            Err(IngestError::UnknownValue { .. })
        ));
    }

    #[test]
    fn test_malformed_estimate_rejected() {
        // Baseline row with a ratio measure is rejected at conversion
        let record = record_with_effect(RawEffectRow {
            outcome: "BRONCHOSPASM".into(),
            modifier: None,
            measure: "OR".into(),
            value: Some(2.0),
            ci_low: None,
            ci_high: None,
            adjusted: None,
            context: None,
            quality_weight: None,
            extraction_confidence: None,
            events_exposed: None,
            n_exposed: None,
            events_control: None,
            n_control: None,
        });
        assert!(matches!(
            to_evidence(&[record]),
            Err(IngestError::UnknownValue { .. })
        ));
    }
}
