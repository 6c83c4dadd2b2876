//! Paper and estimate persistence. Estimates are append-only.

use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;

use super::{Database, DbError, DbResult};
use crate::models::{
    ContextLabel, EffectMeasure, Estimate, EvidenceGrade, Paper, Population, StudyDesign,
};

impl Database {
    /// Insert or update a paper record.
    pub fn upsert_paper(&self, paper: &Paper) -> DbResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO papers (
                pmid, title, year, design, n_total, population,
                time_horizon, evidence_grade, quality_score
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(pmid) DO UPDATE SET
                title = excluded.title,
                year = excluded.year,
                design = excluded.design,
                n_total = excluded.n_total,
                population = excluded.population,
                time_horizon = excluded.time_horizon,
                evidence_grade = excluded.evidence_grade,
                quality_score = excluded.quality_score
            "#,
            params![
                paper.pmid,
                paper.title,
                paper.year,
                paper.design.as_str(),
                paper.n_total,
                paper.population.as_str(),
                paper.time_horizon,
                paper.evidence_grade.as_str(),
                paper.quality_score,
            ],
        )?;
        Ok(())
    }

    pub fn get_paper(&self, pmid: &str) -> DbResult<Option<Paper>> {
        let result = self
            .conn()
            .query_row(
                "SELECT pmid, title, year, design, n_total, population,
                        time_horizon, evidence_grade, quality_score
                 FROM papers WHERE pmid = ?",
                [pmid],
                map_paper_row,
            )
            .optional()?;
        result.map(parse_paper_row).transpose()
    }

    /// All papers keyed by pmid; the pooler uses this for n-based variance.
    pub fn papers_by_pmid(&self) -> DbResult<HashMap<String, Paper>> {
        let mut stmt = self.conn().prepare(
            "SELECT pmid, title, year, design, n_total, population,
                    time_horizon, evidence_grade, quality_score
             FROM papers",
        )?;
        let rows = stmt.query_map([], map_paper_row)?;

        let mut out = HashMap::new();
        for row in rows {
            let paper = parse_paper_row(row?)?;
            out.insert(paper.pmid.clone(), paper);
        }
        Ok(out)
    }

    /// Append an estimate. Malformed rows are rejected before touching SQL
    /// so the caller sees a typed constraint error.
    pub fn insert_estimate(&self, estimate: &Estimate) -> DbResult<()> {
        if !estimate.is_well_formed() {
            return Err(DbError::Constraint(format!(
                "estimate {} violates measure/modifier invariants",
                estimate.id
            )));
        }

        self.conn().execute(
            r#"
            INSERT INTO estimates (
                id, pmid, outcome_token, modifier_token, measure, value,
                ci_low, ci_high, adjusted, population, context_label,
                quality_weight, extraction_confidence, approximate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                estimate.id,
                estimate.pmid,
                estimate.outcome_token,
                estimate.modifier_token,
                estimate.measure.as_str(),
                estimate.value,
                estimate.ci_low,
                estimate.ci_high,
                estimate.adjusted,
                estimate.population.as_str(),
                estimate.context.to_string(),
                estimate.quality_weight,
                estimate.extraction_confidence,
                estimate.approximate,
            ],
        )?;
        Ok(())
    }

    /// All estimates, ordered by id for deterministic pooling input.
    pub fn list_estimates(&self) -> DbResult<Vec<Estimate>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, pmid, outcome_token, modifier_token, measure, value,
                    ci_low, ci_high, adjusted, population, context_label,
                    quality_weight, extraction_confidence, approximate
             FROM estimates ORDER BY id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(EstimateRow {
                id: row.get(0)?,
                pmid: row.get(1)?,
                outcome_token: row.get(2)?,
                modifier_token: row.get(3)?,
                measure: row.get(4)?,
                value: row.get(5)?,
                ci_low: row.get(6)?,
                ci_high: row.get(7)?,
                adjusted: row.get(8)?,
                population: row.get(9)?,
                context_label: row.get(10)?,
                quality_weight: row.get(11)?,
                extraction_confidence: row.get(12)?,
                approximate: row.get(13)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?.try_into()?);
        }
        Ok(out)
    }

    pub fn estimate_count(&self) -> DbResult<u32> {
        let count: u32 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM estimates", [], |row| row.get(0))?;
        Ok(count)
    }
}

type PaperRow = (String, String, u16, String, u32, String, String, String, f64);

fn map_paper_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaperRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn parse_paper_row(row: PaperRow) -> DbResult<Paper> {
    let (pmid, title, year, design, n_total, population, time_horizon, grade, quality_score) = row;
    Ok(Paper {
        pmid,
        title,
        year,
        design: StudyDesign::parse(&design)
            .ok_or_else(|| DbError::Constraint(format!("unknown design: {design}")))?,
        n_total,
        population: Population::parse(&population)
            .ok_or_else(|| DbError::Constraint(format!("unknown population: {population}")))?,
        time_horizon,
        evidence_grade: EvidenceGrade::parse(&grade)
            .ok_or_else(|| DbError::Constraint(format!("unknown grade: {grade}")))?,
        quality_score,
    })
}

/// Intermediate row struct for database mapping.
struct EstimateRow {
    id: String,
    pmid: String,
    outcome_token: String,
    modifier_token: Option<String>,
    measure: String,
    value: f64,
    ci_low: Option<f64>,
    ci_high: Option<f64>,
    adjusted: bool,
    population: String,
    context_label: String,
    quality_weight: f64,
    extraction_confidence: f64,
    approximate: bool,
}

impl TryFrom<EstimateRow> for Estimate {
    type Error = DbError;

    fn try_from(row: EstimateRow) -> Result<Self, Self::Error> {
        Ok(Estimate {
            id: row.id,
            pmid: row.pmid,
            outcome_token: row.outcome_token,
            modifier_token: row.modifier_token,
            measure: EffectMeasure::parse(&row.measure)
                .ok_or_else(|| DbError::Constraint(format!("unknown measure: {}", row.measure)))?,
            value: row.value,
            ci_low: row.ci_low,
            ci_high: row.ci_high,
            adjusted: row.adjusted,
            population: Population::parse(&row.population).ok_or_else(|| {
                DbError::Constraint(format!("unknown population: {}", row.population))
            })?,
            context: ContextLabel::parse(&row.context_label).ok_or_else(|| {
                DbError::Constraint(format!("bad context label: {}", row.context_label))
            })?,
            quality_weight: row.quality_weight,
            extraction_confidence: row.extraction_confidence,
            approximate: row.approximate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Urgency;

    fn sample_paper() -> Paper {
        Paper::new("100", "Laryngospasm in pediatric ENT", 2021, StudyDesign::Cohort, 400, Population::Pediatric)
    }

    fn sample_estimate() -> Estimate {
        Estimate {
            id: "est-1".into(),
            pmid: "100".into(),
            outcome_token: "LARYNGOSPASM".into(),
            modifier_token: None,
            measure: EffectMeasure::Incidence,
            value: 0.017,
            ci_low: Some(0.012),
            ci_high: Some(0.024),
            adjusted: false,
            population: Population::Pediatric,
            context: ContextLabel::new(Some(Population::Pediatric), Some("ENT"), Some(Urgency::Elective)),
            quality_weight: 0.9,
            extraction_confidence: 0.95,
            approximate: false,
        }
    }

    #[test]
    fn test_paper_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let paper = sample_paper();
        db.upsert_paper(&paper).unwrap();

        let loaded = db.get_paper("100").unwrap().unwrap();
        assert_eq!(loaded, paper);
        assert_eq!(loaded.evidence_grade, EvidenceGrade::B);
    }

    #[test]
    fn test_estimate_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_paper(&sample_paper()).unwrap();
        let est = sample_estimate();
        db.insert_estimate(&est).unwrap();

        let loaded = db.list_estimates().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], est);
        assert_eq!(db.estimate_count().unwrap(), 1);
    }

    #[test]
    fn test_malformed_estimate_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_paper(&sample_paper()).unwrap();

        let mut est = sample_estimate();
        est.measure = EffectMeasure::OddsRatio; // baseline must be INCIDENCE
        let result = db.insert_estimate(&est);
        assert!(matches!(result, Err(DbError::Constraint(_))));
    }
}
