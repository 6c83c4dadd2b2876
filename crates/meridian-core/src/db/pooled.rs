//! Pooled-row and evidence-version persistence.
//!
//! Pooled rows are written once per (cell, version) and never updated;
//! the version registry tracks which label is `current`.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{
    ContextLabel, EvidenceGrade, PooledBaseline, PooledEffect, PoolingMethod,
};

impl Database {
    /// Register a new evidence version label. Labels are monotonic: a label
    /// lexically at or below the latest existing one is rejected.
    pub fn register_version(&self, label: &str, estimate_count: u32) -> DbResult<()> {
        if !is_valid_version_label(label) {
            return Err(DbError::Constraint(format!(
                "version label {label} does not match vYYYY.MM[.N]"
            )));
        }
        if let Some(latest) = self.latest_version()? {
            if label <= latest.as_str() {
                return Err(DbError::Constraint(format!(
                    "version label {label} is not after {latest}"
                )));
            }
        }
        self.conn().execute(
            "INSERT INTO evidence_versions (label, estimate_count) VALUES (?1, ?2)",
            params![label, estimate_count],
        )?;
        Ok(())
    }

    pub fn version_exists(&self, label: &str) -> DbResult<bool> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM evidence_versions WHERE label = ?",
            [label],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn latest_version(&self) -> DbResult<Option<String>> {
        let label = self
            .conn()
            .query_row(
                "SELECT label FROM evidence_versions ORDER BY label DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(label)
    }

    /// Point the `current` marker at a version. Exactly one row is current.
    pub fn set_current_version(&self, label: &str) -> DbResult<()> {
        if !self.version_exists(label)? {
            return Err(DbError::NotFound(format!("evidence version {label}")));
        }
        self.conn()
            .execute("UPDATE evidence_versions SET is_current = 0", [])?;
        self.conn().execute(
            "UPDATE evidence_versions SET is_current = 1 WHERE label = ?",
            [label],
        )?;
        Ok(())
    }

    pub fn current_version(&self) -> DbResult<Option<String>> {
        let label = self
            .conn()
            .query_row(
                "SELECT label FROM evidence_versions WHERE is_current = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(label)
    }

    pub fn insert_pooled_baseline(&self, row: &PooledBaseline) -> DbResult<()> {
        let pmids_json = serde_json::to_string(&row.pmids)?;
        self.conn().execute(
            r#"
            INSERT INTO pooled_baselines (
                outcome_token, context_label, evidence_version, k, p0,
                p0_ci_low, p0_ci_high, logit_variance, i_squared, tau_squared,
                method, grade, pmids, singleton
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                row.outcome_token,
                row.context.to_string(),
                row.evidence_version,
                row.k,
                row.p0,
                row.p0_ci_low,
                row.p0_ci_high,
                row.logit_variance,
                row.i_squared,
                row.tau_squared,
                row.method.as_str(),
                row.grade.as_str(),
                pmids_json,
                row.singleton,
            ],
        )?;
        Ok(())
    }

    pub fn insert_pooled_effect(&self, row: &PooledEffect) -> DbResult<()> {
        let pmids_json = serde_json::to_string(&row.pmids)?;
        self.conn().execute(
            r#"
            INSERT INTO pooled_effects (
                outcome_token, modifier_token, context_label, evidence_version,
                k, or_mean, or_ci_low, or_ci_high, log_variance, i_squared,
                tau_squared, method, grade, pmids, singleton, approximate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                row.outcome_token,
                row.modifier_token,
                row.context.to_string(),
                row.evidence_version,
                row.k,
                row.or_mean,
                row.or_ci_low,
                row.or_ci_high,
                row.log_variance,
                row.i_squared,
                row.tau_squared,
                row.method.as_str(),
                row.grade.as_str(),
                pmids_json,
                row.singleton,
                row.approximate,
            ],
        )?;
        Ok(())
    }

    /// All pooled baselines for a version.
    pub fn load_pooled_baselines(&self, version: &str) -> DbResult<Vec<PooledBaseline>> {
        let mut stmt = self.conn().prepare(
            "SELECT outcome_token, context_label, evidence_version, k, p0,
                    p0_ci_low, p0_ci_high, logit_variance, i_squared, tau_squared,
                    method, grade, pmids, singleton
             FROM pooled_baselines WHERE evidence_version = ?
             ORDER BY outcome_token, context_label",
        )?;

        let rows = stmt.query_map([version], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, f64>(8)?,
                row.get::<_, f64>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, String>(11)?,
                row.get::<_, String>(12)?,
                row.get::<_, bool>(13)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (outcome_token, context, version, k, p0, lo, hi, logit_variance, i2, tau2, method, grade, pmids, singleton) = row?;
            out.push(PooledBaseline {
                outcome_token,
                context: parse_context(&context)?,
                evidence_version: version,
                k,
                p0,
                p0_ci_low: lo,
                p0_ci_high: hi,
                logit_variance,
                i_squared: i2,
                tau_squared: tau2,
                method: parse_method(&method)?,
                grade: parse_grade(&grade)?,
                pmids: serde_json::from_str(&pmids)?,
                singleton,
            });
        }
        Ok(out)
    }

    /// All pooled effects for a version.
    pub fn load_pooled_effects(&self, version: &str) -> DbResult<Vec<PooledEffect>> {
        let mut stmt = self.conn().prepare(
            "SELECT outcome_token, modifier_token, context_label, evidence_version,
                    k, or_mean, or_ci_low, or_ci_high, log_variance, i_squared,
                    tau_squared, method, grade, pmids, singleton, approximate
             FROM pooled_effects WHERE evidence_version = ?
             ORDER BY outcome_token, modifier_token, context_label",
        )?;

        let rows = stmt.query_map([version], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, f64>(8)?,
                row.get::<_, f64>(9)?,
                row.get::<_, f64>(10)?,
                row.get::<_, String>(11)?,
                row.get::<_, String>(12)?,
                row.get::<_, String>(13)?,
                row.get::<_, bool>(14)?,
                row.get::<_, bool>(15)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (outcome_token, modifier_token, context, version, k, or_mean, lo, hi, log_variance, i2, tau2, method, grade, pmids, singleton, approximate) = row?;
            out.push(PooledEffect {
                outcome_token,
                modifier_token,
                context: parse_context(&context)?,
                evidence_version: version,
                k,
                or_mean,
                or_ci_low: lo,
                or_ci_high: hi,
                log_variance,
                i_squared: i2,
                tau_squared: tau2,
                method: parse_method(&method)?,
                grade: parse_grade(&grade)?,
                pmids: serde_json::from_str(&pmids)?,
                singleton,
                approximate,
            });
        }
        Ok(out)
    }
}

fn parse_context(s: &str) -> DbResult<ContextLabel> {
    ContextLabel::parse(s).ok_or_else(|| DbError::Constraint(format!("bad context label: {s}")))
}

fn parse_method(s: &str) -> DbResult<PoolingMethod> {
    PoolingMethod::parse(s).ok_or_else(|| DbError::Constraint(format!("unknown method: {s}")))
}

fn parse_grade(s: &str) -> DbResult<EvidenceGrade> {
    EvidenceGrade::parse(s).ok_or_else(|| DbError::Constraint(format!("unknown grade: {s}")))
}

/// `vYYYY.MM` or `vYYYY.MM.N`.
pub fn is_valid_version_label(label: &str) -> bool {
    let rest = match label.strip_prefix('v') {
        Some(r) => r,
        None => return false,
    };
    let parts: Vec<&str> = rest.split('.').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return false;
    }
    if parts[0].len() != 4 || !parts[0].chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if parts[1].len() != 2 || !parts[1].chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if let Some(n) = parts.get(2) {
        if n.is_empty() || !n.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }
    true
}
