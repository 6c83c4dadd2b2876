//! Evidence pooling engine.
//!
//! Consumes the append-only estimate store and produces, per evidence
//! version, immutable pooled baselines and modifier effects for every
//! observed context cell and its wildcard parents.

pub mod convert;
mod meta;

pub use meta::{pool, pooled_grade, PoolResult, StudyPoint};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use crate::config::{PoolingConfig, RiskConfig};
use crate::db::{Database, DbError};
use crate::models::{
    ContextLabel, EffectMeasure, Estimate, EvidenceGrade, Paper, PooledBaseline, PooledEffect,
    PoolingMethod,
};

/// Pooling-engine errors.
#[derive(Error, Debug)]
pub enum PoolingError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("No estimates available to pool")]
    NoEstimates,

    #[error("Evidence source error: {0}")]
    Source(#[from] SourceError),
}

pub type PoolingResult<T> = Result<T, PoolingError>;

/// Evidence-source errors (literature-live seam).
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("parse failed: {0}")]
    Parse(String),
}

/// Pluggable evidence feed for LITERATURE_LIVE mode. Implementations live
/// outside the core (the ingest crate ships a row feeder); the engine only
/// needs papers plus estimates back.
pub trait EvidenceSource: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self) -> Result<(Vec<Paper>, Vec<Estimate>), SourceError>;
}

/// Immutable pooled tables for one evidence version. Shared read-only
/// across requests; lookups walk the wildcard fallback chain.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSnapshot {
    pub version: String,
    baselines: HashMap<(String, String), PooledBaseline>,
    effects: HashMap<(String, String, String), PooledEffect>,
    unavailable_baselines: BTreeSet<(String, String)>,
    unavailable_effects: BTreeSet<(String, String, String)>,
}

impl EvidenceSnapshot {
    pub fn from_rows(
        version: &str,
        baselines: Vec<PooledBaseline>,
        effects: Vec<PooledEffect>,
    ) -> Self {
        let baselines = baselines
            .into_iter()
            .map(|b| ((b.outcome_token.clone(), b.context.to_string()), b))
            .collect();
        let effects = effects
            .into_iter()
            .map(|e| {
                (
                    (
                        e.outcome_token.clone(),
                        e.modifier_token.clone(),
                        e.context.to_string(),
                    ),
                    e,
                )
            })
            .collect();
        Self {
            version: version.to_string(),
            baselines,
            effects,
            unavailable_baselines: BTreeSet::new(),
            unavailable_effects: BTreeSet::new(),
        }
    }

    /// Most specific pooled baseline for an outcome, walking the wildcard
    /// chain. Absence at every level means "no evidence", never zero.
    pub fn baseline(&self, outcome: &str, context: &ContextLabel) -> Option<&PooledBaseline> {
        for ctx in context.fallback_chain() {
            if let Some(row) = self.baselines.get(&(outcome.to_string(), ctx.to_string())) {
                return Some(row);
            }
        }
        None
    }

    /// Most specific pooled effect for (outcome, modifier).
    pub fn effect(
        &self,
        outcome: &str,
        modifier: &str,
        context: &ContextLabel,
    ) -> Option<&PooledEffect> {
        for ctx in context.fallback_chain() {
            let key = (outcome.to_string(), modifier.to_string(), ctx.to_string());
            if let Some(row) = self.effects.get(&key) {
                return Some(row);
            }
        }
        None
    }

    /// True when the cell failed pooling (as opposed to never existing).
    pub fn baseline_unavailable(&self, outcome: &str, context: &ContextLabel) -> bool {
        context.fallback_chain().iter().any(|ctx| {
            self.unavailable_baselines
                .contains(&(outcome.to_string(), ctx.to_string()))
        })
    }

    /// True when an effect cell failed pooling at some level of the chain.
    pub fn effect_unavailable(&self, outcome: &str, modifier: &str, context: &ContextLabel) -> bool {
        context.fallback_chain().iter().any(|ctx| {
            self.unavailable_effects.contains(&(
                outcome.to_string(),
                modifier.to_string(),
                ctx.to_string(),
            ))
        })
    }

    /// Every outcome the version carries evidence for (baselines, failed
    /// baseline cells, or effect rows), sorted for deterministic
    /// iteration. An outcome with only effect rows still appears so the
    /// calculator can report it as `no_evidence`.
    pub fn outcomes(&self) -> Vec<String> {
        let mut out: BTreeSet<String> = self
            .baselines
            .keys()
            .map(|(outcome, _)| outcome.clone())
            .collect();
        out.extend(
            self.unavailable_baselines
                .iter()
                .map(|(outcome, _)| outcome.clone()),
        );
        out.extend(self.effects.keys().map(|(outcome, _, _)| outcome.clone()));
        out.into_iter().collect()
    }

    pub fn baseline_rows(&self) -> Vec<&PooledBaseline> {
        let mut rows: Vec<&PooledBaseline> = self.baselines.values().collect();
        rows.sort_by(|a, b| {
            (&a.outcome_token, a.context.to_string())
                .cmp(&(&b.outcome_token, b.context.to_string()))
        });
        rows
    }

    pub fn effect_rows(&self) -> Vec<&PooledEffect> {
        let mut rows: Vec<&PooledEffect> = self.effects.values().collect();
        rows.sort_by(|a, b| {
            (&a.outcome_token, &a.modifier_token, a.context.to_string()).cmp(&(
                &b.outcome_token,
                &b.modifier_token,
                b.context.to_string(),
            ))
        });
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty() && self.effects.is_empty()
    }
}

/// Batch pooler over the evidence store.
pub struct Pooler<'a> {
    db: &'a Database,
    config: &'a RiskConfig,
}

impl<'a> Pooler<'a> {
    pub fn new(db: &'a Database, config: &'a RiskConfig) -> Self {
        Self { db, config }
    }

    /// Pool every observed cell into a new immutable version, persist the
    /// rows, and mark the version current.
    pub fn pool_version(&self, label: &str) -> PoolingResult<EvidenceSnapshot> {
        let estimates = self.db.list_estimates()?;
        if estimates.is_empty() {
            return Err(PoolingError::NoEstimates);
        }
        let papers = self.db.papers_by_pmid()?;

        self.db.register_version(label, estimates.len() as u32)?;
        let snapshot = build_snapshot(label, &estimates, &papers, &self.config.pooling);

        for row in snapshot.baseline_rows() {
            self.db.insert_pooled_baseline(row)?;
        }
        for row in snapshot.effect_rows() {
            self.db.insert_pooled_effect(row)?;
        }
        self.db.set_current_version(label)?;
        Ok(snapshot)
    }

    /// Reload a previously pooled version from the store.
    pub fn load_version(&self, label: &str) -> PoolingResult<EvidenceSnapshot> {
        if !self.db.version_exists(label)? {
            return Err(PoolingError::Database(DbError::NotFound(format!(
                "evidence version {label}"
            ))));
        }
        let baselines = self.db.load_pooled_baselines(label)?;
        let effects = self.db.load_pooled_effects(label)?;
        Ok(EvidenceSnapshot::from_rows(label, baselines, effects))
    }
}

/// Pure snapshot construction from materialized estimates. Also used by
/// LITERATURE_LIVE mode to pool source rows into an ephemeral snapshot.
pub fn build_snapshot(
    version: &str,
    estimates: &[Estimate],
    papers: &HashMap<String, Paper>,
    config: &PoolingConfig,
) -> EvidenceSnapshot {
    let usable: Vec<&Estimate> = estimates
        .iter()
        .filter(|e| e.is_well_formed() && e.extraction_confidence >= config.min_extraction_confidence)
        .collect();

    let mut snapshot = EvidenceSnapshot {
        version: version.to_string(),
        ..EvidenceSnapshot::default()
    };

    // Baselines first: effect conversion needs local incidence.
    let mut baseline_cells: BTreeMap<(String, String), Vec<&Estimate>> = BTreeMap::new();
    for est in usable.iter().filter(|e| e.is_baseline()) {
        for ctx in est.context.self_and_parents() {
            baseline_cells
                .entry((est.outcome_token.clone(), ctx.to_string()))
                .or_default()
                .push(est);
        }
    }

    for ((outcome, ctx_string), cell) in &baseline_cells {
        let ctx = match ContextLabel::parse(ctx_string) {
            Some(c) => c,
            None => continue,
        };
        match pool_baseline_cell(outcome, &ctx, cell, papers, version, config) {
            Some(row) => {
                snapshot
                    .baselines
                    .insert((outcome.clone(), ctx_string.clone()), row);
            }
            None => {
                tracing::warn!(outcome = %outcome, context = %ctx, "baseline cell failed pooling");
                snapshot
                    .unavailable_baselines
                    .insert((outcome.clone(), ctx_string.clone()));
            }
        }
    }

    let mut effect_cells: BTreeMap<(String, String, String), Vec<&Estimate>> = BTreeMap::new();
    for est in usable.iter().filter(|e| !e.is_baseline()) {
        let modifier = est.modifier_token.clone().unwrap_or_default();
        for ctx in est.context.self_and_parents() {
            effect_cells
                .entry((est.outcome_token.clone(), modifier.clone(), ctx.to_string()))
                .or_default()
                .push(est);
        }
    }

    for ((outcome, modifier, ctx_string), cell) in &effect_cells {
        let ctx = match ContextLabel::parse(ctx_string) {
            Some(c) => c,
            None => continue,
        };
        match pool_effect_cell(outcome, modifier, &ctx, cell, papers, &snapshot, version, config) {
            Some(row) => {
                snapshot.effects.insert(
                    (outcome.clone(), modifier.clone(), ctx_string.clone()),
                    row,
                );
            }
            None => {
                tracing::warn!(outcome = %outcome, modifier = %modifier, context = %ctx, "effect cell failed pooling");
                snapshot.unavailable_effects.insert((
                    outcome.clone(),
                    modifier.clone(),
                    ctx_string.clone(),
                ));
            }
        }
    }

    snapshot
}

fn pool_baseline_cell(
    outcome: &str,
    ctx: &ContextLabel,
    cell: &[&Estimate],
    papers: &HashMap<String, Paper>,
    version: &str,
    config: &PoolingConfig,
) -> Option<PooledBaseline> {
    let points: Vec<StudyPoint> = cell
        .iter()
        .map(|est| baseline_point(est, ctx, papers, config))
        .collect();
    let pmids = collect_pmids(cell);

    if points.len() == 1 {
        let point = &points[0];
        let half = 1.96 * point.se * config.singleton_ci_inflation;
        let p0 = convert::inv_logit(point.y);
        return Some(PooledBaseline {
            outcome_token: outcome.to_string(),
            context: ctx.clone(),
            evidence_version: version.to_string(),
            k: 1,
            p0,
            p0_ci_low: convert::inv_logit(point.y - half),
            p0_ci_high: convert::inv_logit(point.y + half),
            logit_variance: point.se * point.se,
            i_squared: 0.0,
            tau_squared: 0.0,
            method: PoolingMethod::Singleton,
            grade: point.grade,
            pmids,
            singleton: true,
        });
    }

    let result = pool(&points, config)?;
    let grade = pooled_grade(&points, result.tau_squared, config.grade_weight_share);
    let half = result.ci_multiplier * result.se;
    Some(PooledBaseline {
        outcome_token: outcome.to_string(),
        context: ctx.clone(),
        evidence_version: version.to_string(),
        k: result.k,
        p0: convert::inv_logit(result.mean),
        p0_ci_low: convert::inv_logit(result.mean - half),
        p0_ci_high: convert::inv_logit(result.mean + half),
        logit_variance: result.se * result.se,
        i_squared: result.i_squared,
        tau_squared: result.tau_squared,
        method: result.method,
        grade,
        pmids,
        singleton: false,
    })
}

fn baseline_point(
    est: &Estimate,
    ctx: &ContextLabel,
    papers: &HashMap<String, Paper>,
    config: &PoolingConfig,
) -> StudyPoint {
    let paper = papers.get(&est.pmid);
    let y = convert::logit(est.value);

    let se = if let (Some(lo), Some(hi)) = (est.ci_low, est.ci_high) {
        convert::se_logit_from_ci(lo, hi).unwrap_or(config.fallback_log_se)
    } else if let Some(paper) = paper {
        let n = paper.n_total;
        let events = (est.value * n as f64).round();
        if events <= config.wilson_event_threshold as f64 {
            let (lo, hi) = convert::wilson_interval(events, n as f64);
            (convert::logit(hi) - convert::logit(lo)) / (2.0 * 1.96)
        } else {
            convert::logit_variance_from_n(est.value, n)
                .map(|v| v.sqrt())
                .unwrap_or(config.fallback_log_se)
        }
    } else {
        config.fallback_log_se
    };

    let population_match = match ctx.population {
        Some(target) => est.population.match_weight(target),
        None => 1.0,
    };

    StudyPoint {
        y,
        se,
        weight_mult: est.quality_weight * population_match,
        pmid: est.pmid.clone(),
        grade: paper.map(|p| p.evidence_grade).unwrap_or(EvidenceGrade::D),
    }
}

#[allow(clippy::too_many_arguments)]
fn pool_effect_cell(
    outcome: &str,
    modifier: &str,
    ctx: &ContextLabel,
    cell: &[&Estimate],
    papers: &HashMap<String, Paper>,
    snapshot: &EvidenceSnapshot,
    version: &str,
    config: &PoolingConfig,
) -> Option<PooledEffect> {
    let baseline_p0 = snapshot.baseline(outcome, ctx).map(|b| b.p0);

    let mut any_approximate = false;
    let points: Vec<StudyPoint> = cell
        .iter()
        .map(|est| {
            let (point, approx) = effect_point(est, ctx, papers, baseline_p0, config);
            any_approximate |= approx;
            point
        })
        .collect();
    let pmids = collect_pmids(cell);

    if points.len() == 1 {
        let point = &points[0];
        let half = 1.96 * point.se * config.singleton_ci_inflation;
        return Some(PooledEffect {
            outcome_token: outcome.to_string(),
            modifier_token: modifier.to_string(),
            context: ctx.clone(),
            evidence_version: version.to_string(),
            k: 1,
            or_mean: point.y.exp(),
            or_ci_low: (point.y - half).exp(),
            or_ci_high: (point.y + half).exp(),
            log_variance: point.se * point.se,
            i_squared: 0.0,
            tau_squared: 0.0,
            method: PoolingMethod::Singleton,
            grade: point.grade,
            pmids,
            singleton: true,
            approximate: any_approximate,
        });
    }

    let result = pool(&points, config)?;
    let grade = pooled_grade(&points, result.tau_squared, config.grade_weight_share);
    let half = result.ci_multiplier * result.se;
    Some(PooledEffect {
        outcome_token: outcome.to_string(),
        modifier_token: modifier.to_string(),
        context: ctx.clone(),
        evidence_version: version.to_string(),
        k: result.k,
        or_mean: result.mean.exp(),
        or_ci_low: (result.mean - half).exp(),
        or_ci_high: (result.mean + half).exp(),
        log_variance: result.se * result.se,
        i_squared: result.i_squared,
        tau_squared: result.tau_squared,
        method: result.method,
        grade,
        pmids,
        singleton: false,
        approximate: any_approximate,
    })
}

/// Convert one effect estimate to ln(OR). RR/HR use the local pooled
/// baseline when one exists; otherwise the OR approximation applies with a
/// weight penalty. Returns (point, used_approximation).
fn effect_point(
    est: &Estimate,
    ctx: &ContextLabel,
    papers: &HashMap<String, Paper>,
    baseline_p0: Option<f64>,
    config: &PoolingConfig,
) -> (StudyPoint, bool) {
    let (y, approx) = match est.measure {
        EffectMeasure::OddsRatio => (est.value.ln(), est.approximate),
        EffectMeasure::RiskRatio | EffectMeasure::HazardRatio => match baseline_p0 {
            Some(p0) => (convert::rr_to_or(est.value, p0).ln(), false),
            None => (est.value.ln(), true),
        },
        // Unreachable for well-formed rows; treated as a null effect.
        EffectMeasure::Incidence => (0.0, true),
    };

    let se = match (est.ci_low, est.ci_high) {
        (Some(lo), Some(hi)) => convert::se_from_log_ci(lo, hi).unwrap_or(config.fallback_log_se),
        _ => config.fallback_log_se,
    };

    let population_match = match ctx.population {
        Some(target) => est.population.match_weight(target),
        None => 1.0,
    };
    let approx_penalty = if approx {
        config.approximate_conversion_penalty
    } else {
        1.0
    };

    let paper = papers.get(&est.pmid);
    (
        StudyPoint {
            y,
            se,
            weight_mult: est.quality_weight * population_match * approx_penalty,
            pmid: est.pmid.clone(),
            grade: paper.map(|p| p.evidence_grade).unwrap_or(EvidenceGrade::D),
        },
        approx,
    )
}

fn collect_pmids(cell: &[&Estimate]) -> Vec<String> {
    let mut pmids: Vec<String> = cell.iter().map(|e| e.pmid.clone()).collect();
    pmids.sort();
    pmids.dedup();
    pmids
}
