//! Pooled evidence rows, immutable per evidence version.

use serde::{Deserialize, Serialize};

use super::{ContextLabel, EvidenceGrade};

/// How a pooled value was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolingMethod {
    /// Inverse-variance fixed effect (tau^2 = 0 after estimation).
    FixedEffect,
    /// Random effects with DerSimonian-Laird tau^2.
    DerSimonianLaird,
    /// Random effects with Paule-Mandel tau^2 (preferred at k >= 5).
    PauleMandel,
    /// A single estimate passed through with inflated CI.
    Singleton,
}

impl PoolingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolingMethod::FixedEffect => "fixed_effect",
            PoolingMethod::DerSimonianLaird => "dersimonian_laird",
            PoolingMethod::PauleMandel => "paule_mandel",
            PoolingMethod::Singleton => "singleton",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed_effect" => Some(PoolingMethod::FixedEffect),
            "dersimonian_laird" => Some(PoolingMethod::DerSimonianLaird),
            "paule_mandel" => Some(PoolingMethod::PauleMandel),
            "singleton" => Some(PoolingMethod::Singleton),
            _ => None,
        }
    }
}

/// Meta-analytic incidence of an outcome in a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledBaseline {
    pub outcome_token: String,
    pub context: ContextLabel,
    pub evidence_version: String,
    /// Contributing study count.
    pub k: u32,
    /// Pooled incidence.
    pub p0: f64,
    pub p0_ci_low: f64,
    pub p0_ci_high: f64,
    /// Variance of logit(p0); propagated into adjusted-risk CIs.
    pub logit_variance: f64,
    pub i_squared: f64,
    pub tau_squared: f64,
    pub method: PoolingMethod,
    pub grade: EvidenceGrade,
    pub pmids: Vec<String>,
    pub singleton: bool,
}

impl PooledBaseline {
    /// Baseline odds p0 / (1 - p0).
    pub fn baseline_odds(&self) -> f64 {
        self.p0 / (1.0 - self.p0)
    }
}

/// Meta-analytic odds ratio for a modifier on an outcome in a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledEffect {
    pub outcome_token: String,
    pub modifier_token: String,
    pub context: ContextLabel,
    pub evidence_version: String,
    pub k: u32,
    pub or_mean: f64,
    pub or_ci_low: f64,
    pub or_ci_high: f64,
    /// Variance of ln(OR); propagated into adjusted-risk CIs.
    pub log_variance: f64,
    pub i_squared: f64,
    pub tau_squared: f64,
    pub method: PoolingMethod,
    pub grade: EvidenceGrade,
    pub pmids: Vec<String>,
    pub singleton: bool,
    /// True when any contributing RR/HR used the OR approximation.
    pub approximate: bool,
}
