//! Analysis request options, result envelope, and degradation records.

use serde::{Deserialize, Serialize};

use super::{Demographics, ExtractedFactor, MedicationPlan, RiskAssessment, RiskLevel};

/// Evidence mode for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisMode {
    /// Answer from the pinned pooled snapshot.
    ModelBased,
    /// Pool rows from the configured evidence source into an ephemeral
    /// snapshot and answer from it.
    LiteratureLive,
}

impl Default for AnalysisMode {
    fn default() -> Self {
        AnalysisMode::ModelBased
    }
}

/// Options controlling a single `analyze` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Evidence version to pin; None means `current`.
    pub evidence_version: Option<String>,
    /// Canonical context tuple string overriding context resolution.
    pub context_override: Option<String>,
    pub mode: AnalysisMode,
    pub include_medications: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            evidence_version: None,
            context_override: None,
            mode: AnalysisMode::ModelBased,
            include_medications: true,
        }
    }
}

/// Request terminal status. Both are HTTP 200 at any outer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Ok,
    PartialSuccess,
}

/// In-band degradation events, recorded per request for observability.
/// None of these are errors; the result stays renderable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Degradation {
    /// No pooled baseline or effect at any context level.
    EvidenceMissing { outcome: String, context: String },
    /// Non-empty text produced zero factors.
    ExtractionDegraded,
    /// A pooled cell was unusable (non-finite arithmetic).
    PoolingUnavailable {
        outcome: String,
        modifier: Option<String>,
    },
    /// The plausibility cap clamped an adjusted risk.
    RiskCapped { outcome: String },
    /// The wall-clock budget expired before all outcomes were assessed.
    Timeout { completed_outcomes: usize },
    /// The request was cancelled; partial results were discarded.
    Cancelled,
}

/// Full structured output of `analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Deterministic per-request id (UUIDv5 over the request content, so
    /// identical requests produce byte-identical results).
    pub session_id: String,
    pub evidence_version: String,
    pub status: AnalysisStatus,
    pub demographics: Demographics,
    pub factors: Vec<ExtractedFactor>,
    pub risks: Vec<RiskAssessment>,
    pub risk_level: RiskLevel,
    pub medications: MedicationPlan,
    pub degradations: Vec<Degradation>,
}

impl AnalysisResult {
    /// Canonical JSON used for the audit hash chain.
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
