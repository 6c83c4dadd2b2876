//! Engine configuration.
//!
//! All tunables live here so pooling and risk behavior is reproducible
//! data, not scattered constants. `Default` carries the shipped values;
//! callers may deserialize overrides from JSON.

use serde::{Deserialize, Serialize};

/// Pooling-engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolingConfig {
    /// Estimates below this extraction confidence are dropped before pooling.
    pub min_extraction_confidence: f64,
    /// Paule-Mandel is preferred over DerSimonian-Laird at k >= this.
    pub paule_mandel_min_k: u32,
    /// Hartung-Knapp applies when k is in this inclusive range.
    pub hartung_knapp_k_range: (u32, u32),
    /// Weight multiplier for RR/HR pooled via the OR approximation.
    pub approximate_conversion_penalty: f64,
    /// CI half-width inflation for singleton cells.
    pub singleton_ci_inflation: f64,
    /// Baselines with events <= this use the Wilson interval for variance.
    pub wilson_event_threshold: u32,
    /// Fallback standard error when neither CI nor counts are usable.
    pub fallback_log_se: f64,
    /// Weight share a study must carry to drive the pooled grade.
    pub grade_weight_share: f64,
}

impl Default for PoolingConfig {
    fn default() -> Self {
        Self {
            min_extraction_confidence: 0.5,
            paule_mandel_min_k: 5,
            hartung_knapp_k_range: (3, 10),
            approximate_conversion_penalty: 0.5,
            singleton_ci_inflation: 1.5,
            wilson_event_threshold: 5,
            fallback_log_se: 0.5,
            grade_weight_share: 0.25,
        }
    }
}

/// Risk-calculator tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCaps {
    /// Adjusted probability ceiling.
    pub max_probability: f64,
    /// Risk-ratio ceiling over baseline.
    pub max_risk_ratio: f64,
}

impl Default for RiskCaps {
    fn default() -> Self {
        Self {
            max_probability: 0.95,
            max_risk_ratio: 25.0,
        }
    }
}

/// Extractor tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Confidence multiplier when a negation cue precedes the match.
    pub negation_penalty: f64,
    /// Token window scanned backwards for negation cues.
    pub negation_window: usize,
    /// Token window scanned around a match for temporal cues.
    pub temporal_window: usize,
    /// Confidence multiplier for time-windowed factors lacking a cue.
    pub missing_temporal_penalty: f64,
    /// Jaro-Winkler floor for the fuzzy synonym fallback pass.
    pub fuzzy_threshold: f64,
    /// Minimum token length eligible for fuzzy matching.
    pub fuzzy_min_len: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            negation_penalty: 0.1,
            negation_window: 5,
            temporal_window: 10,
            missing_temporal_penalty: 0.6,
            fuzzy_threshold: 0.93,
            fuzzy_min_len: 5,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub pooling: PoolingConfig,
    pub caps: RiskCaps,
    pub extract: ExtractConfig,
    /// Per-request wall-clock budget in milliseconds.
    pub request_budget_ms: u64,
    /// Factors below this confidence do not trigger medication rules.
    pub med_rule_confidence_floor: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            pooling: PoolingConfig::default(),
            caps: RiskCaps::default(),
            extract: ExtractConfig::default(),
            request_budget_ms: 5_000,
            med_rule_confidence_floor: 0.5,
        }
    }
}

impl RiskConfig {
    /// Shipped defaults with the 5 s request budget.
    pub fn standard() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_budget() {
        let cfg = RiskConfig::standard();
        assert_eq!(cfg.request_budget_ms, 5_000);
        assert_eq!(cfg.caps.max_probability, 0.95);
        assert_eq!(cfg.caps.max_risk_ratio, 25.0);
    }

    #[test]
    fn test_config_roundtrip() {
        let cfg = RiskConfig::standard();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RiskConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
