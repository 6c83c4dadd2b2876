//! Random-effects pooling math.
//!
//! Inverse-variance pooling on a transformed scale (logit for baselines,
//! ln for odds ratios) with composite quality weights, DerSimonian-Laird
//! and Paule-Mandel tau^2, Hartung-Knapp small-k adjustment, and I^2.

use statrs::distribution::{ChiSquared, ContinuousCDF, StudentsT};

use crate::config::PoolingConfig;
use crate::models::{EvidenceGrade, PoolingMethod};

/// One study's contribution on the pooled scale.
#[derive(Debug, Clone)]
pub struct StudyPoint {
    /// Transformed estimate (logit p or ln OR).
    pub y: f64,
    /// Standard error on the transformed scale.
    pub se: f64,
    /// Composite multiplier: quality x population match x conversion penalty.
    pub weight_mult: f64,
    pub pmid: String,
    pub grade: EvidenceGrade,
}

/// Pooled result on the transformed scale.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolResult {
    pub mean: f64,
    pub se: f64,
    /// CI half-width multiplier: 1.96, or a t quantile under Hartung-Knapp.
    pub ci_multiplier: f64,
    pub tau_squared: f64,
    pub i_squared: f64,
    pub q_statistic: f64,
    pub p_heterogeneity: f64,
    pub k: u32,
    pub total_weight: f64,
    pub method: PoolingMethod,
    pub hk_used: bool,
}

/// Pool k >= 2 study points. Returns None when the arithmetic degenerates
/// (non-finite weights or SE), which callers surface as POOLING_FAILED.
pub fn pool(points: &[StudyPoint], config: &PoolingConfig) -> Option<PoolResult> {
    let k = points.len();
    if k < 2 {
        return None;
    }
    if points.iter().any(|p| !p.y.is_finite() || !p.se.is_finite() || p.se <= 0.0) {
        return None;
    }

    // Fixed-effect weights for Q and tau^2 estimation.
    let fixed_weights: Vec<f64> = points
        .iter()
        .map(|p| p.weight_mult / (p.se * p.se))
        .collect();
    let fixed_sum: f64 = fixed_weights.iter().sum();
    if !fixed_sum.is_finite() || fixed_sum <= 0.0 {
        return None;
    }
    let fixed_mean = points
        .iter()
        .zip(&fixed_weights)
        .map(|(p, w)| w * p.y)
        .sum::<f64>()
        / fixed_sum;

    let q: f64 = points
        .iter()
        .zip(&fixed_weights)
        .map(|(p, w)| w * (p.y - fixed_mean).powi(2))
        .sum();
    let df = (k - 1) as f64;
    let i_squared = if q > 0.0 { ((q - df) / q).max(0.0) } else { 0.0 };
    let p_heterogeneity = chi2_survival(q, df);

    let tau_dl = tau_squared_dl(&fixed_weights, fixed_sum, q, df);
    let (tau_squared, method) = if k as u32 >= config.paule_mandel_min_k {
        (
            tau_squared_paule_mandel(points, df, tau_dl),
            PoolingMethod::PauleMandel,
        )
    } else if tau_dl > 0.0 {
        (tau_dl, PoolingMethod::DerSimonianLaird)
    } else {
        (0.0, PoolingMethod::FixedEffect)
    };

    // Final random-effects weights.
    let weights: Vec<f64> = points
        .iter()
        .map(|p| p.weight_mult / (p.se * p.se + tau_squared))
        .collect();
    let total_weight: f64 = weights.iter().sum();
    let mean = points
        .iter()
        .zip(&weights)
        .map(|(p, w)| w * p.y)
        .sum::<f64>()
        / total_weight;
    let mut se = (1.0 / total_weight).sqrt();

    // Hartung-Knapp for small k.
    let (hk_lo, hk_hi) = config.hartung_knapp_k_range;
    let hk_used = (hk_lo..=hk_hi).contains(&(k as u32));
    let ci_multiplier = if hk_used {
        let rss: f64 = points
            .iter()
            .zip(&weights)
            .map(|(p, w)| w * (p.y - mean).powi(2))
            .sum();
        let s_squared = rss / df;
        if s_squared > 0.0 {
            se = (s_squared / total_weight).sqrt();
        }
        t_quantile_975(df)
    } else {
        1.96
    };

    if !mean.is_finite() || !se.is_finite() || se <= 0.0 {
        return None;
    }

    Some(PoolResult {
        mean,
        se,
        ci_multiplier,
        tau_squared,
        i_squared,
        q_statistic: q,
        p_heterogeneity,
        k: k as u32,
        total_weight,
        method,
        hk_used,
    })
}

/// DerSimonian-Laird tau^2.
fn tau_squared_dl(weights: &[f64], sum_w: f64, q: f64, df: f64) -> f64 {
    if df <= 0.0 {
        return 0.0;
    }
    let sum_w2: f64 = weights.iter().map(|w| w * w).sum();
    let c = sum_w - sum_w2 / sum_w;
    if c <= 0.0 {
        return 0.0;
    }
    ((q - df) / c).max(0.0)
}

/// Paule-Mandel tau^2: the generalized-Q solution of Q(tau^2) = k - 1,
/// found by bisection. Falls back to the DL seed when Q is already below
/// its expectation at tau^2 = 0.
fn tau_squared_paule_mandel(points: &[StudyPoint], df: f64, dl_seed: f64) -> f64 {
    let q_at = |tau2: f64| -> f64 {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| p.weight_mult / (p.se * p.se + tau2))
            .collect();
        let sum_w: f64 = weights.iter().sum();
        let mean = points
            .iter()
            .zip(&weights)
            .map(|(p, w)| w * p.y)
            .sum::<f64>()
            / sum_w;
        points
            .iter()
            .zip(&weights)
            .map(|(p, w)| w * (p.y - mean).powi(2))
            .sum()
    };

    if q_at(0.0) <= df {
        return 0.0;
    }

    let mut lo = 0.0_f64;
    let mut hi = (dl_seed * 4.0).max(1.0);
    // Grow the bracket until Q(hi) drops below df.
    let mut grow = 0;
    while q_at(hi) > df && grow < 20 {
        hi *= 2.0;
        grow += 1;
    }

    for _ in 0..50 {
        let mid = 0.5 * (lo + hi);
        if q_at(mid) > df {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-6 {
            break;
        }
    }
    0.5 * (lo + hi)
}

/// Two-sided 97.5% Student-t quantile.
fn t_quantile_975(df: f64) -> f64 {
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => dist.inverse_cdf(0.975),
        Err(_) => 1.96,
    }
}

/// Chi-squared survival function for the heterogeneity p-value.
fn chi2_survival(q: f64, df: f64) -> f64 {
    if df <= 0.0 || q <= 0.0 {
        return 1.0;
    }
    match ChiSquared::new(df) {
        Ok(dist) => (1.0 - dist.cdf(q)).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Pooled grade: best grade among studies carrying at least
/// `share` of the total weight; when the weight is too fragmented for any
/// single study to qualify, the worst contributing grade is used.
pub fn pooled_grade(points: &[StudyPoint], tau_squared: f64, share: f64) -> EvidenceGrade {
    let weights: Vec<f64> = points
        .iter()
        .map(|p| p.weight_mult / (p.se * p.se + tau_squared))
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return points
            .iter()
            .map(|p| p.grade)
            .max()
            .unwrap_or(EvidenceGrade::D);
    }

    let qualifying: Vec<EvidenceGrade> = points
        .iter()
        .zip(&weights)
        .filter(|(_, w)| **w / total >= share)
        .map(|(p, _)| p.grade)
        .collect();

    if qualifying.is_empty() {
        points
            .iter()
            .map(|p| p.grade)
            .max()
            .unwrap_or(EvidenceGrade::D)
    } else {
        qualifying.into_iter().min().unwrap_or(EvidenceGrade::D)
    }
}
