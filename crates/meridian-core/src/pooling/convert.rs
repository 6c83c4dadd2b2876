//! Scale transforms and effect-measure conversions.

/// Probabilities are clamped away from 0/1 before logit transforms.
pub const PROB_FLOOR: f64 = 1e-4;

pub fn clamp_prob(p: f64) -> f64 {
    p.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR)
}

pub fn logit(p: f64) -> f64 {
    let p = clamp_prob(p);
    (p / (1.0 - p)).ln()
}

pub fn inv_logit(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// SE of a log-scale estimate recovered from a reported 95% CI.
pub fn se_from_log_ci(ci_low: f64, ci_high: f64) -> Option<f64> {
    if ci_low <= 0.0 || ci_high <= ci_low {
        return None;
    }
    Some((ci_high.ln() - ci_low.ln()) / (2.0 * 1.96))
}

/// SE of logit(p) recovered from a probability-scale 95% CI.
pub fn se_logit_from_ci(ci_low: f64, ci_high: f64) -> Option<f64> {
    if !(0.0..1.0).contains(&ci_low) || ci_high <= ci_low || ci_high >= 1.0 {
        return None;
    }
    Some((logit(ci_high) - logit(ci_low)) / (2.0 * 1.96))
}

/// Delta-method variance of logit(p) from a cohort of size n:
/// var(p) = p(1-p)/n, var(logit p) = 1 / (n p (1-p)).
pub fn logit_variance_from_n(p: f64, n: u32) -> Option<f64> {
    if n == 0 {
        return None;
    }
    let p = clamp_prob(p);
    Some(1.0 / (n as f64 * p * (1.0 - p)))
}

/// Wilson 95% score interval for a proportion. Used for sparse baselines
/// where the delta method is unreliable.
pub fn wilson_interval(events: f64, n: f64) -> (f64, f64) {
    let z = 1.96_f64;
    let p = (events / n).clamp(0.0, 1.0);
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denom;
    let half = (z / denom) * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();
    ((center - half).max(0.0), (center + half).min(1.0))
}

/// Convert a risk ratio to an odds ratio at a local baseline probability:
/// OR = RR(1 - p0) / (1 - RR * p0). An RR too large for the baseline
/// saturates rather than going negative.
pub fn rr_to_or(rr: f64, baseline_prob: f64) -> f64 {
    let p0 = clamp_prob(baseline_prob);
    let denominator = 1.0 - rr * p0;
    if denominator <= 0.0 {
        return 999.0;
    }
    rr * (1.0 - p0) / denominator
}

/// Haldane-Anscombe 0.5-corrected log OR and SE from a 2x2 table
/// (events/non-events in exposed and control arms).
pub fn haldane_anscombe_log_or(a: u32, b: u32, c: u32, d: u32) -> (f64, f64) {
    let a = a as f64 + 0.5;
    let b = b as f64 + 0.5;
    let c = c as f64 + 0.5;
    let d = d as f64 + 0.5;
    let log_or = ((a * d) / (b * c)).ln();
    let se = (1.0 / a + 1.0 / b + 1.0 / c + 1.0 / d).sqrt();
    (log_or, se)
}
