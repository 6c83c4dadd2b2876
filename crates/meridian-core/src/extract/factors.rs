//! Risk-factor extraction over the ontology synonym tables.
//!
//! Matching is a sequence of explicit passes: word-boundary synonym
//! matches, a negation-cue pass over the preceding token window, a
//! temporal-cue pass for time-windowed tokens, then a fuzzy fallback for
//! near-miss single words.

use std::collections::HashSet;

use strsim::jaro_winkler;

use crate::config::ExtractConfig;
use crate::models::{ExtractedFactor, OntologyTerm, SynonymStrength, TermType};
use crate::ontology::Ontology;

use super::normalize::{find_word_boundary_matches, NormalizedText};

const NEGATION_CUES: &[&str] = &["no", "denies", "denied", "without", "not"];

/// Outcome of the temporal pass for a time-windowed factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemporalState {
    /// A cue inside the factor's window supports the match.
    Supported,
    /// No cue found; confidence decays.
    Missing,
    /// An explicit out-of-window reference ("months/years ago") excludes
    /// the factor entirely.
    Excluded,
}

pub fn extract_factors(
    norm: &NormalizedText,
    ontology: &Ontology,
    config: &ExtractConfig,
) -> Vec<ExtractedFactor> {
    let mut factors: Vec<ExtractedFactor> = Vec::new();

    for term in ontology.terms_of_type(TermType::RiskFactor) {
        for candidate in term.match_candidates() {
            for (start, end) in find_word_boundary_matches(&norm.text, &candidate.text) {
                let token_start = norm.token_index_at(start);
                let token_end = norm.token_index_at(end);

                let mut confidence = candidate.strength.base_confidence();
                confidence *= negation_multiplier(norm, token_start, config);

                if term.time_windowed {
                    match temporal_state(norm, token_start, token_end, config) {
                        TemporalState::Supported => {}
                        TemporalState::Missing => confidence *= config.missing_temporal_penalty,
                        TemporalState::Excluded => continue,
                    }
                }

                factors.push(make_factor(term, confidence, norm.snippet(token_start, token_end.max(token_start + 1), 3)));
            }
        }
    }

    fuzzy_fallback(norm, ontology, config, &mut factors);
    factors
}

/// 0.1 when a negation cue sits within the window before the match.
fn negation_multiplier(norm: &NormalizedText, token_start: usize, config: &ExtractConfig) -> f64 {
    let lo = token_start.saturating_sub(config.negation_window);
    for i in lo..token_start {
        let text = norm.tokens[i].text.as_str();
        if NEGATION_CUES.contains(&text) {
            return config.negation_penalty;
        }
        // "ruled out" as a two-token cue
        if text == "ruled"
            && norm
                .tokens
                .get(i + 1)
                .map(|t| t.text == "out")
                .unwrap_or(false)
        {
            return config.negation_penalty;
        }
    }
    1.0
}

/// Scan the window around a match for temporal cues. Numeric day/week
/// references and "recent"/"last week" support the factor; explicit
/// month/year references push it outside its time window.
fn temporal_state(
    norm: &NormalizedText,
    token_start: usize,
    token_end: usize,
    config: &ExtractConfig,
) -> TemporalState {
    let lo = token_start.saturating_sub(config.temporal_window);
    let hi = (token_end + config.temporal_window).min(norm.tokens.len());

    let mut state = TemporalState::Missing;
    for i in lo..hi {
        let text = norm.tokens[i].text.as_str();
        match text {
            "recent" | "recently" | "yesterday" | "today" => state = TemporalState::Supported,
            "last" => {
                if let Some(next) = norm.tokens.get(i + 1) {
                    if next.text == "week" || next.text == "night" {
                        state = TemporalState::Supported;
                    }
                }
            }
            "week" | "weeks" | "day" | "days" => {
                if is_numeric(norm, i.wrapping_sub(1)) {
                    state = TemporalState::Supported;
                }
            }
            "month" | "months" | "year" | "years" => {
                let followed_by_ago = norm
                    .tokens
                    .get(i + 1)
                    .map(|t| t.text == "ago")
                    .unwrap_or(false);
                if followed_by_ago {
                    return TemporalState::Excluded;
                }
            }
            _ => {}
        }
    }
    state
}

fn is_numeric(norm: &NormalizedText, index: usize) -> bool {
    norm.tokens
        .get(index)
        .map(|t| t.text.parse::<f64>().is_ok())
        .unwrap_or(false)
}

/// Near-miss single words (length >= `fuzzy_min_len`) match single-word
/// synonyms at WEAK confidence. Exact matches always win; a token already
/// covered by an exact match is skipped.
fn fuzzy_fallback(
    norm: &NormalizedText,
    ontology: &Ontology,
    config: &ExtractConfig,
    factors: &mut Vec<ExtractedFactor>,
) {
    let matched_tokens: HashSet<String> = factors.iter().map(|f| f.token.clone()).collect();

    for (i, token) in norm.tokens.iter().enumerate() {
        if token.text.len() < config.fuzzy_min_len {
            continue;
        }
        if ontology.lookup_synonym(&token.text).is_some() {
            continue;
        }

        let mut best: Option<(f64, &OntologyTerm)> = None;
        for term in ontology.terms_of_type(TermType::RiskFactor) {
            if matched_tokens.contains(&term.token) || term.time_windowed {
                continue;
            }
            for candidate in term.match_candidates() {
                if candidate.text.contains(' ') || candidate.text.len() < config.fuzzy_min_len {
                    continue;
                }
                let score = jaro_winkler(&token.text, &candidate.text);
                if score >= config.fuzzy_threshold {
                    let better = best.map(|(s, _)| score > s).unwrap_or(true);
                    if better {
                        best = Some((score, term));
                    }
                }
            }
        }

        if let Some((_, term)) = best {
            let mut confidence = SynonymStrength::Weak.base_confidence();
            confidence *= negation_multiplier(norm, i, config);
            factors.push(make_factor(
                term,
                confidence,
                norm.snippet(i, i + 1, 3),
            ));
        }
    }
}

fn make_factor(term: &OntologyTerm, confidence: f64, span: String) -> ExtractedFactor {
    ExtractedFactor {
        token: term.token.clone(),
        plain_label: term.plain_label.clone(),
        confidence,
        evidence_text: vec![span],
        category: term.category.clone(),
        severity_weight: term.severity_weight,
    }
}

/// Collapse duplicate tokens to the highest-confidence match, keeping
/// every evidence span. Output is sorted by token.
pub fn deduplicate(factors: Vec<ExtractedFactor>) -> Vec<ExtractedFactor> {
    let mut by_token: Vec<ExtractedFactor> = Vec::new();
    for factor in factors {
        match by_token.iter_mut().find(|f| f.token == factor.token) {
            Some(existing) => {
                if factor.confidence > existing.confidence {
                    existing.confidence = factor.confidence;
                }
                for span in factor.evidence_text {
                    if !existing.evidence_text.contains(&span) {
                        existing.evidence_text.push(span);
                    }
                }
            }
            None => by_token.push(factor),
        }
    }
    by_token.sort_by(|a, b| a.token.cmp(&b.token));
    by_token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::normalize::normalize;

    fn factors(text: &str) -> Vec<ExtractedFactor> {
        let ontology = Ontology::builtin();
        let config = ExtractConfig::default();
        deduplicate(extract_factors(&normalize(text), &ontology, &config))
    }

    fn find<'a>(list: &'a [ExtractedFactor], token: &str) -> Option<&'a ExtractedFactor> {
        list.iter().find(|f| f.token == token)
    }

    #[test]
    fn test_canonical_match_confidence() {
        let list = factors("history significant for asthma");
        let asthma = find(&list, "ASTHMA").unwrap();
        assert!((asthma.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_listed_synonym_confidence() {
        let list = factors("known reactive airway disease");
        let asthma = find(&list, "ASTHMA").unwrap();
        assert!((asthma.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_negation_suppresses() {
        let list = factors("patient denies asthma, no history of smoking");
        let asthma = find(&list, "ASTHMA").unwrap();
        assert!(asthma.confidence < 0.5);
        let smoking = find(&list, "SMOKING_HISTORY").unwrap();
        assert!(smoking.confidence < 0.5);
    }

    #[test]
    fn test_negation_window_limited() {
        // Cue is more than five tokens before the match
        let list = factors("no acute distress today though patient does have asthma");
        let asthma = find(&list, "ASTHMA").unwrap();
        assert!(asthma.confidence > 0.5);
    }

    #[test]
    fn test_time_windowed_with_cue() {
        let list = factors("recent upper respiratory infection 2 weeks ago");
        let uri = find(&list, "RECENT_URI_2W").unwrap();
        assert!((uri.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_time_windowed_without_cue_decays() {
        // "upper respiratory infection" is a listed synonym (0.85); the
        // missing temporal cue multiplies in 0.6.
        let list = factors("history of upper respiratory infection");
        let uri = find(&list, "RECENT_URI_2W").unwrap();
        assert!((uri.confidence - 0.85 * 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_months_ago_excludes() {
        let list = factors("had upper respiratory infection 3 months ago");
        assert!(find(&list, "RECENT_URI_2W").is_none());
    }

    #[test]
    fn test_years_ago_excludes() {
        let list = factors("upper respiratory infection 2 years ago");
        assert!(find(&list, "RECENT_URI_2W").is_none());
    }

    #[test]
    fn test_dedup_keeps_best_confidence() {
        // "asthma" canonical (0.95) and "reactive airway disease" listed (0.85)
        let list = factors("asthma with reactive airway disease");
        let matching: Vec<_> = list.iter().filter(|f| f.token == "ASTHMA").collect();
        assert_eq!(matching.len(), 1);
        assert!((matching[0].confidence - 0.95).abs() < 1e-9);
        assert_eq!(matching[0].evidence_text.len(), 2);
    }

    #[test]
    fn test_fuzzy_fallback_catches_typo() {
        let list = factors("longstanding asthmaa poorly controlled");
        let asthma = find(&list, "ASTHMA").unwrap();
        assert!((asthma.confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_does_not_cross_terms() {
        // "anemia" and "asthma" are not within the fuzzy threshold
        let list = factors("iron deficiency anemia");
        assert!(find(&list, "ASTHMA").is_none());
        assert!(find(&list, "ANEMIA").is_some());
    }

    #[test]
    fn test_multiword_factors() {
        let list = factors("coronary artery disease and chronic kidney disease");
        assert!(find(&list, "CAD").is_some());
        assert!(find(&list, "CKD").is_some());
    }
}
