//! Demographics extraction: age, sex, weight, procedure, urgency.

use crate::models::{AgeBand, Demographics, Sex, TermType, Urgency};
use crate::ontology::Ontology;

use super::normalize::{find_word_boundary_matches, NormalizedText};

const AGE_YEAR_UNITS: &[&str] = &["year", "years", "yr", "yrs"];
const AGE_MONTH_UNITS: &[&str] = &["month", "months", "mo"];

pub fn extract_demographics(norm: &NormalizedText, ontology: &Ontology) -> Demographics {
    let mut demo = Demographics {
        age_years: extract_age(norm),
        ..Demographics::default()
    };

    demo.age_band = match demo.age_years {
        Some(age) => AgeBand::from_years(age),
        None => band_from_words(norm, ontology),
    };
    demo.sex = extract_sex(norm);
    demo.weight_kg = extract_weight(norm);
    demo.procedure = extract_procedure(norm, ontology);
    demo.urgency = extract_urgency(norm);
    demo
}

/// First `<number> <year|month unit>` pair wins. A trailing "ago" marks a
/// temporal phrase, not an age.
fn extract_age(norm: &NormalizedText) -> Option<f64> {
    let tokens = &norm.tokens;
    for i in 0..tokens.len().saturating_sub(1) {
        let value: f64 = match tokens[i].text.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let unit = tokens[i + 1].text.as_str();
        let followed_by_ago = tokens.get(i + 2).map(|t| t.text == "ago").unwrap_or(false);
        if followed_by_ago {
            continue;
        }

        let age_years = if AGE_YEAR_UNITS.contains(&unit) {
            value
        } else if AGE_MONTH_UNITS.contains(&unit) {
            value / 12.0
        } else {
            continue;
        };

        if (0.0..=120.0).contains(&age_years) {
            return Some(age_years);
        }
    }
    None
}

/// When no numeric age is present, demographic-band synonyms in the text
/// ("adult", "infant", "adolescent") still pin the band.
fn band_from_words(norm: &NormalizedText, ontology: &Ontology) -> AgeBand {
    let bands = [
        ("AGE_LT_1", AgeBand::Lt1),
        ("AGE_1_5", AgeBand::Age1To5),
        ("AGE_6_12", AgeBand::Age6To12),
        ("AGE_13_17", AgeBand::Age13To17),
        ("AGE_18_64", AgeBand::Age18To64),
        ("AGE_GE_65", AgeBand::Ge65),
    ];

    let mut best: Option<(usize, AgeBand)> = None;
    for (token, band) in bands {
        let term = match ontology.term(token) {
            Some(t) => t,
            None => continue,
        };
        for candidate in term.match_candidates() {
            for (start, _) in find_word_boundary_matches(&norm.text, &candidate.text) {
                if best.map(|(pos, _)| start < pos).unwrap_or(true) {
                    best = Some((start, band));
                }
            }
        }
    }
    best.map(|(_, band)| band).unwrap_or(AgeBand::Unknown)
}

fn extract_sex(norm: &NormalizedText) -> Option<Sex> {
    for token in &norm.tokens {
        match token.text.as_str() {
            "male" | "boy" | "man" => return Some(Sex::Male),
            "female" | "girl" | "woman" => return Some(Sex::Female),
            _ => {}
        }
    }
    None
}

fn extract_weight(norm: &NormalizedText) -> Option<f64> {
    let tokens = &norm.tokens;
    for i in 0..tokens.len().saturating_sub(1) {
        if tokens[i + 1].text == "kg" || tokens[i + 1].text == "kilograms" {
            if let Ok(weight) = tokens[i].text.parse::<f64>() {
                if (0.5..=300.0).contains(&weight) {
                    return Some(weight);
                }
            }
        }
    }
    None
}

/// Earliest procedure-synonym match wins.
fn extract_procedure(norm: &NormalizedText, ontology: &Ontology) -> Option<String> {
    let mut best: Option<(usize, String)> = None;
    for term in ontology.terms_of_type(TermType::Procedure) {
        for candidate in term.match_candidates() {
            for (start, _) in find_word_boundary_matches(&norm.text, &candidate.text) {
                let earlier = best.as_ref().map(|(pos, _)| start < *pos).unwrap_or(true);
                if earlier {
                    best = Some((start, term.token.clone()));
                }
            }
        }
    }
    best.map(|(_, token)| token)
}

fn extract_urgency(norm: &NormalizedText) -> Urgency {
    for token in &norm.tokens {
        match token.text.as_str() {
            "emergent" | "emergency" | "stat" => return Urgency::Emergent,
            _ => {}
        }
    }
    for token in &norm.tokens {
        match token.text.as_str() {
            "urgent" | "asap" => return Urgency::Urgent,
            _ => {}
        }
    }
    Urgency::Elective
}
