//! Symbolic dose-rule resolution.

use crate::models::Demographics;

/// A dose rule after placeholder substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDose {
    pub text: String,
    /// The rule needed `{weight_kg}` but the request carried no weight.
    pub missing_weight: bool,
}

/// Substitute `{weight_kg}` and `{age_years}` from demographics. Unresolvable
/// placeholders stay verbatim so the consumer can see what is missing.
pub fn resolve_dose_rule(rule: &str, demographics: &Demographics) -> ResolvedDose {
    let mut text = rule.to_string();
    let mut missing_weight = false;

    if text.contains("{weight_kg}") {
        match demographics.weight_kg {
            Some(weight) => {
                text = text.replace("{weight_kg}", &format_number(weight));
            }
            None => missing_weight = true,
        }
    }

    if text.contains("{age_years}") {
        if let Some(age) = demographics.age_years {
            text = text.replace("{age_years}", &format_number(age));
        }
    }

    ResolvedDose {
        text,
        missing_weight,
    }
}

/// Trim trailing zeros: 18.0 -> "18", 17.5 -> "17.5".
fn format_number(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value:.1}")
    }
}
