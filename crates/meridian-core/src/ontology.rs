//! The closed clinical ontology.
//!
//! Terms are built in code and seeded into the store at init; one canonical
//! instance lives for the process lifetime and is shared read-only by the
//! extractor, risk calculator, and medication planner.

use std::collections::HashMap;

use crate::models::{OntologyTerm, Synonym, SynonymStrength, TermType};

/// Immutable term table with an O(1) synonym index.
#[derive(Debug, Clone)]
pub struct Ontology {
    terms: HashMap<String, OntologyTerm>,
    /// lowercase synonym -> (token, strength). On collision the stronger
    /// tier wins, then the alphabetically earlier token.
    synonym_index: HashMap<String, (String, SynonymStrength)>,
}

impl Ontology {
    /// Build from an explicit term list.
    pub fn from_terms(terms: Vec<OntologyTerm>) -> Self {
        let mut sorted = terms;
        sorted.sort_by(|a, b| a.token.cmp(&b.token));

        let mut synonym_index: HashMap<String, (String, SynonymStrength)> = HashMap::new();
        for term in &sorted {
            for Synonym { text, strength } in term.match_candidates() {
                match synonym_index.get(&text) {
                    // Existing entry is at least as strong; terms are sorted,
                    // so ties keep the alphabetically earlier token.
                    Some((_, existing)) if *existing <= strength => {}
                    _ => {
                        synonym_index.insert(text, (term.token.clone(), strength));
                    }
                }
            }
        }

        let terms = sorted.into_iter().map(|t| (t.token.clone(), t)).collect();
        Self {
            terms,
            synonym_index,
        }
    }

    pub fn term(&self, token: &str) -> Option<&OntologyTerm> {
        self.terms.get(token)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms of one type, sorted by token for deterministic iteration.
    pub fn terms_of_type(&self, term_type: TermType) -> Vec<&OntologyTerm> {
        let mut out: Vec<&OntologyTerm> = self
            .terms
            .values()
            .filter(|t| t.term_type == term_type)
            .collect();
        out.sort_by(|a, b| a.token.cmp(&b.token));
        out
    }

    pub fn all_terms(&self) -> Vec<&OntologyTerm> {
        let mut out: Vec<&OntologyTerm> = self.terms.values().collect();
        out.sort_by(|a, b| a.token.cmp(&b.token));
        out
    }

    /// Resolve a lowercase string through the synonym index.
    pub fn lookup_synonym(&self, synonym: &str) -> Option<(&OntologyTerm, SynonymStrength)> {
        let (token, strength) = self.synonym_index.get(synonym)?;
        self.terms.get(token).map(|t| (t, *strength))
    }

    /// The shipped perioperative vocabulary.
    pub fn builtin() -> Self {
        let mut terms: Vec<OntologyTerm> = Vec::new();

        // ---- Outcomes ----
        terms.push(
            OntologyTerm::new("LARYNGOSPASM", TermType::Outcome, "Laryngospasm", "airway")
                .with_severity(3.0)
                .with_synonyms(&["laryngeal spasm", "vocal cord spasm"]),
        );
        terms.push(
            OntologyTerm::new("BRONCHOSPASM", TermType::Outcome, "Bronchospasm", "airway")
                .with_severity(2.0)
                .with_synonyms(&["bronchial spasm", "wheezing episode"]),
        );
        terms.push(
            OntologyTerm::new("ASPIRATION", TermType::Outcome, "Pulmonary aspiration", "airway")
                .with_severity(4.0)
                .with_synonyms(&["gastric aspiration", "mendelson syndrome"]),
        );
        terms.push(
            OntologyTerm::new(
                "DIFFICULT_INTUBATION",
                TermType::Outcome,
                "Difficult intubation",
                "airway",
            )
            .with_severity(3.0)
            .with_synonyms(&["failed intubation", "multiple intubation attempts"]),
        );
        terms.push(
            OntologyTerm::new(
                "PONV",
                TermType::Outcome,
                "Postoperative nausea and vomiting",
                "gastrointestinal",
            )
            .with_severity(2.0)
            .with_synonyms(&["postoperative nausea", "postoperative vomiting"]),
        );
        terms.push(
            OntologyTerm::new(
                "INTRAOP_HYPOTENSION",
                TermType::Outcome,
                "Intraoperative hypotension",
                "cardiovascular",
            )
            .with_severity(2.0),
        );
        terms.push(
            OntologyTerm::new(
                "POSTOP_DELIRIUM",
                TermType::Outcome,
                "Postoperative delirium",
                "neurologic",
            )
            .with_severity(3.0),
        );
        terms.push(
            OntologyTerm::new(
                "ACUTE_KIDNEY_INJURY",
                TermType::Outcome,
                "Acute kidney injury",
                "renal",
            )
            .with_severity(3.5)
            .with_synonyms(&["acute renal failure"]),
        );
        terms.push(
            OntologyTerm::new(
                "EMERGENCE_AGITATION",
                TermType::Outcome,
                "Emergence agitation",
                "neurologic",
            )
            .with_severity(2.0)
            .with_synonyms(&["emergence delirium"]),
        );
        terms.push(
            OntologyTerm::new(
                "POST_TONSILLECTOMY_BLEEDING",
                TermType::Outcome,
                "Post-tonsillectomy bleeding",
                "hemostasis",
            )
            .with_severity(3.0)
            .with_synonyms(&["tonsillectomy bleeding"]),
        );

        // ---- Risk factors ----
        terms.push(
            OntologyTerm::new("ASTHMA", TermType::RiskFactor, "Asthma", "pulmonary")
                .with_severity(2.0)
                .with_synonyms(&["bronchial asthma", "reactive airway disease"]),
        );
        terms.push(
            OntologyTerm::new(
                "RECENT_URI_2W",
                TermType::RiskFactor,
                "Recent upper respiratory infection",
                "pulmonary",
            )
            .with_severity(2.0)
            .with_synonyms(&["upper respiratory infection", "recent uri", "recent cold"])
            .time_windowed(),
        );
        terms.push(
            OntologyTerm::new("OSA", TermType::RiskFactor, "Obstructive sleep apnea", "airway")
                .with_severity(2.5)
                .with_synonyms(&["sleep apnea"]),
        );
        terms.push(
            OntologyTerm::new(
                "COPD",
                TermType::RiskFactor,
                "Chronic obstructive pulmonary disease",
                "pulmonary",
            )
            .with_severity(2.5)
            .with_synonyms(&["copd", "emphysema", "chronic bronchitis"]),
        );
        terms.push(
            OntologyTerm::new(
                "SMOKING_HISTORY",
                TermType::RiskFactor,
                "Smoking history",
                "lifestyle",
            )
            .with_severity(1.5)
            .with_synonyms(&["smoking", "smoker", "tobacco use"]),
        );
        terms.push(
            OntologyTerm::new("DIABETES", TermType::RiskFactor, "Diabetes mellitus", "endocrine")
                .with_severity(2.0)
                .with_synonyms(&["diabetes", "diabetic"]),
        );
        terms.push(
            OntologyTerm::new("HYPERTENSION", TermType::RiskFactor, "Hypertension", "cardiac")
                .with_severity(1.5)
                .with_synonyms(&["high blood pressure"]),
        );
        terms.push(
            OntologyTerm::new("CAD", TermType::RiskFactor, "Coronary artery disease", "cardiac")
                .with_severity(2.5)
                .with_synonyms(&["ischemic heart disease"]),
        );
        terms.push(
            OntologyTerm::new("CKD", TermType::RiskFactor, "Chronic kidney disease", "renal")
                .with_severity(2.5)
                .with_synonyms(&["kidney disease", "renal insufficiency"]),
        );
        terms.push(
            OntologyTerm::new("HEART_FAILURE", TermType::RiskFactor, "Heart failure", "cardiac")
                .with_severity(3.0)
                .with_synonyms(&["congestive heart failure"]),
        );
        terms.push(
            OntologyTerm::new("OBESITY", TermType::RiskFactor, "Obesity", "metabolic")
                .with_severity(2.0)
                .with_synonyms(&["obese", "morbidly obese"]),
        );
        terms.push(
            OntologyTerm::new(
                "GERD",
                TermType::RiskFactor,
                "Gastroesophageal reflux disease",
                "gastrointestinal",
            )
            .with_severity(1.5)
            .with_synonyms(&["reflux", "gastroesophageal reflux"]),
        );
        terms.push(
            OntologyTerm::new("PREGNANCY", TermType::RiskFactor, "Pregnancy", "demographics")
                .with_severity(2.0)
                .with_synonyms(&["pregnant", "gravid"]),
        );
        terms.push(
            OntologyTerm::new("PREMATURITY", TermType::RiskFactor, "Prematurity", "demographics")
                .with_severity(2.0)
                .with_synonyms(&["premature", "preterm", "ex-premature"]),
        );
        terms.push(
            OntologyTerm::new(
                "SEIZURE_DISORDER",
                TermType::RiskFactor,
                "Seizure disorder",
                "neurologic",
            )
            .with_severity(2.0)
            .with_synonyms(&["epilepsy", "seizures"]),
        );
        terms.push(
            OntologyTerm::new("ANEMIA", TermType::RiskFactor, "Anemia", "hematologic")
                .with_severity(1.5)
                .with_synonyms(&["anemic", "low hemoglobin"]),
        );

        // ---- Demographic bands ----
        terms.push(
            OntologyTerm::new("AGE_LT_1", TermType::Demographic, "Age under 1 year", "demographics")
                .with_synonyms(&["infant", "neonate"]),
        );
        terms.push(
            OntologyTerm::new("AGE_1_5", TermType::Demographic, "Age 1-5 years", "demographics")
                .with_synonyms(&["toddler", "preschool age"]),
        );
        terms.push(
            OntologyTerm::new("AGE_6_12", TermType::Demographic, "Age 6-12 years", "demographics")
                .with_synonyms(&["school age"]),
        );
        terms.push(
            OntologyTerm::new("AGE_13_17", TermType::Demographic, "Age 13-17 years", "demographics")
                .with_synonyms(&["adolescent", "teenager"]),
        );
        terms.push(
            OntologyTerm::new("AGE_18_64", TermType::Demographic, "Age 18-64 years", "demographics")
                .with_synonyms(&["adult"]),
        );
        terms.push(
            OntologyTerm::new("AGE_GE_65", TermType::Demographic, "Age 65 or older", "demographics")
                .with_synonyms(&["elderly"]),
        );
        terms.push(
            OntologyTerm::new("SEX_MALE", TermType::Demographic, "Male sex", "demographics")
                .with_synonyms(&["male"]),
        );
        terms.push(
            OntologyTerm::new("SEX_FEMALE", TermType::Demographic, "Female sex", "demographics")
                .with_synonyms(&["female"]),
        );

        // ---- Procedures (category is the case-type context dimension) ----
        terms.push(
            OntologyTerm::new("TONSILLECTOMY", TermType::Procedure, "Tonsillectomy", "ENT")
                .with_synonyms(&["adenotonsillectomy", "tonsillectomy and adenoidectomy"]),
        );
        terms.push(OntologyTerm::new(
            "ADENOIDECTOMY",
            TermType::Procedure,
            "Adenoidectomy",
            "ENT",
        ));
        terms.push(
            OntologyTerm::new(
                "CABG",
                TermType::Procedure,
                "Coronary artery bypass grafting",
                "CARDIAC",
            )
            .with_synonyms(&["cabg", "coronary artery bypass", "bypass surgery"]),
        );
        terms.push(
            OntologyTerm::new("HERNIA_REPAIR", TermType::Procedure, "Hernia repair", "GENERAL")
                .with_synonyms(&["inguinal hernia repair", "herniorrhaphy"]),
        );
        terms.push(
            OntologyTerm::new("APPENDECTOMY", TermType::Procedure, "Appendectomy", "GENERAL")
                .with_weak_synonyms(&["appy"]),
        );
        terms.push(
            OntologyTerm::new(
                "CESAREAN_SECTION",
                TermType::Procedure,
                "Cesarean section",
                "OBSTETRIC",
            )
            .with_synonyms(&["cesarean", "c-section"]),
        );

        // ---- Medications ----
        terms.push(
            OntologyTerm::new("PROPOFOL", TermType::Medication, "Propofol", "induction")
                .with_synonyms(&["diprivan"]),
        );
        terms.push(
            OntologyTerm::new("KETAMINE", TermType::Medication, "Ketamine", "induction")
                .with_synonyms(&["ketalar"]),
        );
        terms.push(OntologyTerm::new(
            "ETOMIDATE",
            TermType::Medication,
            "Etomidate",
            "induction",
        ));
        terms.push(
            OntologyTerm::new("SEVOFLURANE", TermType::Medication, "Sevoflurane", "volatile")
                .with_synonyms(&["ultane"]),
        );
        terms.push(
            OntologyTerm::new("DESFLURANE", TermType::Medication, "Desflurane", "volatile")
                .with_synonyms(&["suprane"]),
        );
        terms.push(
            OntologyTerm::new("FENTANYL", TermType::Medication, "Fentanyl", "opioid")
                .with_synonyms(&["sublimaze"]),
        );
        terms.push(OntologyTerm::new(
            "MORPHINE",
            TermType::Medication,
            "Morphine",
            "opioid",
        ));
        terms.push(
            OntologyTerm::new("DEXAMETHASONE", TermType::Medication, "Dexamethasone", "steroid")
                .with_synonyms(&["decadron"]),
        );
        terms.push(
            OntologyTerm::new("ONDANSETRON", TermType::Medication, "Ondansetron", "antiemetic")
                .with_synonyms(&["zofran"]),
        );
        terms.push(
            OntologyTerm::new("ALBUTEROL", TermType::Medication, "Albuterol", "bronchodilator")
                .with_synonyms(&["salbutamol", "ventolin"]),
        );
        terms.push(
            OntologyTerm::new(
                "SUCCINYLCHOLINE",
                TermType::Medication,
                "Succinylcholine",
                "depolarizing_nmbd",
            )
            .with_synonyms(&["suxamethonium", "anectine"]),
        );
        terms.push(
            OntologyTerm::new(
                "ROCURONIUM",
                TermType::Medication,
                "Rocuronium",
                "nondepolarizing_nmbd",
            )
            .with_synonyms(&["zemuron"]),
        );
        terms.push(
            OntologyTerm::new(
                "CISATRACURIUM",
                TermType::Medication,
                "Cisatracurium",
                "nondepolarizing_nmbd",
            )
            .with_synonyms(&["nimbex"]),
        );
        terms.push(
            OntologyTerm::new("KETOROLAC", TermType::Medication, "Ketorolac", "nsaid")
                .with_synonyms(&["toradol"]),
        );
        terms.push(
            OntologyTerm::new("IBUPROFEN", TermType::Medication, "Ibuprofen", "nsaid")
                .with_synonyms(&["motrin", "advil"]),
        );
        terms.push(
            OntologyTerm::new("MIDAZOLAM", TermType::Medication, "Midazolam", "benzodiazepine")
                .with_synonyms(&["versed"]),
        );
        terms.push(
            OntologyTerm::new(
                "DEXMEDETOMIDINE",
                TermType::Medication,
                "Dexmedetomidine",
                "alpha2_agonist",
            )
            .with_synonyms(&["precedex"]),
        );
        terms.push(OntologyTerm::new(
            "ATROPINE",
            TermType::Medication,
            "Atropine",
            "anticholinergic",
        ));
        terms.push(
            OntologyTerm::new(
                "GLYCOPYRROLATE",
                TermType::Medication,
                "Glycopyrrolate",
                "anticholinergic",
            )
            .with_synonyms(&["robinul"]),
        );
        terms.push(
            OntologyTerm::new("EPINEPHRINE", TermType::Medication, "Epinephrine", "vasopressor")
                .with_synonyms(&["adrenaline"]),
        );

        Self::from_terms(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_nonempty() {
        let ont = Ontology::builtin();
        assert!(ont.len() > 40);
        assert!(!ont.is_empty());
    }

    #[test]
    fn test_tokens_unique_and_uppercase() {
        let ont = Ontology::builtin();
        let terms = ont.all_terms();
        let unique: std::collections::HashSet<&str> =
            terms.iter().map(|t| t.token.as_str()).collect();
        assert_eq!(unique.len(), terms.len());
        for term in &terms {
            assert_eq!(term.token, term.token.to_uppercase());
        }
    }

    #[test]
    fn test_synonym_lookup() {
        let ont = Ontology::builtin();
        let (term, strength) = ont.lookup_synonym("asthma").unwrap();
        assert_eq!(term.token, "ASTHMA");
        assert_eq!(strength, SynonymStrength::Canonical);

        let (term, strength) = ont.lookup_synonym("sleep apnea").unwrap();
        assert_eq!(term.token, "OSA");
        assert_eq!(strength, SynonymStrength::Listed);

        assert!(ont.lookup_synonym("no such term").is_none());
    }

    #[test]
    fn test_all_synonyms_lowercase() {
        let ont = Ontology::builtin();
        for term in ont.all_terms() {
            for syn in &term.synonyms {
                assert_eq!(syn.text, syn.text.to_lowercase(), "synonym of {}", term.token);
            }
        }
    }

    #[test]
    fn test_procedure_categories_are_case_types() {
        let ont = Ontology::builtin();
        assert_eq!(ont.term("TONSILLECTOMY").unwrap().category, "ENT");
        assert_eq!(ont.term("CABG").unwrap().category, "CARDIAC");
        assert_eq!(ont.term("HERNIA_REPAIR").unwrap().category, "GENERAL");
    }

    #[test]
    fn test_time_windowed_flag() {
        let ont = Ontology::builtin();
        assert!(ont.term("RECENT_URI_2W").unwrap().time_windowed);
        assert!(!ont.term("ASTHMA").unwrap().time_windowed);
    }
}
