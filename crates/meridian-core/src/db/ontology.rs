//! Ontology persistence: seeding and loading the term tables.

use rusqlite::params;

use super::{Database, DbError, DbResult};
use crate::models::{OntologyTerm, Synonym, SynonymStrength, TermType};
use crate::ontology::Ontology;

fn strength_str(strength: SynonymStrength) -> &'static str {
    match strength {
        SynonymStrength::Canonical => "CANONICAL",
        SynonymStrength::Listed => "LISTED",
        SynonymStrength::Weak => "WEAK",
    }
}

impl Database {
    /// Write the ontology into the `ontology` and `ontology_synonym` tables,
    /// replacing any previous seed.
    pub fn seed_ontology(&self, ontology: &Ontology) -> DbResult<()> {
        self.conn().execute("DELETE FROM ontology_synonym", [])?;
        self.conn().execute("DELETE FROM ontology", [])?;

        for term in ontology.all_terms() {
            let synonyms_json = serde_json::to_string(&term.synonyms)?;
            self.conn().execute(
                r#"
                INSERT INTO ontology (
                    token, term_type, plain_label, synonyms, category,
                    severity_weight, parent_token, time_windowed
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    term.token,
                    term.term_type.as_str(),
                    term.plain_label,
                    synonyms_json,
                    term.category,
                    term.severity_weight,
                    term.parent_token,
                    term.time_windowed,
                ],
            )?;
        }

        // The synonym table mirrors the in-memory index so other consumers
        // get the same collision resolution.
        for term in ontology.all_terms() {
            for syn in term.match_candidates() {
                let resolved = ontology.lookup_synonym(&syn.text);
                if let Some((winner, strength)) = resolved {
                    if winner.token == term.token {
                        self.conn().execute(
                            "INSERT OR IGNORE INTO ontology_synonym (synonym, token, strength)
                             VALUES (?1, ?2, ?3)",
                            params![syn.text, term.token, strength_str(strength)],
                        )?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Load the ontology back from the store.
    pub fn load_ontology(&self) -> DbResult<Ontology> {
        let mut stmt = self.conn().prepare(
            "SELECT token, term_type, plain_label, synonyms, category,
                    severity_weight, parent_token, time_windowed
             FROM ontology ORDER BY token",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, bool>(7)?,
            ))
        })?;

        let mut terms = Vec::new();
        for row in rows {
            let (token, term_type, plain_label, synonyms, category, severity_weight, parent_token, time_windowed) = row?;
            let term_type = TermType::parse(&term_type)
                .ok_or_else(|| DbError::Constraint(format!("unknown term type: {term_type}")))?;
            let synonyms: Vec<Synonym> = serde_json::from_str(&synonyms)?;
            terms.push(OntologyTerm {
                token,
                term_type,
                plain_label,
                synonyms,
                category,
                severity_weight,
                parent_token,
                time_windowed,
            });
        }

        Ok(Ontology::from_terms(terms))
    }

    /// Resolve a synonym through the persisted index table.
    pub fn synonym_token(&self, synonym: &str) -> DbResult<Option<String>> {
        use rusqlite::OptionalExtension;
        let token = self
            .conn()
            .query_row(
                "SELECT token FROM ontology_synonym WHERE synonym = ?",
                [synonym.to_lowercase()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(token)
    }
}
