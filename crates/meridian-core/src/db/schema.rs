//! SQLite schema definition.

/// Complete evidence-store schema.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Ontology
-- ============================================================================

CREATE TABLE IF NOT EXISTS ontology (
    token TEXT PRIMARY KEY,
    term_type TEXT NOT NULL CHECK (term_type IN
        ('OUTCOME', 'RISK_FACTOR', 'MEDICATION', 'DEMOGRAPHIC', 'PROCEDURE')),
    plain_label TEXT NOT NULL,
    synonyms TEXT NOT NULL DEFAULT '[]',          -- JSON array of {text, strength}
    category TEXT NOT NULL,
    severity_weight REAL NOT NULL DEFAULT 1.0 CHECK (severity_weight >= 0),
    parent_token TEXT REFERENCES ontology(token),
    time_windowed INTEGER NOT NULL DEFAULT 0
);

-- Secondary index for O(1) extractor lookup
CREATE TABLE IF NOT EXISTS ontology_synonym (
    synonym TEXT PRIMARY KEY,
    token TEXT NOT NULL REFERENCES ontology(token),
    strength TEXT NOT NULL CHECK (strength IN ('CANONICAL', 'LISTED', 'WEAK'))
);

CREATE INDEX IF NOT EXISTS idx_ontology_type ON ontology(term_type);

-- ============================================================================
-- Papers and estimates (append-only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS papers (
    pmid TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    year INTEGER NOT NULL,
    design TEXT NOT NULL CHECK (design IN
        ('RCT', 'META_ANALYSIS', 'COHORT', 'CASE_CONTROL', 'CASE_SERIES', 'OTHER')),
    n_total INTEGER NOT NULL,
    population TEXT NOT NULL CHECK (population IN
        ('PEDIATRIC', 'ADULT', 'OBSTETRIC', 'MIXED')),
    time_horizon TEXT NOT NULL DEFAULT 'inhospital',
    evidence_grade TEXT NOT NULL CHECK (evidence_grade IN ('A', 'B', 'C', 'D')),
    quality_score REAL NOT NULL CHECK (quality_score >= 0 AND quality_score <= 1)
);

CREATE TABLE IF NOT EXISTS estimates (
    id TEXT PRIMARY KEY,
    pmid TEXT NOT NULL REFERENCES papers(pmid),
    outcome_token TEXT NOT NULL,
    modifier_token TEXT,                          -- NULL means baseline incidence
    measure TEXT NOT NULL CHECK (measure IN ('INCIDENCE', 'OR', 'RR', 'HR')),
    value REAL NOT NULL,
    ci_low REAL,
    ci_high REAL,
    adjusted INTEGER NOT NULL DEFAULT 0,
    population TEXT NOT NULL CHECK (population IN
        ('PEDIATRIC', 'ADULT', 'OBSTETRIC', 'MIXED')),
    context_label TEXT NOT NULL,
    quality_weight REAL NOT NULL CHECK (quality_weight > 0 AND quality_weight <= 1),
    extraction_confidence REAL NOT NULL CHECK
        (extraction_confidence > 0 AND extraction_confidence <= 1),
    approximate INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Baseline rows must be incidences in [0,1]; modifier rows must be ratios > 0
CREATE TRIGGER IF NOT EXISTS estimates_check_shape BEFORE INSERT ON estimates
BEGIN
    SELECT CASE
        WHEN new.modifier_token IS NULL AND new.measure != 'INCIDENCE' THEN
            RAISE(ABORT, 'Baseline estimates must use INCIDENCE')
        WHEN new.modifier_token IS NULL AND (new.value < 0 OR new.value > 1) THEN
            RAISE(ABORT, 'Baseline incidence must be in [0,1]')
        WHEN new.modifier_token IS NOT NULL AND new.measure = 'INCIDENCE' THEN
            RAISE(ABORT, 'Modifier estimates must use a ratio measure')
        WHEN new.modifier_token IS NOT NULL AND new.value <= 0 THEN
            RAISE(ABORT, 'Ratio estimates must be positive')
    END;
END;

CREATE INDEX IF NOT EXISTS idx_estimates_cell
    ON estimates(outcome_token, modifier_token, context_label);

-- ============================================================================
-- Pooled rows (immutable per evidence version)
-- ============================================================================

CREATE TABLE IF NOT EXISTS evidence_versions (
    label TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    estimate_count INTEGER NOT NULL DEFAULT 0,
    is_current INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS pooled_baselines (
    outcome_token TEXT NOT NULL,
    context_label TEXT NOT NULL,
    evidence_version TEXT NOT NULL REFERENCES evidence_versions(label),
    k INTEGER NOT NULL,
    p0 REAL NOT NULL,
    p0_ci_low REAL NOT NULL,
    p0_ci_high REAL NOT NULL,
    logit_variance REAL NOT NULL,
    i_squared REAL NOT NULL,
    tau_squared REAL NOT NULL,
    method TEXT NOT NULL,
    grade TEXT NOT NULL CHECK (grade IN ('A', 'B', 'C', 'D')),
    pmids TEXT NOT NULL DEFAULT '[]',             -- JSON array
    singleton INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (outcome_token, context_label, evidence_version)
);

CREATE INDEX IF NOT EXISTS idx_pooled_baselines_lookup
    ON pooled_baselines(outcome_token, context_label, evidence_version);

CREATE TABLE IF NOT EXISTS pooled_effects (
    outcome_token TEXT NOT NULL,
    modifier_token TEXT NOT NULL,
    context_label TEXT NOT NULL,
    evidence_version TEXT NOT NULL REFERENCES evidence_versions(label),
    k INTEGER NOT NULL,
    or_mean REAL NOT NULL,
    or_ci_low REAL NOT NULL,
    or_ci_high REAL NOT NULL,
    log_variance REAL NOT NULL,
    i_squared REAL NOT NULL,
    tau_squared REAL NOT NULL,
    method TEXT NOT NULL,
    grade TEXT NOT NULL CHECK (grade IN ('A', 'B', 'C', 'D')),
    pmids TEXT NOT NULL DEFAULT '[]',             -- JSON array
    singleton INTEGER NOT NULL DEFAULT 0,
    approximate INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (outcome_token, modifier_token, context_label, evidence_version)
);

CREATE INDEX IF NOT EXISTS idx_pooled_effects_lookup
    ON pooled_effects(outcome_token, context_label, evidence_version);

-- ============================================================================
-- Session audit (append-only hash chain)
-- ============================================================================

CREATE TABLE IF NOT EXISTS analysis_audit (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    evidence_version TEXT NOT NULL,
    status TEXT NOT NULL,
    result_hash TEXT NOT NULL,                    -- SHA-256 of canonical result JSON
    prev_hash TEXT NOT NULL,                      -- chain hash of the previous row
    chain_hash TEXT NOT NULL,                     -- SHA-256(prev_hash || result_hash)
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
