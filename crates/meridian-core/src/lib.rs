//! Meridian Core Library
//!
//! Evidence-based perioperative risk and medication-recommendation engine.
//!
//! # Architecture
//!
//! ```text
//! Ontology + Evidence Store ──► Pooling Engine ──► Pooled Baselines/Effects
//!                                                          │
//! HPI text ──► HPI Extractor ──► Factors + Demographics ──► Risk Calculator
//!                                                          │
//!                                            Medication Decider ──► Buckets
//! ```
//!
//! # Core principle
//!
//! Missing evidence is data, not an error: an outcome without a pooled
//! baseline is reported with `no_evidence = true` and the analysis keeps
//! going. Only invalid input and a missing pinned evidence version fail a
//! request.
//!
//! # Modules
//!
//! - [`db`]: SQLite evidence store with append-only estimates and audit chain
//! - [`models`]: Domain types (OntologyTerm, Estimate, RiskAssessment, ...)
//! - [`ontology`]: The closed clinical vocabulary and synonym index
//! - [`extract`]: Rule-based HPI extractor
//! - [`pooling`]: Random-effects meta-analysis engine
//! - [`risk`]: Per-outcome risk calculator
//! - [`meds`]: Medication decider (five-bucket recommendation set)

pub mod config;
pub mod db;
pub mod extract;
pub mod meds;
pub mod models;
pub mod ontology;
pub mod pooling;
pub mod risk;

// Re-export commonly used types
pub use config::RiskConfig;
pub use models::{
    AnalysisMode, AnalysisOptions, AnalysisResult, AnalysisStatus, ContextLabel, Degradation,
    Demographics, Estimate, EvidenceGrade, ExtractedFactor, MedBucket, MedicationPlan, Paper,
    RiskAssessment, RiskLevel,
};
pub use ontology::Ontology;
pub use pooling::{EvidenceSnapshot, EvidenceSource};
pub use risk::CancelToken;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

use db::Database;
use extract::HpiExtractor;
use meds::MedicationPlanner;
use pooling::Pooler;
use risk::RiskCalculator;

/// Top-level engine errors. Per the propagation policy, only
/// `InvalidInput` and `VersionNotFound` occur during `analyze`; the rest
/// belong to setup and pooling operations.
#[derive(Debug, thiserror::Error)]
pub enum MeridianError {
    #[error("Invalid input in `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Evidence version not found: {0}")]
    VersionNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Pooling error: {0}")]
    Pooling(#[from] pooling::PoolingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for MeridianError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        MeridianError::LockPoisoned(e.to_string())
    }
}

pub type MeridianResult<T> = Result<T, MeridianError>;

/// Published snapshot registry. The `current` pointer flip is the only
/// mutation; in-flight requests keep their own `Arc` and never observe it.
#[derive(Default)]
struct SnapshotRegistry {
    current: Option<Arc<EvidenceSnapshot>>,
    by_version: HashMap<String, Arc<EvidenceSnapshot>>,
}

/// The engine context: one immutable ontology, the evidence store, the
/// snapshot registry, and configuration. Construct once at process init
/// and share by reference; `analyze` is safe to call concurrently.
pub struct Engine {
    ontology: Arc<Ontology>,
    config: RiskConfig,
    db: Mutex<Database>,
    snapshots: RwLock<SnapshotRegistry>,
    live_source: Option<Box<dyn EvidenceSource>>,
}

impl Engine {
    /// Open the evidence store at `path` and seed the built-in ontology.
    pub fn open<P: AsRef<Path>>(path: P) -> MeridianResult<Self> {
        Self::with_database(Database::open(path)?)
    }

    /// In-memory engine (for testing).
    pub fn in_memory() -> MeridianResult<Self> {
        Self::with_database(Database::open_in_memory()?)
    }

    fn with_database(db: Database) -> MeridianResult<Self> {
        let ontology = Arc::new(Ontology::builtin());
        db.seed_ontology(&ontology)?;

        let engine = Self {
            ontology,
            config: RiskConfig::standard(),
            db: Mutex::new(db),
            snapshots: RwLock::new(SnapshotRegistry::default()),
            live_source: None,
        };
        engine.restore_current_version()?;
        Ok(engine)
    }

    /// Attach an evidence source for LITERATURE_LIVE requests.
    pub fn with_live_source(mut self, source: Box<dyn EvidenceSource>) -> Self {
        self.live_source = Some(source);
        self
    }

    pub fn with_config(mut self, config: RiskConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Reload the persisted `current` version into the registry, if any.
    fn restore_current_version(&self) -> MeridianResult<()> {
        let db = self.db.lock()?;
        if let Some(label) = db.current_version()? {
            let pooler = Pooler::new(&db, &self.config);
            let snapshot = Arc::new(pooler.load_version(&label)?);
            let mut registry = self.snapshots.write()?;
            registry.by_version.insert(label, snapshot.clone());
            registry.current = Some(snapshot);
        }
        Ok(())
    }

    /// Append source studies and their estimates to the evidence store.
    pub fn ingest(&self, papers: &[Paper], estimates: &[Estimate]) -> MeridianResult<()> {
        let db = self.db.lock()?;
        for paper in papers {
            db.upsert_paper(paper)?;
        }
        for estimate in estimates {
            db.insert_estimate(estimate)?;
        }
        Ok(())
    }

    /// Pool the estimate store into a new immutable evidence version and
    /// publish it as `current` (atomic pointer flip).
    pub fn pool_and_publish(&self, label: &str) -> MeridianResult<Arc<EvidenceSnapshot>> {
        let snapshot = {
            let db = self.db.lock()?;
            let pooler = Pooler::new(&db, &self.config);
            Arc::new(pooler.pool_version(label)?)
        };

        let mut registry = self.snapshots.write()?;
        registry
            .by_version
            .insert(label.to_string(), snapshot.clone());
        registry.current = Some(snapshot.clone());
        tracing::info!(version = label, "published evidence version");
        Ok(snapshot)
    }

    /// Next monotonic `vYYYY.MM[.N]` label for today.
    pub fn next_version_label(&self) -> MeridianResult<String> {
        let db = self.db.lock()?;
        let base = format!("v{}", chrono::Utc::now().format("%Y.%m"));
        let label = match db.latest_version()? {
            Some(latest) if latest == base => format!("{base}.1"),
            Some(latest) if latest.starts_with(&format!("{base}.")) => {
                let n: u32 = latest
                    .rsplit('.')
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                format!("{base}.{}", n + 1)
            }
            _ => base,
        };
        Ok(label)
    }

    /// Resolve the pinned snapshot for a request. `None` means `current`.
    fn snapshot(&self, version: Option<&str>) -> MeridianResult<Arc<EvidenceSnapshot>> {
        match version {
            None => {
                let registry = self.snapshots.read()?;
                registry
                    .current
                    .clone()
                    .ok_or_else(|| MeridianError::VersionNotFound("current".into()))
            }
            Some(label) => {
                {
                    let registry = self.snapshots.read()?;
                    if let Some(snapshot) = registry.by_version.get(label) {
                        return Ok(snapshot.clone());
                    }
                }
                // Lazily load a previously pooled version.
                let snapshot = {
                    let db = self.db.lock()?;
                    let pooler = Pooler::new(&db, &self.config);
                    match pooler.load_version(label) {
                        Ok(s) => Arc::new(s),
                        Err(_) => return Err(MeridianError::VersionNotFound(label.to_string())),
                    }
                };
                let mut registry = self.snapshots.write()?;
                registry
                    .by_version
                    .insert(label.to_string(), snapshot.clone());
                Ok(snapshot)
            }
        }
    }

    /// Analyze an HPI.
    pub fn analyze(&self, hpi_text: &str, options: &AnalysisOptions) -> MeridianResult<AnalysisResult> {
        self.analyze_with_cancel(hpi_text, options, &CancelToken::new())
    }

    /// Analyze with a caller-held cancel token, checked between outcomes.
    pub fn analyze_with_cancel(
        &self,
        hpi_text: &str,
        options: &AnalysisOptions,
        cancel: &CancelToken,
    ) -> MeridianResult<AnalysisResult> {
        if hpi_text.trim().is_empty() {
            return Err(MeridianError::InvalidInput {
                field: "hpi_text".into(),
                reason: "empty HPI".into(),
            });
        }
        let context_override = match options.context_override.as_deref() {
            Some(raw) => Some(ContextLabel::parse(raw).ok_or_else(|| {
                MeridianError::InvalidInput {
                    field: "context_override".into(),
                    reason: format!("not a canonical context tuple: {raw}"),
                }
            })?),
            None => None,
        };

        let snapshot = self.request_snapshot(options)?;
        let session_id = session_id(hpi_text, options, &snapshot.version);
        let deadline = Instant::now() + Duration::from_millis(self.config.request_budget_ms);

        // 1. Extraction.
        let extractor = HpiExtractor::new(&self.ontology, &self.config.extract);
        let extraction = extractor.extract(hpi_text);
        let mut degradations = Vec::new();
        if extraction.degraded {
            degradations.push(Degradation::ExtractionDegraded);
        }

        // 2. Risks.
        let context = context_override.unwrap_or_else(|| {
            risk::resolve_context(&extraction.demographics, &extraction.factors, &self.ontology)
        });
        let calculator = RiskCalculator::new(&snapshot, &self.ontology, &self.config);
        let risk_output = calculator.assess(&extraction.factors, &context, cancel, Some(deadline));
        degradations.extend(risk_output.degradations.iter().cloned());

        // 3. Medications.
        let medications = if options.include_medications && !risk_output.cancelled {
            let planner = MedicationPlanner::new(&self.ontology, &self.config);
            planner.plan(
                &extraction.factors,
                &extraction.demographics,
                &risk_output.assessments,
            )
        } else {
            MedicationPlan::default()
        };

        let any_missing = risk_output.assessments.iter().any(|r| r.no_evidence);
        let status = if risk_output.timed_out || risk_output.cancelled || any_missing {
            AnalysisStatus::PartialSuccess
        } else {
            AnalysisStatus::Ok
        };
        let risk_level = RiskLevel::classify(&risk_output.assessments);

        let result = AnalysisResult {
            session_id,
            evidence_version: snapshot.version.clone(),
            status,
            demographics: extraction.demographics,
            factors: extraction.factors,
            risks: risk_output.assessments,
            risk_level,
            medications,
            degradations,
        };

        // 4. Audit (append-only; never blocks the result).
        if let Err(e) = self.append_audit(&result) {
            tracing::warn!(error = %e, "audit append failed");
        }

        Ok(result)
    }

    fn append_audit(&self, result: &AnalysisResult) -> MeridianResult<()> {
        let db = self.db.lock()?;
        db.append_analysis_audit(result)?;
        Ok(())
    }

    /// Walk the session audit chain and verify every link.
    pub fn verify_audit_chain(&self) -> MeridianResult<bool> {
        let db = self.db.lock()?;
        Ok(db.verify_audit_chain()?)
    }

    /// Number of audited analysis sessions.
    pub fn audit_len(&self) -> MeridianResult<usize> {
        let db = self.db.lock()?;
        Ok(db.list_audit_records()?.len())
    }

    /// Snapshot for this request: the pinned version, or an ephemeral pool
    /// over the live source in LITERATURE_LIVE mode.
    fn request_snapshot(&self, options: &AnalysisOptions) -> MeridianResult<Arc<EvidenceSnapshot>> {
        if options.mode == AnalysisMode::LiteratureLive {
            if let Some(source) = self.live_source.as_deref() {
                match source.fetch() {
                    Ok((papers, estimates)) => {
                        let papers_map: HashMap<String, Paper> = papers
                            .into_iter()
                            .map(|p| (p.pmid.clone(), p))
                            .collect();
                        let snapshot = pooling::build_snapshot(
                            "live",
                            &estimates,
                            &papers_map,
                            &self.config.pooling,
                        );
                        return Ok(Arc::new(snapshot));
                    }
                    Err(e) => {
                        tracing::warn!(source = source.name(), error = %e,
                            "live evidence source failed; falling back to pinned version");
                    }
                }
            } else {
                tracing::warn!("LITERATURE_LIVE requested with no source configured");
            }
        }
        self.snapshot(options.evidence_version.as_deref())
    }
}

/// Deterministic session id: UUIDv5 over the request content, so identical
/// requests produce byte-identical results.
fn session_id(hpi_text: &str, options: &AnalysisOptions, version: &str) -> String {
    let name = format!(
        "{hpi_text}\u{1f}{version}\u{1f}{:?}\u{1f}{}\u{1f}{}",
        options.mode,
        options.context_override.as_deref().unwrap_or("-"),
        options.include_medications,
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
