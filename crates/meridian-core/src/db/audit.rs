//! Append-only session audit log.
//!
//! Each analysis appends one row whose chain hash commits to every prior
//! row, so post-hoc edits to the audit trail are detectable.

use rusqlite::params;
use sha2::{Digest, Sha256};

use super::{Database, DbResult};
use crate::models::{AnalysisResult, AnalysisStatus};

/// Chain hash of an empty log.
const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One persisted audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub seq: i64,
    pub session_id: String,
    pub evidence_version: String,
    pub status: String,
    pub result_hash: String,
    pub prev_hash: String,
    pub chain_hash: String,
}

impl Database {
    /// Append an analysis to the audit chain and return the new chain head.
    pub fn append_analysis_audit(&self, result: &AnalysisResult) -> DbResult<String> {
        let payload = result.to_canonical_json()?;
        let result_hash = hash_hex(payload.as_bytes());
        let prev_hash = self.audit_head()?;
        let chain_hash = hash_hex(format!("{prev_hash}{result_hash}").as_bytes());

        let status = match result.status {
            AnalysisStatus::Ok => "OK",
            AnalysisStatus::PartialSuccess => "PARTIAL_SUCCESS",
        };

        self.conn().execute(
            "INSERT INTO analysis_audit
                (session_id, evidence_version, status, result_hash, prev_hash, chain_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                result.session_id,
                result.evidence_version,
                status,
                result_hash,
                prev_hash,
                chain_hash,
            ],
        )?;
        Ok(chain_hash)
    }

    /// Current chain head, or the genesis hash for an empty log.
    pub fn audit_head(&self) -> DbResult<String> {
        use rusqlite::OptionalExtension;
        let head: Option<String> = self
            .conn()
            .query_row(
                "SELECT chain_hash FROM analysis_audit ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(head.unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    /// Walk the chain and verify every link.
    pub fn verify_audit_chain(&self) -> DbResult<bool> {
        let records = self.list_audit_records()?;
        let mut prev = GENESIS_HASH.to_string();
        for record in records {
            if record.prev_hash != prev {
                return Ok(false);
            }
            let expected = hash_hex(format!("{}{}", record.prev_hash, record.result_hash).as_bytes());
            if record.chain_hash != expected {
                return Ok(false);
            }
            prev = record.chain_hash;
        }
        Ok(true)
    }

    pub fn list_audit_records(&self) -> DbResult<Vec<AuditRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT seq, session_id, evidence_version, status, result_hash, prev_hash, chain_hash
             FROM analysis_audit ORDER BY seq",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AuditRecord {
                seq: row.get(0)?,
                session_id: row.get(1)?,
                evidence_version: row.get(2)?,
                status: row.get(3)?,
                result_hash: row.get(4)?,
                prev_hash: row.get(5)?,
                chain_hash: row.get(6)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn hash_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
