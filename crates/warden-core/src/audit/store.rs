//! Durability seam for the audit chain.
//!
//! The chain decides what is written and in what order; an [`AuditStore`]
//! decides how bytes reach durable media. A store failure must leave the
//! chain head unadvanced, so `persist` runs inside the append critical
//! section and its error aborts the append.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::AuditRecord;

/// Errors from a durable store.
#[derive(Error, Debug)]
pub enum AuditStoreError {
    #[error("audit store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("audit store rejected write: {0}")]
    Rejected(String),
}

/// Sink for committed audit records. Called with the record fully hashed;
/// implementations must not reorder or drop accepted writes.
pub trait AuditStore: Send + Sync {
    fn persist(&self, record: &AuditRecord) -> Result<(), AuditStoreError>;
}

/// Always-accepting store for tests and embedded use; the chain itself keeps
/// the in-memory sequence.
#[derive(Debug, Default)]
pub struct MemoryStore;

impl AuditStore for MemoryStore {
    fn persist(&self, _record: &AuditRecord) -> Result<(), AuditStoreError> {
        Ok(())
    }
}

/// Append-only line-delimited JSON file, the export shape consumed by
/// offline verification.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back from the file, in order.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let contents = std::fs::read_to_string(path)?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AuditStoreError::from))
            .collect()
    }
}

impl AuditStore for JsonlStore {
    fn persist(&self, record: &AuditRecord) -> Result<(), AuditStoreError> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditChain;
    use crate::policy::{ComplianceStatus, RoutingDecision};
    use crate::types::RequestContext;

    fn approved_decision() -> RoutingDecision {
        RoutingDecision {
            allowed_providers: ["anthropic"].iter().map(|s| (*s).into()).collect(),
            provider: Some("anthropic".into()),
            model: Some("claude-3-opus-20240229".to_string()),
            require_human_review: false,
            applied_policies: vec![],
            compliance_status: ComplianceStatus::Approved,
        }
    }

    #[test]
    fn test_jsonl_round_trip_reverifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let chain = AuditChain::new(Box::new(JsonlStore::new(&path)));

        for i in 0..3 {
            let ctx = RequestContext::new(format!("req-{i}"), "user-1", "prompt");
            chain
                .append(
                    &ctx,
                    crate::audit::RoutingSnapshot::from_decision(&approved_decision()),
                    None,
                    None,
                )
                .unwrap();
        }

        let records = JsonlStore::read_all(&path).unwrap();
        assert_eq!(records.len(), 3);

        let report = crate::audit::verify_records(&records);
        assert!(report.valid);
        assert_eq!(report.first_broken, None);
    }
}
