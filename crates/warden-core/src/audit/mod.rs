//! Tamper-evident audit chain.
//!
//! Every completed request produces exactly one immutable [`AuditRecord`].
//! Each record's `audit_hash` is a SHA-256 over the canonical JSON bytes of
//! all its fields except the two hash fields, concatenated with the previous
//! record's hash (or the genesis sentinel), so any retroactive edit breaks
//! the chain from that record onward.
//!
//! Appends are serialized through a single mutex-guarded critical section;
//! provider I/O must happen before entering it, never while holding it. The
//! durable store is consulted inside the critical section, and a rejected
//! write leaves the head unadvanced.

mod store;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::policy::{ComplianceStatus, RoutingDecision};
use crate::risk::RiskScore;
use crate::types::{ProviderId, RequestContext};

pub use store::{AuditStore, AuditStoreError, JsonlStore, MemoryStore};

/// Previous-hash sentinel for the first record in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Errors from appending to the chain.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit append failed; chain head not advanced: {0}")]
    Store(#[from] AuditStoreError),
}

/// One-way hex SHA-256 of an identifier or prompt. Raw values never reach
/// storage.
pub fn hash_identifier(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Snapshot of the routing decision as it is persisted in a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSnapshot {
    pub provider: Option<ProviderId>,
    pub model: Option<String>,
    pub compliance_status: ComplianceStatus,
    pub applied_policies: Vec<String>,
    pub require_human_review: bool,

    /// Provider failure rendered verbatim, when the request terminated in
    /// one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RoutingSnapshot {
    pub fn from_decision(decision: &RoutingDecision) -> Self {
        Self {
            provider: decision.provider.clone(),
            model: decision.model.clone(),
            compliance_status: decision.compliance_status,
            applied_policies: decision.applied_policies.clone(),
            require_human_review: decision.require_human_review,
            failure: None,
        }
    }

    pub fn with_failure(mut self, failure: impl Into<String>) -> Self {
        self.failure = Some(failure.into());
        self
    }
}

/// Token counts and cost of one provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub latency_ms: f64,
    pub cost_usd: f64,
}

/// One immutable, hash-chained audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub user_hash: String,
    pub prompt_hash: String,
    pub routing: RoutingSnapshot,

    /// Absent for rejections and provider failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseMeta>,

    /// Absent when no output existed to score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskScore>,

    pub audit_hash: String,
    pub previous_hash: String,
}

/// The hashed portion of a record: every field except the hashes themselves,
/// serialized in declared order.
#[derive(Serialize)]
struct RecordBody<'a> {
    timestamp: &'a DateTime<Utc>,
    request_id: &'a str,
    user_hash: &'a str,
    prompt_hash: &'a str,
    routing: &'a RoutingSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a ResponseMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    risk: Option<&'a RiskScore>,
}

fn chain_hash(body: &RecordBody<'_>, previous_hash: &str) -> Result<String, AuditStoreError> {
    let bytes = serde_json::to_vec(body)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hasher.update(previous_hash.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

impl AuditRecord {
    /// Recompute the hash this record should carry, from its stored fields
    /// and stored previous hash.
    pub fn expected_hash(&self) -> Result<String, AuditStoreError> {
        let body = RecordBody {
            timestamp: &self.timestamp,
            request_id: &self.request_id,
            user_hash: &self.user_hash,
            prompt_hash: &self.prompt_hash,
            routing: &self.routing,
            response: self.response.as_ref(),
            risk: self.risk.as_ref(),
        };
        chain_hash(&body, &self.previous_hash)
    }
}

/// Result of an integrity walk over a record sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,

    /// Index of the first record whose linkage or hash does not verify.
    pub first_broken: Option<usize>,

    pub records_checked: usize,
}

/// Walk a record sequence from genesis, re-deriving each hash and checking
/// linkage to the preceding record. Reports the first mismatch.
pub fn verify_records(records: &[AuditRecord]) -> IntegrityReport {
    let mut expected_previous = GENESIS_HASH.to_string();

    for (index, record) in records.iter().enumerate() {
        let broken = record.previous_hash != expected_previous
            || match record.expected_hash() {
                Ok(hash) => hash != record.audit_hash,
                Err(_) => true,
            };
        if broken {
            return IntegrityReport {
                valid: false,
                first_broken: Some(index),
                records_checked: records.len(),
            };
        }
        expected_previous = record.audit_hash.clone();
    }

    IntegrityReport {
        valid: true,
        first_broken: None,
        records_checked: records.len(),
    }
}

struct ChainState {
    records: Vec<AuditRecord>,
    head: String,
}

/// The append-only audit chain: sole writer of audit records and the system
/// of record for decision history.
pub struct AuditChain {
    store: Box<dyn AuditStore>,
    state: Mutex<ChainState>,
}

impl AuditChain {
    pub fn new(store: Box<dyn AuditStore>) -> Self {
        Self {
            store,
            state: Mutex::new(ChainState {
                records: Vec::new(),
                head: GENESIS_HASH.to_string(),
            }),
        }
    }

    /// Chain with no durable sink beyond its own in-memory sequence.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore))
    }

    /// Construct, hash, persist, and link one record. The only mutation path
    /// of the chain.
    ///
    /// If the store rejects the write the head does not advance and the
    /// record is discarded; the caller must not report request success.
    pub fn append(
        &self,
        context: &RequestContext,
        routing: RoutingSnapshot,
        response: Option<ResponseMeta>,
        risk: Option<RiskScore>,
    ) -> Result<AuditRecord, AuditError> {
        let timestamp = Utc::now();
        let user_hash = hash_identifier(&context.user_id);
        let prompt_hash = hash_identifier(&context.prompt);

        let mut state = self.state.lock();

        let body = RecordBody {
            timestamp: &timestamp,
            request_id: &context.request_id,
            user_hash: &user_hash,
            prompt_hash: &prompt_hash,
            routing: &routing,
            response: response.as_ref(),
            risk: risk.as_ref(),
        };
        let audit_hash = chain_hash(&body, &state.head)?;

        let record = AuditRecord {
            timestamp,
            request_id: context.request_id.clone(),
            user_hash,
            prompt_hash,
            routing,
            response,
            risk,
            audit_hash: audit_hash.clone(),
            previous_hash: state.head.clone(),
        };

        self.store.persist(&record)?;

        state.head = audit_hash;
        state.records.push(record.clone());
        Ok(record)
    }

    /// Re-derive every hash from genesis and report the first mismatch.
    pub fn verify_integrity(&self) -> IntegrityReport {
        verify_records(&self.state.lock().records)
    }

    /// Snapshot of the current record sequence.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.state.lock().records.clone()
    }

    pub fn head_hash(&self) -> String {
        self.state.lock().head.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
