//! # warden-core
//!
//! Deterministic governance core for the Warden gateway: policy routing,
//! output risk scoring, and a tamper-evident audit chain.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the same request context against the same rule-set
//!    snapshot always yields the same routing decision, and the same output
//!    text always yields the same risk score.
//! 2. **Fail-closed**: when no provider satisfies the narrowed constraints,
//!    the request is rejected rather than routed to a non-compliant default.
//! 3. **Monotonic restriction**: rules can only narrow provider and model
//!    sets and raise the human-review requirement, never relax them.
//! 4. **Tamper-evident**: every audit record's hash incorporates the
//!    previous record's hash; any retroactive edit is detectable with the
//!    index of the first broken record.
//!
//! This crate performs no network or async work. Provider calls and request
//! orchestration live in `warden-runtime`.
//!
//! ## Example
//!
//! ```rust
//! use warden_core::policy::PolicyEngine;
//! use warden_core::risk::RiskScorer;
//! use warden_core::types::{DataClassification, Industry, RequestContext};
//!
//! let engine = PolicyEngine::with_defaults();
//! let context = RequestContext::new("req-1", "clinician-7", "Summarize the chart")
//!     .with_industry(Industry::Healthcare)
//!     .with_classification(DataClassification::Phi);
//!
//! let decision = engine.evaluate(&context);
//! assert!(!decision.is_rejected());
//!
//! let score = RiskScorer::new().score("The chart shows stable vitals.", &context);
//! assert!(score.overall <= 1.0);
//! ```

pub mod audit;
pub mod policy;
pub mod risk;
pub mod types;

// Re-export main types at crate root
pub use audit::{
    hash_identifier, verify_records, AuditChain, AuditError, AuditRecord, AuditStore,
    AuditStoreError, IntegrityReport, JsonlStore, MemoryStore, ResponseMeta, RoutingSnapshot,
    GENESIS_HASH,
};
pub use policy::{
    baseline_rules, ComplianceStatus, Condition, PolicyEngine, PolicyError, PolicyRule,
    ProviderCatalog, ProviderProfile, RoutingDecision, RuleFile, RuleSet, RuleSpec,
};
pub use risk::{RiskFlag, RiskScore, RiskScorer, RiskWeights};
pub use types::{DataClassification, Industry, ProviderId, RequestContext};
