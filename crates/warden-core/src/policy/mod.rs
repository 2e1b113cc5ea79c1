//! Policy evaluation: versioned rule sets folded into routing decisions.
//!
//! Rules are loaded as loose [`RuleSpec`] structures, compiled into typed
//! [`PolicyRule`] values, and published as immutable [`RuleSet`] snapshots.
//! [`PolicyEngine::evaluate`] is pure with respect to a snapshot and never
//! fails for a well-formed context.

mod catalog;
mod engine;
mod rules;

pub use catalog::{ProviderCatalog, ProviderProfile};
pub use engine::{ComplianceStatus, PolicyEngine, RoutingDecision, RuleSet};
pub use rules::{
    baseline_rules, ActionSpec, Condition, ConditionValue, PolicyError, PolicyRule,
    ProviderListSpec, RuleAction, RuleFile, RuleSpec,
};
