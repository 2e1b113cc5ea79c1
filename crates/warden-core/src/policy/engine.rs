//! Rule-set snapshots and the routing decision fold.
//!
//! The engine holds an immutable, versioned [`RuleSet`] behind an `ArcSwap`:
//! evaluation is a lock-free snapshot read, and loading rules publishes a
//! whole new snapshot atomically. In-flight evaluations keep the snapshot
//! they started with; a rule is never partially visible.
//!
//! Evaluation folds matching rules in priority order and only ever narrows:
//! provider and model sets intersect, the human-review bit only rises. An
//! empty provider set is a valid terminal outcome (the request is rejected),
//! not an error.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{ProviderId, RequestContext};

use super::catalog::ProviderCatalog;
use super::rules::{baseline_rules, PolicyError, PolicyRule, RuleSpec};

/// Compliance outcome of a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Approved,
    Rejected,
    ReviewRequired,
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => f.write_str("approved"),
            Self::Rejected => f.write_str("rejected"),
            Self::ReviewRequired => f.write_str("review_required"),
        }
    }
}

/// Result of evaluating one request context against a rule-set snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    /// Providers still allowed after folding all matching rules. Empty means
    /// the request was rejected.
    pub allowed_providers: BTreeSet<ProviderId>,

    /// Selected provider; `None` when rejected.
    pub provider: Option<ProviderId>,

    /// Selected model; `None` when rejected.
    pub model: Option<String>,

    pub require_human_review: bool,

    /// Names of the rules that changed the running constraint state, in
    /// application order.
    pub applied_policies: Vec<String>,

    pub compliance_status: ComplianceStatus,
}

impl RoutingDecision {
    pub fn is_rejected(&self) -> bool {
        self.compliance_status == ComplianceStatus::Rejected
    }

    fn rejected(applied_policies: Vec<String>, require_human_review: bool) -> Self {
        Self {
            allowed_providers: BTreeSet::new(),
            provider: None,
            model: None,
            require_human_review,
            applied_policies,
            compliance_status: ComplianceStatus::Rejected,
        }
    }
}

/// An immutable, versioned rule set, sorted by priority descending.
///
/// The sort is stable, so rules with equal priority keep registration order
/// and the first-registered rule wins ties.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<PolicyRule>,
    version: u64,
}

impl RuleSet {
    /// Sort and validate a rule list into a publishable snapshot.
    pub fn assemble(mut rules: Vec<PolicyRule>, version: u64) -> Result<Self, PolicyError> {
        let mut seen = BTreeSet::new();
        for rule in &rules {
            if !seen.insert(rule.name.clone()) {
                return Err(PolicyError::DuplicateRule(rule.name.clone()));
            }
        }
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self { rules, version })
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

/// The policy engine: a rule-set snapshot plus the provider catalog and the
/// selection preference order.
pub struct PolicyEngine {
    snapshot: ArcSwap<RuleSet>,
    catalog: ProviderCatalog,
    preference: Vec<ProviderId>,
}

impl PolicyEngine {
    /// Engine with the built-in baseline rules for the given catalog.
    pub fn new(catalog: ProviderCatalog, preference: Vec<ProviderId>) -> Self {
        let baseline = RuleSet::assemble(baseline_rules(&catalog), 1)
            .expect("baseline rule names are unique");
        Self {
            snapshot: ArcSwap::from_pointee(baseline),
            catalog,
            preference,
        }
    }

    /// Engine with the stock catalog, preferring Anthropic then OpenAI.
    pub fn with_defaults() -> Self {
        Self::new(
            ProviderCatalog::default(),
            vec![ProviderId::from("anthropic"), ProviderId::from("openai")],
        )
    }

    /// Engine over an explicit rule list, replacing the baseline entirely.
    pub fn with_rule_set(
        catalog: ProviderCatalog,
        preference: Vec<ProviderId>,
        rules: Vec<PolicyRule>,
    ) -> Result<Self, PolicyError> {
        let set = RuleSet::assemble(rules, 1)?;
        Ok(Self {
            snapshot: ArcSwap::from_pointee(set),
            catalog,
            preference,
        })
    }

    /// Compile and merge additional rules into a new snapshot and publish it
    /// atomically. Returns the new snapshot version.
    ///
    /// On any error the current snapshot stays published untouched.
    pub fn load_rules(&self, specs: &[RuleSpec]) -> Result<u64, PolicyError> {
        let compiled = specs
            .iter()
            .map(RuleSpec::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let current = self.snapshot.load();
        let mut rules = current.rules.clone();
        rules.extend(compiled);

        let next = RuleSet::assemble(rules, current.version() + 1)?;
        let version = next.version();
        info!(version, rules = next.len(), "published rule-set snapshot");
        self.snapshot.store(Arc::new(next));
        Ok(version)
    }

    /// Evaluate a request context into a routing decision.
    ///
    /// Pure with respect to the snapshot current at entry: the same context
    /// against the same snapshot always yields the same decision, and the
    /// call never fails for a well-formed context.
    pub fn evaluate(&self, context: &RequestContext) -> RoutingDecision {
        let snapshot = self.snapshot.load();

        // None = unrestricted. Restriction is monotonic: once explicit, a
        // set can only shrink.
        let mut allowed: Option<BTreeSet<ProviderId>> = None;
        let mut models: Option<BTreeSet<String>> = None;
        let mut require_review = false;
        let mut applied = Vec::new();

        for rule in snapshot.rules() {
            if !rule.matches(context) {
                continue;
            }

            let mut changed = false;

            if let Some(rule_providers) = &rule.action.allowed_providers {
                let narrowed = match &allowed {
                    None => rule_providers.clone(),
                    Some(current) => current.intersection(rule_providers).cloned().collect(),
                };
                if allowed.as_ref() != Some(&narrowed) {
                    changed = true;
                }
                allowed = Some(narrowed);
            }

            if let Some(rule_models) = &rule.action.allowed_models {
                let narrowed = match &models {
                    None => rule_models.clone(),
                    Some(current) => current.intersection(rule_models).cloned().collect(),
                };
                if models.as_ref() != Some(&narrowed) {
                    changed = true;
                }
                models = Some(narrowed);
            }

            if rule.action.require_human_review && !require_review {
                require_review = true;
                changed = true;
            }

            if changed {
                applied.push(rule.name.clone());
            }
        }

        let resolved = match allowed {
            None => self.catalog.ids(),
            Some(set) => set,
        };

        if resolved.is_empty() {
            debug!(
                request_id = %context.request_id,
                applied = ?applied,
                "no provider satisfies the narrowed constraints"
            );
            return RoutingDecision::rejected(applied, require_review);
        }

        match self.select(&resolved, models.as_ref()) {
            Some((provider, model)) => {
                let compliance_status = if require_review {
                    ComplianceStatus::ReviewRequired
                } else {
                    ComplianceStatus::Approved
                };
                RoutingDecision {
                    allowed_providers: resolved,
                    provider: Some(provider),
                    model: Some(model),
                    require_human_review: require_review,
                    applied_policies: applied,
                    compliance_status,
                }
            }
            // Model restriction excluded every allowed provider: fail closed.
            None => RoutingDecision::rejected(applied, require_review),
        }
    }

    /// Pick the first allowed provider, in preference order, whose catalog
    /// satisfies the model restriction; then the first satisfying model.
    fn select(
        &self,
        allowed: &BTreeSet<ProviderId>,
        models: Option<&BTreeSet<String>>,
    ) -> Option<(ProviderId, String)> {
        let preferred = self
            .preference
            .iter()
            .filter(|id| allowed.contains(*id))
            .chain(allowed.iter().filter(|id| !self.preference.contains(*id)));

        for id in preferred {
            let Some(profile) = self.catalog.profile(id) else {
                continue;
            };
            match models {
                None => return Some((id.clone(), profile.default_model.clone())),
                Some(restriction) => {
                    if let Some(model) =
                        profile.models.iter().find(|m| restriction.contains(*m))
                    {
                        return Some((id.clone(), model.clone()));
                    }
                }
            }
        }
        None
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn rule_count(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn snapshot_version(&self) -> u64 {
        self.snapshot.load().version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::rules::{Condition, RuleAction, RuleFile};
    use crate::types::{DataClassification, Industry};

    fn rule(
        name: &str,
        priority: i32,
        conditions: Vec<Condition>,
        action: RuleAction,
    ) -> PolicyRule {
        PolicyRule {
            name: name.to_string(),
            description: String::new(),
            priority,
            conditions,
            action,
        }
    }

    fn providers(ids: &[&str]) -> BTreeSet<ProviderId> {
        ids.iter().map(|id| ProviderId::from(*id)).collect()
    }

    fn phi_healthcare_context() -> RequestContext {
        RequestContext::new("req-1", "user-1", "summarize this chart")
            .with_industry(Industry::Healthcare)
            .with_classification(DataClassification::Phi)
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let engine = PolicyEngine::with_defaults();
        let ctx = phi_healthcare_context();

        let first = engine.evaluate(&ctx);
        let second = engine.evaluate(&ctx);

        assert_eq!(first.allowed_providers, second.allowed_providers);
        assert_eq!(first.provider, second.provider);
        assert_eq!(first.model, second.model);
        assert_eq!(first.applied_policies, second.applied_policies);
        assert_eq!(first.compliance_status, second.compliance_status);
    }

    #[test]
    fn test_baseline_phi_routes_to_baa_provider() {
        let engine = PolicyEngine::with_defaults();
        let decision = engine.evaluate(&phi_healthcare_context());

        assert_eq!(decision.allowed_providers, providers(&["anthropic"]));
        assert_eq!(decision.provider, Some(ProviderId::from("anthropic")));
        // Healthcare industry forces review.
        assert_eq!(decision.compliance_status, ComplianceStatus::ReviewRequired);
        assert!(decision
            .applied_policies
            .contains(&"phi_requires_baa_provider".to_string()));
    }

    #[test]
    fn test_unrestricted_context_approved() {
        let engine = PolicyEngine::with_defaults();
        let ctx = RequestContext::new("req-2", "user-1", "hello");
        let decision = engine.evaluate(&ctx);

        assert_eq!(decision.compliance_status, ComplianceStatus::Approved);
        assert_eq!(decision.allowed_providers, providers(&["anthropic", "openai"]));
        // The fallback rule restricts nothing, so nothing is applied.
        assert!(decision.applied_policies.is_empty());
    }

    #[test]
    fn test_phi_with_certified_provider_rule() {
        // A rule set containing only the certification rule and the fallback.
        let rules = vec![
            rule(
                "phi_certified_provider",
                100,
                vec![Condition::ClassificationIn(vec![DataClassification::Phi])],
                RuleAction {
                    allowed_providers: Some(providers(&["anthropic"])),
                    ..RuleAction::default()
                },
            ),
            rule("default_unrestricted", 0, vec![], RuleAction::default()),
        ];
        let engine = PolicyEngine::with_rule_set(
            ProviderCatalog::default(),
            vec![ProviderId::from("anthropic"), ProviderId::from("openai")],
            rules,
        )
        .unwrap();

        let decision = engine.evaluate(&phi_healthcare_context());
        assert_eq!(decision.allowed_providers, providers(&["anthropic"]));
        assert_eq!(decision.compliance_status, ComplianceStatus::Approved);
    }

    #[test]
    fn test_disjoint_narrowing_rejects() {
        // Two PHI rules allowing disjoint providers: the intersection is
        // empty and the request must be rejected, never silently rerouted.
        let phi_condition =
            || vec![Condition::ClassificationIn(vec![DataClassification::Phi])];
        let rules = vec![
            rule(
                "phi_anthropic_only",
                110,
                phi_condition(),
                RuleAction {
                    allowed_providers: Some(providers(&["anthropic"])),
                    ..RuleAction::default()
                },
            ),
            rule(
                "phi_openai_only",
                100,
                phi_condition(),
                RuleAction {
                    allowed_providers: Some(providers(&["openai"])),
                    ..RuleAction::default()
                },
            ),
        ];
        let engine = PolicyEngine::with_rule_set(
            ProviderCatalog::default(),
            vec![ProviderId::from("anthropic")],
            rules,
        )
        .unwrap();

        let ctx = RequestContext::new("req-3", "user-1", "x")
            .with_classification(DataClassification::Phi);
        let decision = engine.evaluate(&ctx);

        assert!(decision.allowed_providers.is_empty());
        assert_eq!(decision.compliance_status, ComplianceStatus::Rejected);
        assert!(decision.provider.is_none());
        assert!(decision.model.is_none());
    }

    #[test]
    fn test_restriction_is_monotonic() {
        // Evaluating against each prefix of the rule list must yield a
        // provider set that is a subset of the previous prefix's.
        let all_rules = vec![
            rule(
                "narrow_to_two",
                90,
                vec![],
                RuleAction {
                    allowed_providers: Some(providers(&["anthropic", "openai"])),
                    ..RuleAction::default()
                },
            ),
            rule(
                "narrow_to_one",
                80,
                vec![],
                RuleAction {
                    allowed_providers: Some(providers(&["anthropic"])),
                    ..RuleAction::default()
                },
            ),
            rule(
                "narrow_to_none",
                70,
                vec![],
                RuleAction {
                    allowed_providers: Some(providers(&["openai"])),
                    ..RuleAction::default()
                },
            ),
        ];

        let ctx = RequestContext::new("req-m", "u", "p");
        let mut previous: Option<BTreeSet<ProviderId>> = None;
        for k in 1..=all_rules.len() {
            let engine = PolicyEngine::with_rule_set(
                ProviderCatalog::default(),
                vec![ProviderId::from("anthropic")],
                all_rules[..k].to_vec(),
            )
            .unwrap();
            let decision = engine.evaluate(&ctx);
            if let Some(prev) = &previous {
                assert!(decision.allowed_providers.is_subset(prev));
            }
            previous = Some(decision.allowed_providers);
        }
        // The final fold emptied the set entirely.
        assert!(previous.unwrap().is_empty());
    }

    #[test]
    fn test_equal_priority_tie_break_is_registration_order() {
        // Both rules restrict models at equal priority; the first-registered
        // one is applied first, so its name leads applied_policies.
        let any = || vec![];
        let rules = vec![
            rule(
                "first_registered",
                50,
                any(),
                RuleAction {
                    allowed_models: Some(
                        ["claude-3-opus-20240229", "gpt-4o"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    ),
                    ..RuleAction::default()
                },
            ),
            rule(
                "second_registered",
                50,
                any(),
                RuleAction {
                    allowed_models: Some(
                        ["claude-3-opus-20240229"].iter().map(|s| s.to_string()).collect(),
                    ),
                    ..RuleAction::default()
                },
            ),
        ];
        let engine = PolicyEngine::with_rule_set(
            ProviderCatalog::default(),
            vec![ProviderId::from("anthropic")],
            rules,
        )
        .unwrap();

        let decision = engine.evaluate(&RequestContext::new("req-4", "u", "p"));
        assert_eq!(
            decision.applied_policies,
            vec!["first_registered".to_string(), "second_registered".to_string()]
        );
        assert_eq!(decision.model.as_deref(), Some("claude-3-opus-20240229"));
    }

    #[test]
    fn test_model_restriction_dead_end_fails_closed() {
        let rules = vec![rule(
            "nonexistent_model_only",
            50,
            vec![],
            RuleAction {
                allowed_models: Some(["model-that-nobody-serves".to_string()].into()),
                ..RuleAction::default()
            },
        )];
        let engine = PolicyEngine::with_rule_set(
            ProviderCatalog::default(),
            vec![ProviderId::from("anthropic")],
            rules,
        )
        .unwrap();

        let decision = engine.evaluate(&RequestContext::new("req-5", "u", "p"));
        assert_eq!(decision.compliance_status, ComplianceStatus::Rejected);
        assert!(decision.provider.is_none());
    }

    #[test]
    fn test_load_rules_publishes_new_snapshot() {
        let engine = PolicyEngine::with_defaults();
        let before = engine.snapshot_version();

        // Against the baseline snapshot, legal-industry requests carry no
        // restriction at all.
        let ctx = RequestContext::new("req-6", "u", "p").with_industry(Industry::Legal);
        let decision = engine.evaluate(&ctx);
        assert_eq!(decision.compliance_status, ComplianceStatus::Approved);

        let file = RuleFile::from_yaml(
            r#"
rules:
  - name: legal_review
    priority: 70
    conditions:
      industry: legal
    actions:
      require_human_review: true
"#,
        )
        .unwrap();
        let after = engine.load_rules(&file.rules).unwrap();

        assert_eq!(after, before + 1);
        let decision = engine.evaluate(&ctx);
        assert_eq!(decision.compliance_status, ComplianceStatus::ReviewRequired);
        assert_eq!(decision.applied_policies, vec!["legal_review".to_string()]);
    }

    #[test]
    fn test_duplicate_rule_name_rejected_and_snapshot_unchanged() {
        let engine = PolicyEngine::with_defaults();
        let before = engine.snapshot_version();

        let file = RuleFile::from_yaml(
            r#"
rules:
  - name: phi_requires_baa_provider
    priority: 10
"#,
        )
        .unwrap();

        assert!(matches!(
            engine.load_rules(&file.rules),
            Err(PolicyError::DuplicateRule(_))
        ));
        assert_eq!(engine.snapshot_version(), before);
    }

    #[test]
    fn test_preference_order_drives_selection() {
        let engine = PolicyEngine::new(
            ProviderCatalog::default(),
            vec![ProviderId::from("openai"), ProviderId::from("anthropic")],
        );
        let decision = engine.evaluate(&RequestContext::new("req-7", "u", "p"));
        assert_eq!(decision.provider, Some(ProviderId::from("openai")));
        assert_eq!(decision.model.as_deref(), Some("gpt-4o"));
    }
}
