//! The governance coordinator: one invocation per request.
//!
//! Sequencing per request: evaluate policy; if rejected, record the
//! rejection and return without touching a provider. Otherwise call the
//! selected provider (outside the audit critical section, bounded by a
//! timeout), score the returned text, and commit the audit record before
//! reporting anything to the caller.
//!
//! The coordinator never bypasses the chain: every caller-visible outcome —
//! success, rejection, or provider failure — has a durable record appended
//! first. Audit appends retry with bounded exponential backoff; exhaustion
//! fails the request, because an unrecorded decision is worse than a
//! rejected one.

use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use warden_core::audit::{AuditChain, AuditError, AuditRecord, ResponseMeta, RoutingSnapshot};
use warden_core::policy::{ComplianceStatus, PolicyEngine, RoutingDecision};
use warden_core::risk::{RiskFlag, RiskScore, RiskScorer};
use warden_core::types::{ProviderId, RequestContext};
use warden_core::IntegrityReport;

use crate::config::GatewayConfig;
use crate::providers::{GenerationRequest, ProviderError, ProviderRegistry};

/// Errors surfaced to the caller of [`GovernanceCoordinator::handle`].
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No provider satisfies the narrowed constraint set. A declined
    /// request, not a system fault; already recorded in the chain.
    #[error("request rejected by compliance policy")]
    PolicyRejection { decision: RoutingDecision },

    /// The provider call failed or timed out; recorded in the chain with no
    /// response metadata.
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),

    /// The durable append did not succeed within the retry budget. The
    /// request must not be reported successful.
    #[error("audit write failed after {attempts} attempts: {source}")]
    AuditWrite {
        attempts: usize,
        #[source]
        source: AuditError,
    },
}

/// The caller-visible result of a governed generation request.
#[derive(Debug, Clone, Serialize)]
pub struct GovernedResponse {
    pub request_id: String,
    pub content: String,

    pub provider: ProviderId,
    pub model: String,

    pub tokens_input: u32,
    pub tokens_output: u32,
    pub latency_ms: f64,
    pub cost_usd: f64,

    pub compliance_status: ComplianceStatus,
    /// OR of the routing decision's bit and the risk scorer's review flag.
    pub requires_human_review: bool,
    pub applied_policies: Vec<String>,

    pub risk: RiskScore,

    /// Integrity hash of this request's audit record.
    pub audit_hash: String,
}

/// Per-provider compliance capability, as reported to auditors.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderComplianceStatus {
    pub id: ProviderId,
    pub baa_signed: bool,
    pub zero_retention: bool,
    /// Whether a live provider instance is registered for this identifier.
    pub registered: bool,
}

/// Read-only compliance surface built from the governance core.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub rules_loaded: usize,
    pub snapshot_version: u64,
    pub providers: Vec<ProviderComplianceStatus>,
    pub chain_integrity: IntegrityReport,
}

/// Orchestrates policy evaluation, provider delegation, risk scoring, and
/// the audit append for each request.
pub struct GovernanceCoordinator {
    policy: Arc<PolicyEngine>,
    scorer: RiskScorer,
    chain: Arc<AuditChain>,
    providers: ProviderRegistry,
    config: GatewayConfig,
}

impl GovernanceCoordinator {
    pub fn new(
        policy: Arc<PolicyEngine>,
        chain: Arc<AuditChain>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            policy,
            scorer: RiskScorer::new(),
            chain,
            providers,
            config: GatewayConfig::default(),
        }
    }

    pub fn builder() -> GovernanceCoordinatorBuilder {
        GovernanceCoordinatorBuilder::new()
    }

    /// Run the full governance lifecycle for one request.
    pub async fn handle(&self, context: RequestContext) -> Result<GovernedResponse, GatewayError> {
        let decision = self.policy.evaluate(&context);

        let (provider_id, model) = match (&decision.provider, &decision.model) {
            (Some(provider), Some(model)) if !decision.is_rejected() => {
                (provider.clone(), model.clone())
            }
            _ => {
                warn!(
                    request_id = %context.request_id,
                    applied = ?decision.applied_policies,
                    "request rejected by policy"
                );
                let routing = RoutingSnapshot::from_decision(&decision);
                self.append_with_retry(&context, routing, None, None).await?;
                return Err(GatewayError::PolicyRejection { decision });
            }
        };

        // Provider I/O happens here, before the audit critical section, so
        // chain contention never stalls on network latency.
        let outcome = match self.providers.get(&provider_id) {
            None => Err(ProviderError::NotConfigured(provider_id.to_string())),
            Some(provider) => {
                let request = GenerationRequest {
                    prompt: context.prompt.clone(),
                    system_prompt: context.system_prompt.clone(),
                    model: model.clone(),
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                };
                match tokio::time::timeout(
                    self.config.provider_timeout,
                    provider.generate(&request),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(self.config.provider_timeout)),
                }
            }
        };

        match outcome {
            Ok(response) => {
                let risk = self.scorer.score(&response.content, &context);
                let meta = ResponseMeta {
                    tokens_input: response.tokens_input,
                    tokens_output: response.tokens_output,
                    latency_ms: response.latency_ms,
                    cost_usd: response.cost_usd,
                };
                let routing = RoutingSnapshot::from_decision(&decision);
                let record = self
                    .append_with_retry(&context, routing, Some(meta), Some(risk.clone()))
                    .await?;

                info!(
                    request_id = %context.request_id,
                    provider = %provider_id,
                    model = %response.model,
                    overall_risk = risk.overall,
                    "request completed"
                );

                let requires_human_review = decision.require_human_review
                    || risk.has_flag(RiskFlag::RequiresHumanReview);

                Ok(GovernedResponse {
                    request_id: context.request_id,
                    content: response.content,
                    provider: provider_id,
                    model: response.model,
                    tokens_input: response.tokens_input,
                    tokens_output: response.tokens_output,
                    latency_ms: response.latency_ms,
                    cost_usd: response.cost_usd,
                    compliance_status: decision.compliance_status,
                    requires_human_review,
                    applied_policies: decision.applied_policies,
                    risk,
                    audit_hash: record.audit_hash,
                })
            }
            Err(failure) => {
                warn!(
                    request_id = %context.request_id,
                    provider = %provider_id,
                    error = %failure,
                    "provider call failed"
                );
                let routing =
                    RoutingSnapshot::from_decision(&decision).with_failure(failure.to_string());
                self.append_with_retry(&context, routing, None, None).await?;
                Err(GatewayError::Provider(failure))
            }
        }
    }

    /// Append one record, retrying with exponential backoff up to the
    /// configured attempt budget.
    async fn append_with_retry(
        &self,
        context: &RequestContext,
        routing: RoutingSnapshot,
        response: Option<ResponseMeta>,
        risk: Option<RiskScore>,
    ) -> Result<AuditRecord, GatewayError> {
        let attempts = self.config.audit_retry_attempts.max(1);
        let chain = Arc::clone(&self.chain);

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.audit_retry_base)
            .with_max_times(attempts - 1);

        (|| {
            let chain = Arc::clone(&chain);
            let routing = routing.clone();
            let response = response.clone();
            let risk = risk.clone();
            async move { chain.append(context, routing, response, risk) }
        })
        .retry(backoff)
        .notify(|err: &AuditError, delay| {
            warn!(
                request_id = %context.request_id,
                error = %err,
                delay = ?delay,
                "audit append failed; retrying"
            );
        })
        .await
        .map_err(|source| {
            error!(
                request_id = %context.request_id,
                error = %source,
                "audit append exhausted retry budget"
            );
            GatewayError::AuditWrite { attempts, source }
        })
    }

    /// Compliance surface: rule counts, provider capabilities, and chain
    /// integrity.
    pub fn compliance_report(&self) -> ComplianceReport {
        let providers = self
            .policy
            .catalog()
            .profiles()
            .iter()
            .map(|profile| ProviderComplianceStatus {
                id: profile.id.clone(),
                baa_signed: profile.baa_signed,
                zero_retention: profile.zero_retention,
                registered: self.providers.contains(&profile.id),
            })
            .collect();

        ComplianceReport {
            rules_loaded: self.policy.rule_count(),
            snapshot_version: self.policy.snapshot_version(),
            providers,
            chain_integrity: self.chain.verify_integrity(),
        }
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn chain(&self) -> &AuditChain {
        &self.chain
    }
}

/// Builder for [`GovernanceCoordinator`].
pub struct GovernanceCoordinatorBuilder {
    policy: Option<Arc<PolicyEngine>>,
    chain: Option<Arc<AuditChain>>,
    providers: ProviderRegistry,
    scorer: RiskScorer,
    config: GatewayConfig,
}

impl GovernanceCoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            policy: None,
            chain: None,
            providers: ProviderRegistry::new(),
            scorer: RiskScorer::new(),
            config: GatewayConfig::default(),
        }
    }

    pub fn policy(mut self, policy: Arc<PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn chain(mut self, chain: Arc<AuditChain>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn crate::providers::TextProvider>) -> Self {
        self.providers.register(provider);
        self
    }

    pub fn scorer(mut self, scorer: RiskScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> GovernanceCoordinator {
        GovernanceCoordinator {
            policy: self
                .policy
                .unwrap_or_else(|| Arc::new(PolicyEngine::with_defaults())),
            scorer: self.scorer,
            chain: self.chain.unwrap_or_else(|| Arc::new(AuditChain::in_memory())),
            providers: self.providers,
            config: self.config,
        }
    }
}

impl Default for GovernanceCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{GenerationResponse, TextProvider};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use warden_core::audit::{AuditStore, AuditStoreError};
    use warden_core::policy::{Condition, PolicyRule, ProviderCatalog, RuleAction};
    use warden_core::types::{DataClassification, Industry};

    struct MockProvider {
        id: ProviderId,
        calls: AtomicUsize,
        reply: Result<String, fn() -> ProviderError>,
        delay: Duration,
    }

    impl MockProvider {
        fn succeeding(id: &str, reply: &str) -> Self {
            Self {
                id: ProviderId::from(id),
                calls: AtomicUsize::new(0),
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
            }
        }

        fn failing(id: &str, err: fn() -> ProviderError) -> Self {
            Self {
                id: ProviderId::from(id),
                calls: AtomicUsize::new(0),
                reply: Err(err),
                delay: Duration::ZERO,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextProvider for MockProvider {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(content) => Ok(GenerationResponse {
                    content: content.clone(),
                    model: request.model.clone(),
                    tokens_input: 10,
                    tokens_output: 20,
                    latency_ms: 5.0,
                    cost_usd: 0.001,
                }),
                Err(err) => Err(err()),
            }
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn id(&self) -> &ProviderId {
            &self.id
        }
    }

    fn rejecting_engine() -> PolicyEngine {
        // Two equal-scope rules allowing disjoint providers: every context
        // with PHI classification folds to an empty set.
        let phi = || vec![Condition::ClassificationIn(vec![DataClassification::Phi])];
        let set = |ids: &[&str]| -> BTreeSet<ProviderId> {
            ids.iter().map(|id| ProviderId::from(*id)).collect()
        };
        PolicyEngine::with_rule_set(
            ProviderCatalog::default(),
            vec![ProviderId::from("anthropic")],
            vec![
                PolicyRule {
                    name: "phi_anthropic".to_string(),
                    description: String::new(),
                    priority: 100,
                    conditions: phi(),
                    action: RuleAction {
                        allowed_providers: Some(set(&["anthropic"])),
                        ..RuleAction::default()
                    },
                },
                PolicyRule {
                    name: "phi_openai".to_string(),
                    description: String::new(),
                    priority: 90,
                    conditions: phi(),
                    action: RuleAction {
                        allowed_providers: Some(set(&["openai"])),
                        ..RuleAction::default()
                    },
                },
            ],
        )
        .unwrap()
    }

    fn context() -> RequestContext {
        RequestContext::new("req-1", "user-1", "summarize the findings")
    }

    #[tokio::test]
    async fn test_success_appends_scored_record() {
        let provider = Arc::new(MockProvider::succeeding(
            "anthropic",
            "The findings are attached.",
        ));
        let coordinator = GovernanceCoordinator::builder()
            .provider(provider.clone())
            .build();

        let response = coordinator.handle(context()).await.unwrap();

        assert_eq!(response.provider, ProviderId::from("anthropic"));
        assert_eq!(response.compliance_status, ComplianceStatus::Approved);
        assert_eq!(provider.call_count(), 1);

        let records = coordinator.chain().records();
        assert_eq!(records.len(), 1);
        assert!(records[0].response.is_some());
        assert!(records[0].risk.is_some());
        assert_eq!(records[0].audit_hash, response.audit_hash);
        assert!(coordinator.chain().verify_integrity().valid);
    }

    #[tokio::test]
    async fn test_rejection_skips_provider_and_records_terminal_entry() {
        let provider = Arc::new(MockProvider::succeeding("anthropic", "unused"));
        let coordinator = GovernanceCoordinator::builder()
            .policy(Arc::new(rejecting_engine()))
            .provider(provider.clone())
            .build();

        let ctx = context().with_classification(DataClassification::Phi);
        let err = coordinator.handle(ctx).await.unwrap_err();

        assert!(matches!(err, GatewayError::PolicyRejection { .. }));
        // The provider is never consulted for a rejected request.
        assert_eq!(provider.call_count(), 0);

        let records = coordinator.chain().records();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].routing.compliance_status,
            ComplianceStatus::Rejected
        );
        assert!(records[0].response.is_none());
        assert!(records[0].risk.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_recorded_without_response_meta() {
        let provider = Arc::new(MockProvider::failing("anthropic", || {
            ProviderError::Api {
                status: 500,
                message: "upstream exploded".to_string(),
            }
        }));
        let coordinator = GovernanceCoordinator::builder()
            .provider(provider.clone())
            .build();

        let err = coordinator.handle(context()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Provider(_)));

        let records = coordinator.chain().records();
        assert_eq!(records.len(), 1);
        let failure = records[0].routing.failure.as_deref().unwrap();
        assert!(failure.contains("upstream exploded"));
        assert!(records[0].response.is_none());
        assert!(records[0].risk.is_none());
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_a_recorded_failure() {
        // Policy selects anthropic, but nothing is registered.
        let coordinator = GovernanceCoordinator::builder().build();

        let err = coordinator.handle(context()).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Provider(ProviderError::NotConfigured(_))
        ));
        assert_eq!(coordinator.chain().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_timeout_still_audited() {
        let provider = Arc::new(MockProvider {
            id: ProviderId::from("anthropic"),
            calls: AtomicUsize::new(0),
            reply: Ok("too late".to_string()),
            delay: Duration::from_millis(200),
        });
        let coordinator = GovernanceCoordinator::builder()
            .provider(provider)
            .config(GatewayConfig {
                provider_timeout: Duration::from_millis(20),
                ..GatewayConfig::default()
            })
            .build();

        let err = coordinator.handle(context()).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Provider(ProviderError::Timeout(_))
        ));

        let records = coordinator.chain().records();
        assert_eq!(records.len(), 1);
        assert!(records[0].routing.failure.as_deref().unwrap().contains("timed out"));
    }

    struct RejectingStore {
        calls: AtomicUsize,
    }

    impl AuditStore for RejectingStore {
        fn persist(
            &self,
            _record: &warden_core::audit::AuditRecord,
        ) -> Result<(), AuditStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AuditStoreError::Rejected("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_audit_write_exhaustion_fails_the_request() {
        let store = Arc::new(RejectingStore {
            calls: AtomicUsize::new(0),
        });

        struct StoreHandle(Arc<RejectingStore>);
        impl AuditStore for StoreHandle {
            fn persist(
                &self,
                record: &warden_core::audit::AuditRecord,
            ) -> Result<(), AuditStoreError> {
                self.0.persist(record)
            }
        }

        let provider = Arc::new(MockProvider::succeeding("anthropic", "fine"));
        let coordinator = GovernanceCoordinator::builder()
            .chain(Arc::new(AuditChain::new(Box::new(StoreHandle(
                store.clone(),
            )))))
            .provider(provider)
            .config(GatewayConfig {
                audit_retry_attempts: 3,
                audit_retry_base: Duration::from_millis(1),
                ..GatewayConfig::default()
            })
            .build();

        let err = coordinator.handle(context()).await.unwrap_err();
        assert!(matches!(err, GatewayError::AuditWrite { attempts: 3, .. }));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(coordinator.chain().len(), 0);
    }

    #[tokio::test]
    async fn test_review_bit_is_or_of_policy_and_risk() {
        let provider = Arc::new(MockProvider::succeeding("anthropic", "All stable."));
        let coordinator = GovernanceCoordinator::builder()
            .provider(provider)
            .build();

        // Healthcare industry forces review at the policy layer even when
        // the output itself scores low.
        let ctx = context().with_industry(Industry::Healthcare);
        let response = coordinator.handle(ctx).await.unwrap();

        assert!(response.requires_human_review);
        assert_eq!(response.compliance_status, ComplianceStatus::ReviewRequired);
        assert!(response.risk.overall < 0.5);
    }

    #[tokio::test]
    async fn test_compliance_report_reflects_registration_and_chain() {
        let provider = Arc::new(MockProvider::succeeding("anthropic", "ok"));
        let coordinator = GovernanceCoordinator::builder()
            .provider(provider)
            .build();

        coordinator.handle(context()).await.unwrap();
        let report = coordinator.compliance_report();

        assert!(report.rules_loaded >= 4);
        assert!(report.chain_integrity.valid);
        let anthropic = report
            .providers
            .iter()
            .find(|p| p.id == ProviderId::from("anthropic"))
            .unwrap();
        assert!(anthropic.baa_signed);
        assert!(anthropic.registered);
        let openai = report
            .providers
            .iter()
            .find(|p| p.id == ProviderId::from("openai"))
            .unwrap();
        assert!(!openai.registered);
    }
}
