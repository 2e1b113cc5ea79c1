//! # warden-runtime
//!
//! Async runtime for the Warden gateway: the governance coordinator and the
//! provider layer.
//!
//! `warden-core` decides (policy, risk, audit); this crate sequences those
//! decisions around real provider calls. Policy evaluation and risk scoring
//! run fully in parallel across requests without coordination; the audit
//! chain is the single serialization point, and provider I/O always happens
//! before its critical section.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_core::types::{DataClassification, Industry, RequestContext};
//! use warden_runtime::providers::AnthropicProvider;
//! use warden_runtime::GovernanceCoordinator;
//!
//! let coordinator = GovernanceCoordinator::builder()
//!     .provider(Arc::new(AnthropicProvider::from_env()?))
//!     .build();
//!
//! let context = RequestContext::new("req-1", "clinician-7", "Summarize the chart")
//!     .with_industry(Industry::Healthcare)
//!     .with_classification(DataClassification::Phi);
//!
//! let response = coordinator.handle(context).await?;
//! println!("{} ({})", response.content, response.compliance_status);
//! ```

mod config;
mod coordinator;
pub mod providers;

pub use config::GatewayConfig;
pub use coordinator::{
    ComplianceReport, GatewayError, GovernanceCoordinator, GovernanceCoordinatorBuilder,
    GovernedResponse, ProviderComplianceStatus,
};
pub use providers::{
    GenerationRequest, GenerationResponse, ProviderError, ProviderRegistry, TextProvider,
};
