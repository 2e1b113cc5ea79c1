//! Provider capability profiles.
//!
//! The catalog is the routing-eligibility ground truth: which providers have
//! a signed data-processing agreement, which models they serve, and what the
//! default model per provider is. Built-in policy rules and provider/model
//! selection both read from it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::ProviderId;

/// Compliance capabilities and model catalog for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub id: ProviderId,

    /// Models this provider serves, in preference order.
    pub models: Vec<String>,

    /// Model used when no rule restricts the choice.
    pub default_model: String,

    /// Signed business associate agreement covering protected data.
    pub baa_signed: bool,

    /// Provider offers zero data retention under the agreement.
    pub zero_retention: bool,
}

/// The set of providers the gateway knows how to route to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCatalog {
    profiles: Vec<ProviderProfile>,
}

impl ProviderCatalog {
    pub fn new(profiles: Vec<ProviderProfile>) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &[ProviderProfile] {
        &self.profiles
    }

    pub fn profile(&self, id: &ProviderId) -> Option<&ProviderProfile> {
        self.profiles.iter().find(|p| &p.id == id)
    }

    /// All provider identifiers, as a set.
    pub fn ids(&self) -> BTreeSet<ProviderId> {
        self.profiles.iter().map(|p| p.id.clone()).collect()
    }

    /// Providers eligible to handle protected data.
    pub fn baa_signed_ids(&self) -> BTreeSet<ProviderId> {
        self.profiles
            .iter()
            .filter(|p| p.baa_signed)
            .map(|p| p.id.clone())
            .collect()
    }
}

impl Default for ProviderCatalog {
    /// The stock catalog: Anthropic signs BAAs with zero retention, OpenAI
    /// does not.
    fn default() -> Self {
        Self::new(vec![
            ProviderProfile {
                id: ProviderId::from("anthropic"),
                models: vec![
                    "claude-3-opus-20240229".to_string(),
                    "claude-3-5-sonnet-20241022".to_string(),
                    "claude-3-haiku-20240307".to_string(),
                ],
                default_model: "claude-3-opus-20240229".to_string(),
                baa_signed: true,
                zero_retention: true,
            },
            ProviderProfile {
                id: ProviderId::from("openai"),
                models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
                default_model: "gpt-4o".to_string(),
                baa_signed: false,
                zero_retention: false,
            },
        ])
    }
}
