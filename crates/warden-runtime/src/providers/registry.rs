//! Provider registry: the coordinator's lookup from routing decisions to
//! live provider instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use warden_core::types::ProviderId;

use super::TextProvider;

/// Ordered map of registered providers, keyed by identifier.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, Arc<dyn TextProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own identifier. A provider registered
    /// under an existing identifier replaces it.
    pub fn register(&mut self, provider: Arc<dyn TextProvider>) {
        self.providers.insert(provider.id().clone(), provider);
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn TextProvider>> {
        self.providers.get(id).cloned()
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.providers.contains_key(id)
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{GenerationRequest, GenerationResponse, ProviderError};
    use async_trait::async_trait;

    struct StubProvider {
        id: ProviderId,
    }

    #[async_trait]
    impl TextProvider for StubProvider {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationResponse, ProviderError> {
            Err(ProviderError::NotConfigured("stub".to_string()))
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn id(&self) -> &ProviderId {
            &self.id
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            id: ProviderId::from("anthropic"),
        }));

        assert!(registry.contains(&ProviderId::from("anthropic")));
        assert!(!registry.contains(&ProviderId::from("openai")));
        assert_eq!(registry.ids(), vec![ProviderId::from("anthropic")]);
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            id: ProviderId::from("anthropic"),
        }));
        registry.register(Arc::new(StubProvider {
            id: ProviderId::from("anthropic"),
        }));
        assert_eq!(registry.len(), 1);
    }
}
