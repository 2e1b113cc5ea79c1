//! Runtime configuration for the governance coordinator.

use std::time::Duration;

/// Knobs for one coordinator instance.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upper bound on one provider call; an elapsed timeout is a provider
    /// failure and still produces a terminal audit record.
    pub provider_timeout: Duration,

    /// Token ceiling passed to providers.
    pub max_tokens: u32,

    /// Sampling temperature passed to providers.
    pub temperature: f32,

    /// Total audit-append attempts before the request hard-fails.
    pub audit_retry_attempts: usize,

    /// Initial backoff delay between audit-append attempts.
    pub audit_retry_base: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(30),
            max_tokens: 4096,
            temperature: 0.1,
            audit_retry_attempts: 3,
            audit_retry_base: Duration::from_millis(50),
        }
    }
}
