use std::time::Duration;

use fixit_core::config::GatewayConfig;

/// Admission and accounting limits enforced by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayLimits {
    /// Remote calls admitted per rolling window.
    pub max_calls_per_minute: usize,
    /// Rolling window length.
    pub window: Duration,
    /// Cache entry lifetime.
    pub cache_ttl: Duration,
    /// Billed units available per day.
    pub daily_quota_units: u64,
    /// Units charged per admitted call.
    pub unit_cost_per_call: u64,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for GatewayLimits {
    fn from(cfg: &GatewayConfig) -> Self {
        Self {
            max_calls_per_minute: cfg.max_calls_per_minute,
            window: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(cfg.cache_ttl_secs),
            daily_quota_units: cfg.daily_quota_units,
            unit_cost_per_call: cfg.unit_cost_per_call,
        }
    }
}

impl GatewayLimits {
    /// Set the per-minute ceiling.
    pub fn with_max_calls_per_minute(mut self, max: usize) -> Self {
        self.max_calls_per_minute = max;
        self
    }

    /// Set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}
