//! Provider error classification and retry policy.

use std::time::Duration;

use fixit_core::config::GatewayConfig;
use fixit_core::ProviderError;

const QUOTA_INDICATORS: &[&str] = &["429", "resource_exhausted", "quota"];
const TRANSIENT_INDICATORS: &[&str] = &["timeout", "500", "502", "503", "504"];

/// How a provider failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Provider quota is spent. Never retried; trips the circuit.
    QuotaExhausted,
    /// Timeouts and server-side failures. Retried within budget.
    Transient,
    /// Everything else.
    Terminal,
}

impl ErrorClass {
    /// Classify by status, timeout flag and the provider's own text.
    /// Quota signals win over transient ones.
    pub fn of(err: &ProviderError) -> Self {
        let text = err.message.to_lowercase();

        if err.status == Some(429) || QUOTA_INDICATORS.iter().any(|i| text.contains(i)) {
            return Self::QuotaExhausted;
        }

        let server_side = err.status.is_some_and(|s| (500..600).contains(&s));
        if err.timed_out || server_side || TRANSIENT_INDICATORS.iter().any(|i| text.contains(i)) {
            return Self::Transient;
        }

        Self::Terminal
    }
}

/// What the gateway should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the delay, then try again.
    Retry(Duration),
    /// Open the circuit and return the quota-exhausted marker.
    TripCircuit,
    /// Surface the error.
    GiveUp,
}

/// Bounded fixed-backoff retry for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for RetryPolicy {
    fn from(cfg: &GatewayConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Decide after the failure of zero-based attempt `attempt`.
    pub fn decide(&self, err: &ProviderError, attempt: u32) -> RetryDecision {
        match ErrorClass::of(err) {
            ErrorClass::QuotaExhausted => RetryDecision::TripCircuit,
            ErrorClass::Transient if attempt < self.max_retries => RetryDecision::Retry(self.backoff),
            ErrorClass::Transient | ErrorClass::Terminal => RetryDecision::GiveUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_quota() {
        assert_eq!(ErrorClass::of(&ProviderError::http(429, "Too Many Requests")), ErrorClass::QuotaExhausted);
        assert_eq!(
            ErrorClass::of(&ProviderError::new("RESOURCE_EXHAUSTED: daily limit")),
            ErrorClass::QuotaExhausted
        );
        // A quota message on a 5xx is still quota.
        assert_eq!(
            ErrorClass::of(&ProviderError::http(503, "Quota exceeded for project")),
            ErrorClass::QuotaExhausted
        );
    }

    #[test]
    fn test_classify_transient() {
        assert_eq!(ErrorClass::of(&ProviderError::http(503, "Service Unavailable")), ErrorClass::Transient);
        assert_eq!(ErrorClass::of(&ProviderError::timeout("deadline exceeded")), ErrorClass::Transient);
        assert_eq!(ErrorClass::of(&ProviderError::new("upstream returned 502")), ErrorClass::Transient);
        assert_eq!(ErrorClass::of(&ProviderError::new("Read timeout")), ErrorClass::Transient);
    }

    #[test]
    fn test_classify_terminal() {
        assert_eq!(ErrorClass::of(&ProviderError::http(400, "Invalid argument")), ErrorClass::Terminal);
        assert_eq!(ErrorClass::of(&ProviderError::http(401, "API key not valid")), ErrorClass::Terminal);
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy {
            max_retries: 1,
            backoff: Duration::from_secs(2),
        };
        let busy = ProviderError::http(503, "busy");

        assert_eq!(policy.decide(&busy, 0), RetryDecision::Retry(Duration::from_secs(2)));
        assert_eq!(policy.decide(&busy, 1), RetryDecision::GiveUp);
        assert_eq!(policy.decide(&ProviderError::http(429, "quota"), 0), RetryDecision::TripCircuit);
        assert_eq!(policy.decide(&ProviderError::http(400, "bad"), 0), RetryDecision::GiveUp);
    }
}
