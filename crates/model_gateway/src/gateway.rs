//! The inference gateway.

use std::sync::{Arc, Mutex, MutexGuard};

use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;

use fixit_core::config::GatewayConfig;
use fixit_core::{Error, InferenceProvider, InferenceRequest, QuotaNotice, ResponseShape, Result};

use crate::config::GatewayLimits;
use crate::policy::{RetryDecision, RetryPolicy};
use crate::recovery;
use crate::state::GatewayState;

/// Daily units left at which the budget is logged as low.
const LOW_BUDGET_UNITS: u64 = 5;

/// Result of a gateway call that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    /// Parsed provider output. Text-shaped calls yield `{"text": ...}`.
    Completed(Value),
    /// The circuit is open; no remote call was made or the call just
    /// exhausted the quota.
    QuotaExhausted(QuotaNotice),
}

impl InferenceOutcome {
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::QuotaExhausted(_))
    }

    /// Deserialize the completed value. `None` when quota is exhausted.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Option<T>> {
        match self {
            Self::Completed(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::malformed_output(format!("unexpected response shape: {}", e))),
            Self::QuotaExhausted(_) => Ok(None),
        }
    }
}

/// Snapshot for the administrative status query.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub circuit_breaker_active: bool,
    /// `active` or `disabled`.
    pub status: &'static str,
    pub total_calls_this_session: u64,
    pub calls_in_last_minute: usize,
    pub rate_limit_remaining: usize,
    pub daily_units_consumed: u64,
    pub daily_units_remaining: u64,
    pub daily_budget_percent: u64,
    pub cache_size: usize,
}

/// Single channel to the remote provider.
///
/// Order per call: circuit check, cache lookup, rate admission (charges
/// quota), invoke with retry, output recovery, cache store. Calls rejected
/// before invocation leave the counters untouched.
pub struct InferenceGateway {
    provider: Arc<dyn InferenceProvider>,
    limits: GatewayLimits,
    policy: RetryPolicy,
    state: Mutex<GatewayState>,
}

impl InferenceGateway {
    /// Create a gateway from configuration.
    pub fn new(provider: Arc<dyn InferenceProvider>, config: &GatewayConfig) -> Self {
        Self::with_limits(provider, GatewayLimits::from(config), RetryPolicy::from(config))
    }

    /// Create a gateway with explicit limits and retry policy.
    pub fn with_limits(provider: Arc<dyn InferenceProvider>, limits: GatewayLimits, policy: RetryPolicy) -> Self {
        let state = Mutex::new(GatewayState::new(&limits));
        Self {
            provider,
            limits,
            policy,
            state,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one request through the gateway.
    pub async fn call(&self, request: &InferenceRequest) -> Result<InferenceOutcome> {
        let key = request.cache_key();

        {
            let mut state = self.lock();
            let now = Instant::now();

            if state.is_open() {
                tracing::error!("Circuit breaker active, provider disabled due to quota exhaustion");
                counter!("inference_calls_total", "outcome" => "circuit_open").increment(1);
                return Ok(InferenceOutcome::QuotaExhausted(QuotaNotice::default()));
            }

            if let Some(value) = state.cache.get(&key, now) {
                tracing::info!(cache_key = %key, "Cache hit");
                counter!("inference_calls_total", "outcome" => "cache_hit").increment(1);
                return Ok(InferenceOutcome::Completed(value));
            }

            if let Err(e) = state.admit(now, self.limits.unit_cost_per_call) {
                let in_window = state.window.in_window(now);
                tracing::warn!(
                    calls = in_window,
                    limit = self.limits.max_calls_per_minute,
                    "Local rate limit exceeded"
                );
                counter!("inference_calls_total", "outcome" => "rate_limited").increment(1);
                return Err(e);
            }

            let remaining = self.limits.daily_quota_units.saturating_sub(state.daily_units);
            let in_window = state.window.in_window(now);
            tracing::info!(
                call = state.session_calls,
                in_window,
                units_consumed = state.daily_units,
                units_remaining = remaining,
                "Provider call admitted"
            );
            if remaining <= LOW_BUDGET_UNITS {
                tracing::warn!(units_remaining = remaining, "Low daily budget");
            }
        }

        counter!("inference_calls_total", "outcome" => "remote").increment(1);

        let Some(raw) = self.invoke(request).await? else {
            return Ok(InferenceOutcome::QuotaExhausted(QuotaNotice::default()));
        };

        let value = match request.shape() {
            ResponseShape::Json => recovery::parse_structured(&raw)?,
            ResponseShape::Text => json!({ "text": raw }),
        };

        self.lock().cache.insert(key, value.clone(), Instant::now());
        tracing::debug!("Response cached");
        Ok(InferenceOutcome::Completed(value))
    }

    /// Run one request and deserialize the result. `Ok(None)` on quota
    /// exhaustion. A cached reply that does not fit `T` is evicted.
    pub async fn call_as<T: DeserializeOwned>(&self, request: &InferenceRequest) -> Result<Option<T>> {
        match self.call(request).await?.decode() {
            Err(e) => {
                self.lock().cache.remove(&request.cache_key());
                tracing::warn!(error = %e, "Evicted cached response with unexpected shape");
                Err(e)
            }
            decoded => decoded,
        }
    }

    /// Invoke the provider under the retry policy. `Ok(None)` means the
    /// quota was exhausted and the circuit is now open.
    async fn invoke(&self, request: &InferenceRequest) -> Result<Option<String>> {
        let max_attempts = self.policy.max_retries + 1;
        let mut attempt = 0;

        loop {
            tracing::info!(
                provider = self.provider.name(),
                attempt = attempt + 1,
                max_attempts,
                "Sending request to provider"
            );

            let err = match self.provider.generate(request).await {
                Ok(raw) => return Ok(Some(raw)),
                Err(err) => err,
            };

            tracing::error!(error = %err, attempt = attempt + 1, "Provider error");

            match self.policy.decide(&err, attempt) {
                RetryDecision::Retry(delay) => {
                    tracing::info!(delay_ms = delay.as_millis() as u64, "Transient error, retrying");
                    counter!("inference_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::TripCircuit => {
                    let (tripped, session_calls) = {
                        let mut state = self.lock();
                        (state.trip(), state.session_calls)
                    };
                    if tripped {
                        tracing::error!(session_calls, "Quota exhausted, circuit breaker opened");
                    }
                    counter!("inference_calls_total", "outcome" => "quota_exhausted").increment(1);
                    return Ok(None);
                }
                RetryDecision::GiveUp => {
                    counter!("inference_calls_total", "outcome" => "failed").increment(1);
                    return Err(Error::provider_unavailable(err.to_string()));
                }
            }
        }
    }

    /// Current counters and circuit state.
    pub fn status(&self) -> QuotaStatus {
        let mut state = self.lock();
        let now = Instant::now();
        let in_window = state.window.in_window(now);
        let budget = self.limits.daily_quota_units;
        let percent = if budget > 0 { state.daily_units * 100 / budget } else { 0 };

        QuotaStatus {
            circuit_breaker_active: state.is_open(),
            status: if state.is_open() { "disabled" } else { "active" },
            total_calls_this_session: state.session_calls,
            calls_in_last_minute: in_window,
            rate_limit_remaining: state.window.remaining(now),
            daily_units_consumed: state.daily_units,
            daily_units_remaining: budget.saturating_sub(state.daily_units),
            daily_budget_percent: percent,
            cache_size: state.cache.len(),
        }
    }

    /// Close the circuit. Returns whether it was open.
    pub fn reset_circuit(&self) -> bool {
        let was_open = self.lock().reset();
        tracing::warn!(was_open, "Circuit breaker manually reset");
        was_open
    }

    /// Zero the daily unit counter.
    pub fn reset_daily_usage(&self) {
        self.lock().daily_units = 0;
        tracing::warn!("Daily usage counter reset");
    }
}
