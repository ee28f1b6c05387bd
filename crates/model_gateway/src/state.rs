//! Process-wide gateway state: rate window, response cache, quota counters
//! and circuit flag. Owned by [`crate::InferenceGateway`] behind one lock.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use fixit_core::{Error, Result};

use crate::config::GatewayLimits;

/// Rolling window of admitted call timestamps.
#[derive(Debug)]
pub struct RateWindow {
    calls: VecDeque<Instant>,
    ceiling: usize,
    window: Duration,
}

impl RateWindow {
    pub fn new(ceiling: usize, window: Duration) -> Self {
        Self {
            calls: VecDeque::with_capacity(ceiling),
            ceiling,
            window,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.calls.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Calls admitted within the trailing window.
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.calls.len()
    }

    /// Admissions left in the trailing window.
    pub fn remaining(&mut self, now: Instant) -> usize {
        self.ceiling.saturating_sub(self.in_window(now))
    }

    fn try_admit(&mut self, now: Instant) -> bool {
        if self.in_window(now) >= self.ceiling {
            return false;
        }
        self.calls.push_back(now);
        true
    }
}

/// One cached parsed response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: Instant,
}

/// TTL cache keyed by request hash. Expired entries are evicted on lookup.
#[derive(Debug)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&mut self, key: &str, now: Instant) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) if now.saturating_duration_since(entry.created_at) < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&mut self, key: String, value: Value, now: Instant) {
        self.entries.insert(key, CacheEntry { value, created_at: now });
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Latch that disables remote calls after quota exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
}

/// Everything the gateway mutates, guarded as one unit.
#[derive(Debug)]
pub struct GatewayState {
    pub window: RateWindow,
    pub cache: ResponseCache,
    pub circuit: CircuitState,
    /// Remote calls admitted since process start.
    pub session_calls: u64,
    /// Billed units consumed since the last daily reset.
    pub daily_units: u64,
}

impl GatewayState {
    pub fn new(limits: &GatewayLimits) -> Self {
        Self {
            window: RateWindow::new(limits.max_calls_per_minute, limits.window),
            cache: ResponseCache::new(limits.cache_ttl),
            circuit: CircuitState::Closed,
            session_calls: 0,
            daily_units: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.circuit == CircuitState::Open
    }

    /// Admit one remote call, charging `unit_cost`. A rejected call mutates
    /// nothing.
    pub fn admit(&mut self, now: Instant, unit_cost: u64) -> Result<()> {
        if !self.window.try_admit(now) {
            return Err(Error::RateLimited {
                limit: self.window.ceiling,
            });
        }
        self.session_calls += 1;
        self.daily_units = self.daily_units.saturating_add(unit_cost);
        Ok(())
    }

    /// Open the circuit. Returns whether this call changed the state.
    pub fn trip(&mut self) -> bool {
        let changed = self.circuit == CircuitState::Closed;
        self.circuit = CircuitState::Open;
        changed
    }

    /// Close the circuit. Returns whether it was open.
    pub fn reset(&mut self) -> bool {
        let was_open = self.is_open();
        self.circuit = CircuitState::Closed;
        was_open
    }
}
