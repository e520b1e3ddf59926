//! Registry of named circuit breakers, one per upstream.
//!
//! Built once at startup from the loaded server config and never mutated
//! (inserts/removes) afterward; read-only sharing is via `Arc<Mutex<HashMap<..>>>`,
//! the same pattern the teammate circuit-breaker registry uses for its handle map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitState};

/// Read-only view of one breaker's state, for health/introspection endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: String,
    pub failures: usize,
}

#[derive(Default, Clone)]
pub struct BreakerRegistry {
    inner: Arc<Mutex<HashMap<String, CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breaker for `name` with the given config. Called once at
    /// startup per upstream descriptor.
    pub fn register(&self, name: impl Into<String>, config: BreakerConfig) {
        let breaker = CircuitBreaker::new(config);
        self.inner.lock().unwrap().insert(name.into(), breaker);
    }

    /// Look up the breaker for `name`, if one was registered.
    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.inner.lock().unwrap().get(name).cloned()
    }

    /// Snapshot every registered breaker's state, sorted by name for stable output.
    pub fn snapshot_all(&self) -> Vec<BreakerSnapshot> {
        let map = self.inner.lock().unwrap();
        let mut entries: Vec<BreakerSnapshot> = map
            .iter()
            .map(|(name, breaker)| BreakerSnapshot {
                name: name.clone(),
                state: state_label(breaker.state()),
                failures: breaker.consecutive_failures(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

fn state_label(state: CircuitState) -> String {
    state.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_name_returns_none() {
        let registry = BreakerRegistry::new();
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let registry = BreakerRegistry::new();
        registry.register("b", BreakerConfig::default());
        registry.register("a", BreakerConfig::default());
        let snap = registry.snapshot_all();
        assert_eq!(snap[0].name, "a");
        assert_eq!(snap[1].name, "b");
    }
}
