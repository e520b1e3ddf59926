//! Observability hooks: a fixed-capacity request-log ring, plus read-only
//! views over the breaker registry and cache stats (§4.9).

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

use crate::breaker_registry::{BreakerRegistry, BreakerSnapshot};
use crate::cache::{CacheStats, TwoTierCache};

#[derive(Debug, Clone, Serialize)]
pub struct RequestLogEntry {
    pub timestamp_millis: u64,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub latency_ms: u64,
}

/// Oldest-out ring buffer of the last `capacity` requests (default 50, §3).
pub struct RequestLog {
    entries: Mutex<VecDeque<RequestLogEntry>>,
    capacity: usize,
}

impl RequestLog {
    pub fn new(capacity: usize) -> Self {
        Self { entries: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    pub fn record(&self, entry: RequestLogEntry) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<RequestLogEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new(50)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub breakers: Vec<BreakerSnapshot>,
}

/// Read-only aggregation over the breaker registry, the request log, and the
/// cache, for the `GET /health*` routes.
pub struct Observability {
    pub request_log: RequestLog,
}

impl Observability {
    pub fn new(capacity: usize) -> Self {
        Self { request_log: RequestLog::new(capacity) }
    }

    pub fn health_report(&self, breakers: &BreakerRegistry) -> HealthReport {
        let snapshot = breakers.snapshot_all();
        let status = if snapshot.iter().any(|b| b.state == "open") { "degraded" } else { "ok" };
        HealthReport { status, breakers: snapshot }
    }

    pub async fn cache_stats(&self, cache: &TwoTierCache) -> CacheStats {
        cache.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_on_overflow() {
        let log = RequestLog::new(2);
        log.record(RequestLogEntry { timestamp_millis: 1, method: "GET".into(), path: "/a".into(), status: 200, latency_ms: 1 });
        log.record(RequestLogEntry { timestamp_millis: 2, method: "GET".into(), path: "/b".into(), status: 200, latency_ms: 1 });
        log.record(RequestLogEntry { timestamp_millis: 3, method: "GET".into(), path: "/c".into(), status: 200, latency_ms: 1 });

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].path, "/b");
        assert_eq!(snapshot[1].path, "/c");
    }

    #[test]
    fn health_report_degraded_when_any_breaker_open() {
        use crate::breaker::BreakerConfig;
        let breakers = BreakerRegistry::new();
        breakers.register("up", BreakerConfig::default());
        let observability = Observability::new(50);
        let report = observability.health_report(&breakers);
        assert_eq!(report.status, "ok");
    }
}
