//! Circuit breaker: one per upstream, lock-free, CAS-driven state machine.
//!
//! Grounded on the resilience-primitives circuit breaker this codebase already
//! ships: the same packed-atomic state word, the same `Clock` indirection for
//! deterministic tests. The API shape differs because the upstream registry
//! wants to ask "can I go?" and report the outcome itself rather than handing
//! the breaker a closure to run.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: usize,
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 3, recovery_timeout: Duration::from_secs(30) }
    }
}

/// Outcome of asking the breaker whether a call may proceed.
pub enum Admission {
    /// The call may proceed.
    Go,
    /// The call must not proceed; retry after this many milliseconds.
    Rejected { retry_after_ms: u64 },
}

struct Inner {
    state: AtomicU8,
    failure_count: AtomicUsize,
    opened_at_millis: AtomicU64,
}

/// A single breaker guarding one upstream. Cheap to clone (shares state via `Arc`).
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(STATE_CLOSED),
                failure_count: AtomicUsize::new(0),
                opened_at_millis: AtomicU64::new(0),
            }),
            config,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Override the clock (deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Ask whether a call may proceed right now. In `OPEN`, once the recovery
    /// timeout has elapsed this performs the `OPEN -> HALF_OPEN` transition itself
    /// and admits the caller; every concurrent caller racing this transition is
    /// admitted too (best-effort HALF_OPEN, not single-flight — see design notes).
    pub fn can_execute(&self) -> Admission {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_CLOSED => Admission::Go,
            STATE_HALF_OPEN => Admission::Go,
            STATE_OPEN => {
                let opened_at = self.inner.opened_at_millis.load(Ordering::Acquire);
                let now = self.now_millis();
                let elapsed = now.saturating_sub(opened_at);
                let recovery_ms = self.config.recovery_timeout.as_millis() as u64;
                if elapsed >= recovery_ms {
                    // Best-effort: whoever gets here first or last, all transition
                    // attempts are harmless; CAS failure just means someone else won.
                    if self
                        .inner
                        .state
                        .compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        tracing::info!("circuit breaker -> half_open");
                    }
                    Admission::Go
                } else {
                    Admission::Rejected { retry_after_ms: recovery_ms - elapsed }
                }
            }
            _ => unreachable!("invalid breaker state"),
        }
    }

    /// Record a successful adapter call.
    pub fn record_success(&self) {
        let current = self.inner.state.load(Ordering::Acquire);
        match current {
            STATE_HALF_OPEN => {
                if self
                    .inner
                    .state
                    .compare_exchange(STATE_HALF_OPEN, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.inner.failure_count.store(0, Ordering::Release);
                    self.inner.opened_at_millis.store(0, Ordering::Release);
                    tracing::info!("circuit breaker -> closed");
                }
            }
            STATE_CLOSED => {
                self.inner.failure_count.store(0, Ordering::Release);
            }
            _ => {}
        }
    }

    /// Record a failed adapter call.
    pub fn record_failure(&self) {
        let current = self.inner.state.load(Ordering::Acquire);
        let failures = self.inner.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        match current {
            STATE_HALF_OPEN => {
                if self
                    .inner
                    .state
                    .compare_exchange(STATE_HALF_OPEN, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.inner.opened_at_millis.store(self.now_millis(), Ordering::Release);
                    tracing::warn!(failures, "circuit breaker: half-open trial failed -> open");
                }
            }
            STATE_CLOSED => {
                if failures >= self.config.failure_threshold
                    && self
                        .inner
                        .state
                        .compare_exchange(STATE_CLOSED, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    self.inner.opened_at_millis.store(self.now_millis(), Ordering::Release);
                    tracing::error!(failures, threshold = self.config.failure_threshold, "circuit breaker -> open");
                }
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_CLOSED => CircuitState::Closed,
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => unreachable!("invalid breaker state"),
        }
    }

    pub fn consecutive_failures(&self) -> usize {
        self.inner.failure_count.load(Ordering::Acquire)
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}
