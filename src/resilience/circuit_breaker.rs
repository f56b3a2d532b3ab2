//! Circuit breaker for resource protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: resource assumed down, calls fail fast
//! - Half-Open: a bounded number of probe calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: recovery timeout elapsed (checked on admission)
//! Half-Open → Closed: success_threshold probe successes
//! Half-Open → Open: any probe failure (cooldown restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per protected resource, never shared between resources
//! - All decisions happen under a single mutex that is never held across an await
//! - Decisions are returned as values; the breaker itself never errors
//! - Probe slots are RAII permits so a cancelled probe frees its slot
//! - Outcomes carry the generation they were admitted under; an outcome from
//!   an earlier state is dropped

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Whether `self → next` is one of the four legal transitions.
    pub fn can_transition_to(self, next: CircuitState) -> bool {
        use CircuitState::*;
        matches!(
            (self, next),
            (Closed, Open) | (Open, HalfOpen) | (HalfOpen, Closed) | (HalfOpen, Open)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Numeric encoding used for the state gauge (0=closed, 1=open, 2=half-open).
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive failures in Closed before the breaker opens.
    pub failure_threshold: u32,
    /// Time the breaker stays Open before admitting a probe.
    pub recovery_timeout: Duration,
    /// Maximum concurrent probes while Half-Open.
    pub half_open_max_calls: u32,
    /// Probe successes required to close again.
    pub success_threshold: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_millis(60_000),
            half_open_max_calls: 3,
            success_threshold: 1,
        }
    }
}

/// Why a call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Breaker is Open and still cooling down.
    Open { retry_after: Duration },
    /// Breaker is Half-Open and every probe slot is taken.
    ProbesExhausted,
}

impl RejectReason {
    pub fn retry_after(&self) -> Duration {
        match self {
            RejectReason::Open { retry_after } => *retry_after,
            RejectReason::ProbesExhausted => Duration::ZERO,
        }
    }
}

/// The breaker state and generation a call was admitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    state: CircuitState,
    generation: u64,
}

impl Ticket {
    pub fn state(&self) -> CircuitState {
        self.state
    }
}

/// Outcome of [`CircuitBreaker::allow`].
#[derive(Debug)]
pub enum Admission<'a> {
    Proceed(Ticket),
    Probe(ProbePermit<'a>),
    Reject(RejectReason),
}

impl Admission<'_> {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Admission::Proceed(_))
    }

    pub fn is_probe(&self) -> bool {
        matches!(self, Admission::Probe(_))
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Admission::Reject(_))
    }
}

/// Point-in-time copy of the breaker counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub half_open_in_flight: u32,
    pub half_open_successes: u32,
    /// Number of times the breaker has opened.
    pub trips: u64,
}

#[derive(Debug)]
struct Core {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_in_flight: u32,
    half_open_successes: u32,
    // Bumped on every transition; tickets from another generation are stale.
    generation: u64,
    trips: u64,
}

impl Core {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            half_open_in_flight: 0,
            half_open_successes: 0,
            generation: 0,
            trips: 0,
        }
    }

    fn since_last_failure(&self, now: Instant) -> Option<Duration> {
        self.last_failure.map(|at| now.saturating_duration_since(at))
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            state: self.state,
            generation: self.generation,
        }
    }
}

/// Three-state circuit breaker guarding one resource.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    clock: Arc<dyn Clock>,
    core: Mutex<Core>,
}

impl CircuitBreaker {
    /// Create a breaker driven by the system clock.
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self::with_clock(name, settings, Arc::new(SystemClock))
    }

    /// Create a breaker driven by the given clock.
    pub fn with_clock(
        name: impl Into<String>,
        settings: BreakerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = name.into();
        metrics::record_breaker_state(&name, CircuitState::Closed);
        Self {
            name,
            settings,
            clock,
            core: Mutex::new(Core::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether the next call may run.
    pub fn allow(&self) -> Admission<'_> {
        let now = self.clock.now();
        let mut core = self.lock();

        match core.state {
            CircuitState::Closed => Admission::Proceed(core.ticket()),
            CircuitState::Open => {
                let recovery = self.settings.recovery_timeout;
                let elapsed = core.since_last_failure(now).unwrap_or(recovery);
                if elapsed >= recovery {
                    self.transition(&mut core, CircuitState::HalfOpen, now);
                    core.half_open_in_flight = 1;
                    Admission::Probe(ProbePermit {
                        breaker: self,
                        ticket: core.ticket(),
                    })
                } else {
                    Admission::Reject(RejectReason::Open {
                        retry_after: recovery - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if core.half_open_in_flight < self.settings.half_open_max_calls {
                    core.half_open_in_flight += 1;
                    Admission::Probe(ProbePermit {
                        breaker: self,
                        ticket: core.ticket(),
                    })
                } else {
                    Admission::Reject(RejectReason::ProbesExhausted)
                }
            }
        }
    }

    /// Report a successful call against the current state.
    pub fn record_success(&self) {
        self.settle_success(None);
    }

    /// Report a successful call admitted with `ticket`. Ignored if the breaker
    /// has changed state since.
    pub fn record_success_for(&self, ticket: Ticket) {
        self.settle_success(Some(ticket));
    }

    /// Report a failed or timed-out call against the current state.
    pub fn record_failure(&self) {
        self.settle_failure(None);
    }

    /// Report a failed or timed-out call admitted with `ticket`. Ignored if
    /// the breaker has changed state since.
    pub fn record_failure_for(&self, ticket: Ticket) {
        self.settle_failure(Some(ticket));
    }

    fn is_stale(&self, core: &Core, ticket: Option<Ticket>) -> bool {
        match ticket {
            Some(ticket) if ticket.generation != core.generation => {
                tracing::debug!(
                    resource = %self.name,
                    admitted = %ticket.state,
                    current = %core.state,
                    "Ignoring outcome from an earlier breaker state"
                );
                true
            }
            _ => false,
        }
    }

    fn settle_success(&self, ticket: Option<Ticket>) {
        let now = self.clock.now();
        let mut core = self.lock();
        if self.is_stale(&core, ticket) {
            return;
        }

        match core.state {
            CircuitState::Closed => core.failure_count = 0,
            CircuitState::HalfOpen => {
                core.half_open_successes += 1;
                if core.half_open_successes >= self.settings.success_threshold {
                    self.transition(&mut core, CircuitState::Closed, now);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn settle_failure(&self, ticket: Option<Ticket>) {
        let now = self.clock.now();
        let mut core = self.lock();
        if self.is_stale(&core, ticket) {
            return;
        }

        match core.state {
            CircuitState::Closed => {
                core.failure_count = core.failure_count.saturating_add(1);
                core.last_failure = Some(now);
                if core.failure_count >= self.settings.failure_threshold {
                    self.transition(&mut core, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut core, CircuitState::Open, now);
            }
            CircuitState::Open => {}
        }
    }

    /// The only place state changes.
    fn transition(&self, core: &mut Core, to: CircuitState, now: Instant) -> bool {
        let from = core.state;
        if !from.can_transition_to(to) {
            tracing::debug!(resource = %self.name, %from, %to, "Ignoring illegal breaker transition");
            return false;
        }

        match to {
            CircuitState::Open => {
                core.last_failure = Some(now);
                core.trips += 1;
            }
            CircuitState::HalfOpen => {}
            CircuitState::Closed => core.failure_count = 0,
        }
        core.generation += 1;
        core.half_open_in_flight = 0;
        core.half_open_successes = 0;
        core.state = to;

        match to {
            CircuitState::Open => tracing::warn!(
                resource = %self.name,
                %from,
                failures = core.failure_count,
                recovery_timeout_ms = self.settings.recovery_timeout.as_millis() as u64,
                "Circuit opened"
            ),
            CircuitState::HalfOpen => {
                tracing::info!(resource = %self.name, "Circuit half-open, admitting probes")
            }
            CircuitState::Closed => tracing::info!(resource = %self.name, "Circuit closed"),
        }
        metrics::record_breaker_transition(&self.name, from, to);
        true
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Snapshot of the counters. Never triggers a transition.
    pub fn stats(&self) -> BreakerStats {
        let core = self.lock();
        BreakerStats {
            state: core.state,
            failure_count: core.failure_count,
            last_failure: core.last_failure,
            half_open_in_flight: core.half_open_in_flight,
            half_open_successes: core.half_open_successes,
            trips: core.trips,
        }
    }

    /// Remaining cooldown while Open, zero in any other state.
    pub fn remaining_cooldown(&self) -> Duration {
        let now = self.clock.now();
        let core = self.lock();
        if core.state != CircuitState::Open {
            return Duration::ZERO;
        }
        let elapsed = core
            .since_last_failure(now)
            .unwrap_or(self.settings.recovery_timeout);
        self.settings.recovery_timeout.saturating_sub(elapsed)
    }
}

/// A Half-Open probe slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct ProbePermit<'a> {
    breaker: &'a CircuitBreaker,
    ticket: Ticket,
}

impl ProbePermit<'_> {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }
}

impl Drop for ProbePermit<'_> {
    fn drop(&mut self) {
        let mut core = self.breaker.lock();
        if core.generation == self.ticket.generation {
            core.half_open_in_flight = core.half_open_in_flight.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;
    use std::sync::Barrier;

    fn breaker(settings: BreakerSettings) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cb = CircuitBreaker::with_clock("test", settings, clock.clone());
        (cb, clock)
    }

    fn trip(cb: &CircuitBreaker) {
        for _ in 0..cb.settings().failure_threshold {
            assert!(cb.allow().is_proceed());
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_legal_transitions() {
        use CircuitState::*;
        let all = [Closed, Open, HalfOpen];
        let legal: Vec<_> = all
            .iter()
            .flat_map(|from| all.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(
            legal,
            vec![(Closed, Open), (Open, HalfOpen), (HalfOpen, Closed), (HalfOpen, Open)]
        );
    }

    #[test]
    fn test_opens_at_threshold() {
        let (cb, _) = breaker(BreakerSettings::default());
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().failure_count, 4);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.stats().trips, 1);
    }

    #[test]
    fn test_success_in_closed_resets_failures() {
        let (cb, _) = breaker(BreakerSettings::default());
        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.stats().failure_count, 0);

        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_rejects_until_recovery_timeout() {
        let (cb, clock) = breaker(BreakerSettings::default());
        trip(&cb);

        match cb.allow() {
            Admission::Reject(RejectReason::Open { retry_after }) => {
                assert_eq!(retry_after, Duration::from_millis(60_000));
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        clock.advance_ms(59_999);
        match cb.allow() {
            Admission::Reject(reason) => assert_eq!(reason.retry_after(), Duration::from_millis(1)),
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance_ms(1);
        assert!(cb.allow().is_probe());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_open_ignores_outcomes() {
        let (cb, _) = breaker(BreakerSettings::default());
        trip(&cb);
        let before = cb.stats();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.stats(), before);
    }

    #[test]
    fn test_probe_success_closes() {
        let (cb, clock) = breaker(BreakerSettings::default());
        trip(&cb);
        clock.advance_ms(60_001);

        let permit = cb.allow();
        assert!(permit.is_probe());
        cb.record_success();
        drop(permit);

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.half_open_in_flight, 0);
        assert!(cb.allow().is_proceed());
    }

    #[test]
    fn test_probe_failure_reopens_and_restarts_cooldown() {
        let (cb, clock) = breaker(BreakerSettings::default());
        trip(&cb);
        clock.advance_ms(60_000);

        let permit = cb.allow();
        assert!(permit.is_probe());
        clock.advance_ms(250);
        cb.record_failure();
        drop(permit);

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.remaining_cooldown(), Duration::from_millis(60_000));
        assert_eq!(cb.stats().trips, 2);

        clock.advance_ms(59_999);
        assert!(cb.allow().is_reject());
    }

    #[test]
    fn test_half_open_limits_probes() {
        let (cb, clock) = breaker(BreakerSettings::default());
        trip(&cb);
        clock.advance_ms(60_000);

        let p1 = cb.allow();
        let p2 = cb.allow();
        let p3 = cb.allow();
        assert!(p1.is_probe() && p2.is_probe() && p3.is_probe());

        match cb.allow() {
            Admission::Reject(RejectReason::ProbesExhausted) => {}
            other => panic!("expected exhausted probes, got {:?}", other),
        }
        assert_eq!(cb.stats().half_open_in_flight, 3);

        // A cancelled probe gives its slot back without recording anything.
        drop(p2);
        assert_eq!(cb.stats().half_open_in_flight, 2);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow().is_probe());
        drop(p1);
        drop(p3);
    }

    #[test]
    fn test_stale_permit_does_not_touch_new_window() {
        let (cb, clock) = breaker(BreakerSettings::default());
        trip(&cb);
        clock.advance_ms(60_000);

        let stale = cb.allow();
        assert!(stale.is_probe());
        cb.record_failure();

        clock.advance_ms(60_000);
        let fresh = cb.allow();
        assert!(fresh.is_probe());
        assert_eq!(cb.stats().half_open_in_flight, 1);

        drop(stale);
        assert_eq!(cb.stats().half_open_in_flight, 1);
        drop(fresh);
        assert_eq!(cb.stats().half_open_in_flight, 0);
    }

    #[test]
    fn test_outcomes_from_closed_ignored_after_reopen() {
        let (cb, clock) = breaker(BreakerSettings::default());
        let Admission::Proceed(early) = cb.allow() else {
            panic!("closed breaker should admit");
        };
        assert_eq!(early.state(), CircuitState::Closed);

        trip(&cb);
        clock.advance_ms(60_001);
        let window = cb.allow();
        assert!(window.is_probe());

        cb.record_success_for(early);
        cb.record_failure_for(early);
        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::HalfOpen);
        assert_eq!(stats.half_open_successes, 0);
        assert_eq!(stats.half_open_in_flight, 1);
        assert_eq!(stats.trips, 1);

        let Admission::Probe(permit) = window else {
            unreachable!()
        };
        cb.record_success_for(permit.ticket());
        drop(permit);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_ticket_counts_within_its_generation() {
        let (cb, _) = breaker(BreakerSettings::default());
        for _ in 0..5 {
            let Admission::Proceed(ticket) = cb.allow() else {
                panic!("closed breaker should admit");
            };
            cb.record_failure_for(ticket);
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_threshold_requires_run() {
        let settings = BreakerSettings {
            success_threshold: 2,
            ..BreakerSettings::default()
        };
        let (cb, clock) = breaker(settings);
        trip(&cb);
        clock.advance_ms(60_000);

        let p = cb.allow();
        cb.record_success();
        drop(p);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.stats().half_open_successes, 1);

        let p = cb.allow();
        cb.record_success();
        drop(p);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_stats_do_not_transition() {
        let (cb, clock) = breaker(BreakerSettings::default());
        trip(&cb);
        clock.advance_ms(120_000);
        for _ in 0..10 {
            assert_eq!(cb.stats().state, CircuitState::Open);
            assert_eq!(cb.remaining_cooldown(), Duration::ZERO);
        }
    }

    #[test]
    fn test_zero_recovery_timeout_probes_immediately() {
        let settings = BreakerSettings {
            failure_threshold: 1,
            recovery_timeout: Duration::ZERO,
            ..BreakerSettings::default()
        };
        let (cb, _) = breaker(settings);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow().is_probe());
    }

    #[test]
    fn test_concurrent_entry_respects_probe_limit() {
        let (cb, clock) = breaker(BreakerSettings::default());
        trip(&cb);
        clock.advance_ms(60_001);

        let barrier = Barrier::new(5);
        let admissions: Vec<Admission<'_>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..5)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cb.allow()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let probes = admissions.iter().filter(|a| a.is_probe()).count();
        let rejects = admissions.iter().filter(|a| a.is_reject()).count();
        assert_eq!(probes, 3);
        assert_eq!(rejects, 2);
    }
}
