//! Per-provider circuit breaker
//!
//! Tracks consecutive transferable failures per provider and gates
//! selection. An open circuit is skipped until its probe deadline; the
//! half-open state admits exactly one probe request, whose outcome
//! either closes the circuit or reopens it with doubled backoff.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

/// Circuit breaker tuning
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// First open interval, in seconds
    pub base_backoff_seconds: u64,
    /// Cap for the exponential backoff, in seconds
    pub max_backoff_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_backoff_seconds: 60,
            max_backoff_seconds: 600,
        }
    }
}

/// Circuit state for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing; selection skips the provider
    Open,
    /// Probe window; one request may test recovery
    HalfOpen,
}

/// Selection decision for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Circuit closed; attempt normally
    Normal,
    /// Circuit half-open; this caller holds the single probe slot
    Probe,
    /// Circuit open (or probe slot taken); skip this provider
    Skip,
}

/// Point-in-time view of a provider's health, for the health surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Current circuit state
    pub state: CircuitState,
    /// Consecutive transferable failures
    pub consecutive_failures: u32,
    /// Current backoff interval in seconds
    pub backoff_seconds: u64,
    /// Unix timestamp of the last success, 0 if none recorded
    pub last_success: u64,
}

struct ProviderHealth {
    consecutive_failures: AtomicU32,
    /// Epoch seconds after which a probe may run; 0 means closed
    probe_deadline: AtomicU64,
    backoff_seconds: AtomicU64,
    probe_inflight: AtomicBool,
    last_success: AtomicU64,
}

impl ProviderHealth {
    fn new(base_backoff: u64) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            probe_deadline: AtomicU64::new(0),
            backoff_seconds: AtomicU64::new(base_backoff),
            probe_inflight: AtomicBool::new(false),
            last_success: AtomicU64::new(0),
        }
    }
}

/// Concurrent-safe health table; readers are frequent, writers rare
pub struct HealthTracker {
    providers: DashMap<String, ProviderHealth>,
    config: CircuitBreakerConfig,
}

impl HealthTracker {
    /// Create a tracker with the given tuning
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            providers: DashMap::new(),
            config,
        }
    }

    /// Circuit state for a provider
    pub fn state(&self, provider: &str) -> CircuitState {
        let Some(health) = self.providers.get(provider) else {
            return CircuitState::Closed;
        };

        let deadline = health.probe_deadline.load(Ordering::Relaxed);
        if deadline == 0 {
            CircuitState::Closed
        } else if now_secs() < deadline {
            CircuitState::Open
        } else {
            CircuitState::HalfOpen
        }
    }

    /// Claim an attempt slot for a provider
    ///
    /// Half-open circuits hand out exactly one probe; concurrent callers
    /// see `Skip` until the probe resolves.
    pub fn try_acquire(&self, provider: &str) -> Attempt {
        let health = self
            .providers
            .entry(provider.to_owned())
            .or_insert_with(|| ProviderHealth::new(self.config.base_backoff_seconds));

        let deadline = health.probe_deadline.load(Ordering::Relaxed);
        if deadline == 0 {
            Attempt::Normal
        } else if now_secs() < deadline {
            Attempt::Skip
        } else if health.probe_inflight.swap(true, Ordering::AcqRel) {
            Attempt::Skip
        } else {
            Attempt::Probe
        }
    }

    /// Record a successful request; closes the circuit
    pub fn record_success(&self, provider: &str) {
        let health = self
            .providers
            .entry(provider.to_owned())
            .or_insert_with(|| ProviderHealth::new(self.config.base_backoff_seconds));

        health.probe_deadline.store(0, Ordering::Relaxed);
        health.consecutive_failures.store(0, Ordering::Relaxed);
        health
            .backoff_seconds
            .store(self.config.base_backoff_seconds, Ordering::Relaxed);
        health.probe_inflight.store(false, Ordering::Relaxed);
        health.last_success.store(now_secs(), Ordering::Relaxed);
    }

    /// Record a transferable failure
    ///
    /// A failed probe reopens the circuit with doubled backoff; a normal
    /// failure counts toward the threshold and opens the circuit when
    /// reached.
    pub fn record_failure(&self, provider: &str, probe: bool) {
        let health = self
            .providers
            .entry(provider.to_owned())
            .or_insert_with(|| ProviderHealth::new(self.config.base_backoff_seconds));

        if probe {
            let doubled = health
                .backoff_seconds
                .load(Ordering::Relaxed)
                .saturating_mul(2)
                .min(self.config.max_backoff_seconds);
            health.backoff_seconds.store(doubled, Ordering::Relaxed);
            health.probe_deadline.store(now_secs() + doubled, Ordering::Relaxed);
            health.probe_inflight.store(false, Ordering::Relaxed);
            drop(health);
            tracing::warn!(provider, backoff_seconds = doubled, "probe failed, circuit reopened");
            return;
        }

        let failures = health.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.failure_threshold && health.probe_deadline.load(Ordering::Relaxed) == 0 {
            let backoff = health.backoff_seconds.load(Ordering::Relaxed);
            health.probe_deadline.store(now_secs() + backoff, Ordering::Relaxed);
            drop(health);
            tracing::warn!(provider, failures, backoff_seconds = backoff, "circuit opened");
        }
    }

    /// Return a claimed probe slot without deciding the circuit
    ///
    /// Used when the probe's outcome carries no health signal (a
    /// provider-side throttle or a non-transferable error that surfaces
    /// to the caller).
    pub fn release_probe(&self, provider: &str) {
        if let Some(health) = self.providers.get(provider) {
            health.probe_inflight.store(false, Ordering::Relaxed);
        }
    }

    /// Point-in-time view for the health surface
    pub fn snapshot(&self, provider: &str) -> HealthSnapshot {
        let state = self.state(provider);
        self.providers.get(provider).map_or(
            HealthSnapshot {
                state,
                consecutive_failures: 0,
                backoff_seconds: self.config.base_backoff_seconds,
                last_success: 0,
            },
            |health| HealthSnapshot {
                state,
                consecutive_failures: health.consecutive_failures.load(Ordering::Relaxed),
                backoff_seconds: health.backoff_seconds.load(Ordering::Relaxed),
                last_success: health.last_success.load(Ordering::Relaxed),
            },
        )
    }

    #[cfg(test)]
    fn force_probe_deadline(&self, provider: &str, deadline: u64) {
        if let Some(health) = self.providers.get(provider) {
            health.probe_deadline.store(deadline, Ordering::Relaxed);
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(threshold: u32, base: u64) -> HealthTracker {
        HealthTracker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            base_backoff_seconds: base,
            max_backoff_seconds: 600,
        })
    }

    #[test]
    fn unknown_provider_is_closed() {
        let tracker = tracker(5, 60);
        assert_eq!(tracker.state("fresh"), CircuitState::Closed);
        assert_eq!(tracker.try_acquire("fresh"), Attempt::Normal);
    }

    #[test]
    fn failures_below_threshold_stay_closed() {
        let tracker = tracker(3, 60);
        tracker.record_failure("p", false);
        tracker.record_failure("p", false);
        assert_eq!(tracker.state("p"), CircuitState::Closed);
    }

    #[test]
    fn threshold_opens_and_selection_skips() {
        let tracker = tracker(3, 60);
        for _ in 0..3 {
            tracker.record_failure("p", false);
        }
        assert_eq!(tracker.state("p"), CircuitState::Open);
        assert_eq!(tracker.try_acquire("p"), Attempt::Skip);
    }

    #[test]
    fn elapsed_deadline_grants_exactly_one_probe() {
        let tracker = tracker(1, 60);
        tracker.record_failure("p", false);
        tracker.force_probe_deadline("p", 1);

        assert_eq!(tracker.state("p"), CircuitState::HalfOpen);
        assert_eq!(tracker.try_acquire("p"), Attempt::Probe);
        // Second caller must not get a probe while the first is in flight
        assert_eq!(tracker.try_acquire("p"), Attempt::Skip);
    }

    #[test]
    fn probe_success_closes_the_circuit() {
        let tracker = tracker(1, 60);
        tracker.record_failure("p", false);
        tracker.force_probe_deadline("p", 1);
        assert_eq!(tracker.try_acquire("p"), Attempt::Probe);

        tracker.record_success("p");
        assert_eq!(tracker.state("p"), CircuitState::Closed);
        assert_eq!(tracker.try_acquire("p"), Attempt::Normal);
        assert_eq!(tracker.snapshot("p").consecutive_failures, 0);
    }

    #[test]
    fn probe_failure_doubles_backoff_and_reopens() {
        let tracker = tracker(1, 30);
        tracker.record_failure("p", false);
        assert_eq!(tracker.snapshot("p").backoff_seconds, 30);

        tracker.force_probe_deadline("p", 1);
        assert_eq!(tracker.try_acquire("p"), Attempt::Probe);
        tracker.record_failure("p", true);

        assert_eq!(tracker.state("p"), CircuitState::Open);
        assert_eq!(tracker.snapshot("p").backoff_seconds, 60);

        // A second failed probe doubles again
        tracker.force_probe_deadline("p", 1);
        assert_eq!(tracker.try_acquire("p"), Attempt::Probe);
        tracker.record_failure("p", true);
        assert_eq!(tracker.snapshot("p").backoff_seconds, 120);
    }

    #[test]
    fn backoff_is_capped() {
        let tracker = HealthTracker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            base_backoff_seconds: 400,
            max_backoff_seconds: 600,
        });
        tracker.record_failure("p", false);
        tracker.force_probe_deadline("p", 1);
        assert_eq!(tracker.try_acquire("p"), Attempt::Probe);
        tracker.record_failure("p", true);
        assert_eq!(tracker.snapshot("p").backoff_seconds, 600);
    }

    #[test]
    fn released_probe_can_be_claimed_again() {
        let tracker = tracker(1, 60);
        tracker.record_failure("p", false);
        tracker.force_probe_deadline("p", 1);

        assert_eq!(tracker.try_acquire("p"), Attempt::Probe);
        tracker.release_probe("p");
        assert_eq!(tracker.try_acquire("p"), Attempt::Probe);
    }

    #[test]
    fn independent_provider_tracking() {
        let tracker = tracker(1, 60);
        tracker.record_failure("bad", false);
        assert_eq!(tracker.state("bad"), CircuitState::Open);
        assert_eq!(tracker.state("good"), CircuitState::Closed);
    }
}
