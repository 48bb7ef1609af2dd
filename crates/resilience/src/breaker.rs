//! Consecutive-count circuit breaker.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{CircuitBreakerConfig, HalfOpenPolicy};
use crate::error::{CallError, CircuitOpen, ConfigError};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    /// Calls pass through.
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// Trial calls decide whether to close or reopen.
    HalfOpen,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

impl State {
    const fn to_atomic(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }

    const fn from_atomic(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Snapshot of a breaker's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    /// Current state.
    pub state: State,
    /// Failures since the last success or state change.
    pub consecutive_failures: u32,
    /// Trial successes since the circuit went half-open.
    pub consecutive_successes: u32,
    /// When the circuit last opened. `Some` only while open.
    pub opened_at: Option<Instant>,
    /// Trial calls currently running.
    pub trials_in_flight: u32,
    /// Calls that were admitted and ran.
    pub total_calls: u64,
    /// Admitted calls that failed.
    pub total_failures: u64,
    /// Calls rejected without running.
    pub total_rejections: u64,
}

/// How a call got through the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Pass,
    Trial,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
    total_calls: u64,
    total_failures: u64,
    total_rejections: u64,
}

impl Inner {
    const fn new() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            trials_in_flight: 0,
            total_calls: 0,
            total_failures: 0,
            total_rejections: 0,
        }
    }
}

/// A circuit breaker guarding one upstream dependency.
///
/// Share it behind an `Arc`; [`crate::BreakerRegistry`] does that for you.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    /// Mirror of `inner.state` for lock-free reads.
    atomic_state: AtomicU8,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Releases a half-open trial slot when the call ends or is dropped.
struct TrialPermit<'a> {
    breaker: &'a CircuitBreaker,
}

impl Drop for TrialPermit<'_> {
    fn drop(&mut self) {
        let mut inner = self.breaker.inner.lock();
        inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
    }
}

impl CircuitBreaker {
    /// Create a closed breaker for `name`.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(name.into(), config))
    }

    pub(crate) fn from_validated(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner::new()),
            atomic_state: AtomicU8::new(State::Closed.to_atomic()),
        }
    }

    /// The dependency this breaker guards.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The breaker's configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, without locking.
    ///
    /// An open circuit whose cooldown has elapsed still reports
    /// [`State::Open`] until the next call moves it to half-open.
    #[must_use]
    pub fn state(&self) -> State {
        State::from_atomic(self.atomic_state.load(Ordering::Acquire))
    }

    /// Returns `true` if the circuit is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            opened_at: inner.opened_at,
            trials_in_flight: inner.trials_in_flight,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
        }
    }

    /// Force the circuit closed and clear the consecutive counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        info!(dependency = %self.name, from = %inner.state, "circuit breaker reset");
        self.set_state(&mut inner, State::Closed);
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns [`CallError::CircuitOpen`] without calling `operation` when
    /// the circuit rejects the call.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit()?;
        let _permit = (admission == Admission::Trial).then_some(TrialPermit { breaker: self });

        let result = operation().await;
        match &result {
            Ok(_) => self.on_success(admission),
            Err(_) => self.on_failure(admission),
        }
        result.map_err(CallError::Upstream)
    }

    /// Like [`CircuitBreaker::call`], but a rejected call returns
    /// `fallback`'s value instead of an error.
    pub async fn call_with_fallback<T, E, F, Fut, B>(&self, operation: F, fallback: B) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        B: FnOnce(CircuitOpen) -> T,
    {
        match self.call(operation).await {
            Ok(value) => Ok(value),
            Err(CallError::CircuitOpen(open)) => {
                debug!(dependency = %self.name, "circuit open, using fallback");
                Ok(fallback(open))
            }
            Err(CallError::Upstream(e)) => Err(e),
        }
    }

    fn admit(&self) -> Result<Admission, CircuitOpen> {
        if self.state() == State::Closed {
            return Ok(Admission::Pass);
        }

        let mut inner = self.inner.lock();
        if inner.state == State::Open {
            let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
            let elapsed = Instant::now().saturating_duration_since(opened_at);
            let cooldown = self.config.open_duration();
            if elapsed < cooldown {
                inner.total_rejections += 1;
                return Err(self.rejection(cooldown - elapsed));
            }
            info!(dependency = %self.name, "circuit breaker transitioning from open to half-open");
            self.set_state(&mut inner, State::HalfOpen);
            inner.consecutive_successes = 0;
        }

        if inner.state == State::Closed {
            return Ok(Admission::Pass);
        }
        if self.config.half_open_policy == HalfOpenPolicy::SingleTrial && inner.trials_in_flight > 0 {
            inner.total_rejections += 1;
            return Err(self.rejection(Duration::ZERO));
        }
        inner.trials_in_flight += 1;
        Ok(Admission::Trial)
    }

    fn rejection(&self, retry_after: Duration) -> CircuitOpen {
        CircuitOpen {
            dependency: self.name.clone(),
            retry_after,
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        match (inner.state, admission) {
            (State::Closed, Admission::Pass) => {
                inner.consecutive_failures = 0;
            }
            (State::HalfOpen, Admission::Trial) => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    info!(dependency = %self.name, "circuit breaker transitioning from half-open to closed");
                    self.set_state(&mut inner, State::Closed);
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                }
            }
            // the circuit moved on while this call ran
            (state, _) => debug!(dependency = %self.name, %state, "ignoring stale success"),
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.total_failures += 1;
        match (inner.state, admission) {
            (State::Closed, Admission::Pass) => {
                inner.consecutive_failures += 1;
                inner.consecutive_successes = 0;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        dependency = %self.name,
                        failures = inner.consecutive_failures,
                        "circuit breaker opening"
                    );
                    self.open(&mut inner);
                }
            }
            (State::HalfOpen, Admission::Trial) => {
                warn!(dependency = %self.name, "trial call failed, circuit breaker reopening");
                self.open(&mut inner);
            }
            (state, _) => debug!(dependency = %self.name, %state, "ignoring stale failure"),
        }
    }

    fn open(&self, inner: &mut Inner) {
        self.set_state(inner, State::Open);
        inner.opened_at = Some(Instant::now());
        inner.consecutive_successes = 0;
    }

    /// Update the state and its atomic mirror; `opened_at` is cleared on
    /// every move away from open.
    fn set_state(&self, inner: &mut Inner, state: State) {
        inner.state = state;
        if state != State::Open {
            inner.opened_at = None;
        }
        self.atomic_state.store(state.to_atomic(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;
    use tokio::sync::oneshot;
    use tokio::time::advance;

    #[derive(Debug, thiserror::Error)]
    #[error("upstream down")]
    struct Down;

    fn breaker(policy: HalfOpenPolicy) -> CircuitBreaker {
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(3)
            .with_open_duration(Duration::from_millis(1000))
            .with_success_threshold(2)
            .with_half_open_policy(policy);
        CircuitBreaker::new("metadata", config).unwrap()
    }

    async fn fail(b: &CircuitBreaker) {
        let result = b.call(|| async { Err::<(), _>(Down) }).await;
        assert!(matches!(result, Err(CallError::Upstream(Down))));
    }

    async fn succeed(b: &CircuitBreaker) -> Result<(), CallError<Down>> {
        b.call(|| async { Ok::<_, Down>(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_recovers() {
        let b = breaker(HalfOpenPolicy::SingleTrial);
        for _ in 0..3 {
            fail(&b).await;
        }
        assert_eq!(b.state(), State::Open);
        assert!(b.stats().opened_at.is_some());

        advance(Duration::from_millis(500)).await;
        let calls = AtomicUsize::new(0);
        let rejected = b
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Down>(())
            })
            .await;
        match rejected {
            Err(CallError::CircuitOpen(open)) => {
                assert_eq!(open.dependency, "metadata");
                assert_eq!(open.retry_after, Duration::from_millis(500));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        advance(Duration::from_millis(501)).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), State::HalfOpen);
        assert!(b.stats().opened_at.is_none());

        succeed(&b).await.unwrap();
        let stats = b.stats();
        assert_eq!(stats.state, State::Closed);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.consecutive_successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_in_closed_resets_failures() {
        let b = breaker(HalfOpenPolicy::SingleTrial);
        fail(&b).await;
        fail(&b).await;
        succeed(&b).await.unwrap();
        fail(&b).await;
        fail(&b).await;
        assert_eq!(b.state(), State::Closed);
        assert_eq!(b.stats().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_with_fresh_cooldown() {
        let b = breaker(HalfOpenPolicy::SingleTrial);
        for _ in 0..3 {
            fail(&b).await;
        }
        advance(Duration::from_millis(1000)).await;
        fail(&b).await;
        assert_eq!(b.state(), State::Open);

        advance(Duration::from_millis(400)).await;
        match succeed(&b).await {
            Err(CallError::CircuitOpen(open)) => {
                assert_eq!(open.retry_after, Duration::from_millis(600));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_trial_rejects_concurrent_callers() {
        let b = Arc::new(breaker(HalfOpenPolicy::SingleTrial));
        for _ in 0..3 {
            fail(&b).await;
        }
        advance(Duration::from_millis(1000)).await;

        let (release, gate) = oneshot::channel::<()>();
        let trial = {
            let b = Arc::clone(&b);
            tokio::spawn(async move {
                b.call(|| async move {
                    gate.await.ok();
                    Ok::<_, Down>(())
                })
                .await
            })
        };
        while b.stats().trials_in_flight == 0 {
            tokio::task::yield_now().await;
        }

        let invoked = AtomicUsize::new(0);
        let second = b
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Down>(())
            })
            .await;
        assert!(matches!(second, Err(CallError::CircuitOpen(_))));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        release.send(()).unwrap();
        trial.await.unwrap().unwrap();
        let stats = b.stats();
        assert_eq!(stats.state, State::HalfOpen);
        assert_eq!(stats.consecutive_successes, 1);
        assert_eq!(stats.trials_in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_policy_admits_parallel_trials() {
        let b = breaker(HalfOpenPolicy::Concurrent);
        for _ in 0..3 {
            fail(&b).await;
        }
        advance(Duration::from_millis(1000)).await;

        let barrier = tokio::sync::Barrier::new(2);
        let trial = || async {
            barrier.wait().await;
            Ok::<_, Down>(())
        };
        let (first, second) = futures::join!(b.call(trial), b.call(trial));
        first.unwrap();
        second.unwrap();
        assert_eq!(b.state(), State::Closed);
        assert_eq!(b.stats().total_rejections, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_releases_slot_without_counting() {
        let b = breaker(HalfOpenPolicy::SingleTrial);
        for _ in 0..3 {
            fail(&b).await;
        }
        advance(Duration::from_millis(1000)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            b.call(|| std::future::pending::<Result<(), Down>>()),
        )
        .await;
        assert!(abandoned.is_err());

        let stats = b.stats();
        assert_eq!(stats.trials_in_flight, 0);
        assert_eq!(stats.consecutive_successes, 0);
        assert_eq!(stats.state, State::HalfOpen);
        succeed(&b).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_replaces_rejection_only() {
        let b = breaker(HalfOpenPolicy::SingleTrial);
        let upstream = b
            .call_with_fallback(|| async { Err::<&str, _>(Down) }, |_| "cached")
            .await;
        assert!(upstream.is_err());

        // the failed fallback call counts toward the threshold
        fail(&b).await;
        fail(&b).await;
        let value = b
            .call_with_fallback(|| async { Ok::<_, Down>("live") }, |_| "cached")
            .await
            .unwrap();
        assert_eq!(value, "cached");
        assert_eq!(b.stats().total_rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_closes_open_circuit() {
        let b = breaker(HalfOpenPolicy::SingleTrial);
        for _ in 0..3 {
            fail(&b).await;
        }
        b.reset();
        let stats = b.stats();
        assert_eq!(stats.state, State::Closed);
        assert_eq!(stats.consecutive_failures, 0);
        assert!(stats.opened_at.is_none());
        succeed(&b).await.unwrap();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = CircuitBreakerConfig::default().with_failure_threshold(0);
        assert!(CircuitBreaker::new("x", config).is_err());
    }

    #[test]
    fn state_display() {
        assert_eq!(State::HalfOpen.to_string(), "half-open");
        assert_eq!(State::from_atomic(State::Open.to_atomic()), State::Open);
    }
}
