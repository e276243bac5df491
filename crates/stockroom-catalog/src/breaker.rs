//! Circuit breaker for calls into the primary store.
//!
//! The breaker counts outcomes inside a rolling window (a *generation*).
//! While **Closed** every call passes through; once the trip policy matches,
//! it moves to **Open** and rejects calls without running them. After the
//! cool-down it moves to **Half-Open** and admits a bounded number of trial
//! calls: enough consecutive successes close it, any failure reopens it.
//!
//! Outcomes reported for an older generation are discarded, so a slow reply
//! that started before a transition cannot skew the new window.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use stockroom_core::clock::Clock;
use thiserror::Error;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through and outcomes are counted.
    Closed,
    /// A bounded number of trial calls are admitted.
    HalfOpen,
    /// Calls are rejected without running.
    Open,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::HalfOpen => f.write_str("half-open"),
            Self::Open => f.write_str("open"),
        }
    }
}

/// Outcome counters for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Calls admitted.
    pub requests: u32,
    /// Calls that succeeded.
    pub total_successes: u32,
    /// Calls that failed.
    pub total_failures: u32,
    /// Successes since the last failure.
    pub consecutive_successes: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// Failures divided by requests; zero before the first request.
    #[must_use]
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        f64::from(self.total_failures) / f64::from(self.requests)
    }
}

/// Decides when a closed breaker trips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripPolicy {
    /// Minimum admitted calls in the window.
    pub min_requests: u32,
    /// Minimum failed calls in the window.
    pub min_failures: u32,
    /// Minimum `failures / requests`.
    pub failure_ratio: f64,
}

impl TripPolicy {
    /// Returns `true` when every threshold is met.
    #[must_use]
    pub fn should_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.min_requests
            && counts.total_failures >= self.min_failures
            && counts.failure_ratio() >= self.failure_ratio
    }
}

impl Default for TripPolicy {
    fn default() -> Self {
        Self {
            min_requests: 3,
            min_failures: 3,
            failure_ratio: 0.6,
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Name used in logs.
    pub name: String,
    /// Trial calls admitted at once while half-open, and the consecutive
    /// successes needed to close.
    pub max_requests: u32,
    /// Length of a closed-state counting window. Zero keeps one window
    /// until the next state change.
    pub interval: Duration,
    /// How long the breaker stays open before admitting a trial.
    pub timeout: Duration,
    /// When to trip.
    pub trip: TripPolicy,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            name: "product-db-query".to_owned(),
            max_requests: 1,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            trip: TripPolicy::default(),
        }
    }
}

/// Receives every state transition. Must not call back into the breaker.
pub trait StateObserver: Send + Sync {
    /// Called after the breaker named `name` moved from `from` to `to`.
    fn on_state_change(&self, name: &str, from: BreakerState, to: BreakerState);
}

/// Observer that logs transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl StateObserver for TracingObserver {
    fn on_state_change(&self, name: &str, from: BreakerState, to: BreakerState) {
        tracing::warn!(breaker = name, %from, %to, "circuit breaker changed state");
    }
}

/// Why a call did not produce the operation's own result.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is open; the operation was not run.
    #[error("circuit breaker is open")]
    Open,
    /// The half-open trial budget is in use; the operation was not run.
    #[error("circuit breaker is half-open and its trial budget is in use")]
    TooManyRequests,
    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Returns `true` when the call was short-circuited.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Open | Self::TooManyRequests)
    }
}

#[derive(Debug, Clone, Copy)]
enum Rejection {
    Open,
    TooManyRequests,
}

type Transition = (BreakerState, BreakerState);

#[derive(Debug)]
struct Window {
    state: BreakerState,
    generation: u64,
    counts: Counts,
    expiry: Option<DateTime<Utc>>,
}

/// A three-state circuit breaker shared by concurrent callers.
pub struct CircuitBreaker {
    settings: BreakerSettings,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn StateObserver>,
    window: Mutex<Window>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("settings", &self.settings)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker that logs its transitions.
    #[must_use]
    pub fn new(settings: BreakerSettings, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let expiry = deadline(now, settings.interval);
        Self {
            settings,
            clock,
            observer: Arc::new(TracingObserver),
            window: Mutex::new(Window {
                state: BreakerState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    /// Replaces the transition observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The breaker's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// The current state, applying any due time-based transition.
    pub fn state(&self) -> BreakerState {
        let mut transitions = Vec::new();
        let state = {
            let mut window = self.lock();
            self.current_state(&mut window, self.clock.now(), &mut transitions)
        };
        self.notify(&transitions);
        state
    }

    /// Counters for the current generation.
    pub fn counts(&self) -> Counts {
        self.lock().counts
    }

    /// Runs `operation` unless the breaker rejects it, and records the
    /// outcome.
    ///
    /// If the returned future is dropped while the operation is in flight,
    /// the call is recorded as a failure.
    ///
    /// # Errors
    ///
    /// Returns `BreakerError::Open` or `BreakerError::TooManyRequests`
    /// without running `operation`, or `BreakerError::Inner` with the
    /// operation's own error.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.before_request().map_err(|rejection| match rejection {
            Rejection::Open => BreakerError::Open,
            Rejection::TooManyRequests => BreakerError::TooManyRequests,
        })?;
        let pending = PendingCall {
            breaker: self,
            generation,
            settled: false,
        };
        let result = operation().await;
        pending.settle(result.is_ok());
        result.map_err(BreakerError::Inner)
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn before_request(&self) -> Result<u64, Rejection> {
        let mut transitions = Vec::new();
        let admitted = {
            let mut window = self.lock();
            match self.current_state(&mut window, self.clock.now(), &mut transitions) {
                BreakerState::Open => Err(Rejection::Open),
                BreakerState::HalfOpen if window.counts.requests >= self.settings.max_requests => {
                    Err(Rejection::TooManyRequests)
                }
                BreakerState::Closed | BreakerState::HalfOpen => {
                    window.counts.on_request();
                    Ok(window.generation)
                }
            }
        };
        self.notify(&transitions);
        admitted
    }

    fn after_request(&self, generation: u64, success: bool) {
        let mut transitions = Vec::new();
        {
            let mut window = self.lock();
            let now = self.clock.now();
            let state = self.current_state(&mut window, now, &mut transitions);
            if window.generation == generation {
                match (state, success) {
                    (BreakerState::Closed, true) => window.counts.on_success(),
                    (BreakerState::HalfOpen, true) => {
                        window.counts.on_success();
                        if window.counts.consecutive_successes >= self.settings.max_requests {
                            self.set_state(
                                &mut window,
                                BreakerState::Closed,
                                now,
                                &mut transitions,
                            );
                        }
                    }
                    (BreakerState::Closed, false) => {
                        window.counts.on_failure();
                        if self.settings.trip.should_trip(&window.counts) {
                            self.set_state(&mut window, BreakerState::Open, now, &mut transitions);
                        }
                    }
                    (BreakerState::HalfOpen, false) => {
                        self.set_state(&mut window, BreakerState::Open, now, &mut transitions);
                    }
                    (BreakerState::Open, _) => {}
                }
            }
        }
        self.notify(&transitions);
    }

    fn current_state(
        &self,
        window: &mut Window,
        now: DateTime<Utc>,
        transitions: &mut Vec<Transition>,
    ) -> BreakerState {
        let expired = window.expiry.is_some_and(|expiry| expiry <= now);
        match window.state {
            BreakerState::Closed if expired => self.new_generation(window, now),
            BreakerState::Open if expired => {
                self.set_state(window, BreakerState::HalfOpen, now, transitions);
            }
            _ => {}
        }
        window.state
    }

    fn set_state(
        &self,
        window: &mut Window,
        to: BreakerState,
        now: DateTime<Utc>,
        transitions: &mut Vec<Transition>,
    ) {
        if window.state == to {
            return;
        }
        let from = window.state;
        window.state = to;
        self.new_generation(window, now);
        transitions.push((from, to));
    }

    fn new_generation(&self, window: &mut Window, now: DateTime<Utc>) {
        window.generation = window.generation.wrapping_add(1);
        window.counts = Counts::default();
        window.expiry = match window.state {
            BreakerState::Closed => deadline(now, self.settings.interval),
            BreakerState::Open => deadline(now, self.settings.timeout),
            BreakerState::HalfOpen => None,
        };
    }

    fn notify(&self, transitions: &[Transition]) {
        for (from, to) in transitions {
            self.observer.on_state_change(&self.settings.name, *from, *to);
        }
    }
}

/// `now + period`, or `None` for a zero or unrepresentable period.
fn deadline(now: DateTime<Utc>, period: Duration) -> Option<DateTime<Utc>> {
    if period.is_zero() {
        return None;
    }
    TimeDelta::from_std(period)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
}

/// Records the outcome of an admitted call exactly once, treating a call
/// dropped mid-flight as a failure.
struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl PendingCall<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.after_request(self.generation, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use stockroom_test_support::ManualClock;
    use tokio::sync::oneshot;

    use super::*;

    #[derive(Default)]
    struct RecordingObserver {
        transitions: Mutex<Vec<Transition>>,
    }

    impl StateObserver for RecordingObserver {
        fn on_state_change(&self, _name: &str, from: BreakerState, to: BreakerState) {
            self.transitions.lock().unwrap().push((from, to));
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ))
    }

    fn breaker(clock: &Arc<ManualClock>) -> CircuitBreaker {
        CircuitBreaker::new(BreakerSettings::default(), clock.clone())
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker.call(|| async { Err::<(), _>("db down") }).await;
    }

    async fn succeed(breaker: &CircuitBreaker) {
        let _ = breaker.call(|| async { Ok::<_, &str>(()) }).await;
    }

    #[tokio::test]
    async fn test_closed_breaker_passes_results_through() {
        // Arrange
        let clock = clock();
        let breaker = breaker(&clock);

        // Act
        let ok = breaker.call(|| async { Ok::<_, &str>(7) }).await;
        let err = breaker.call(|| async { Err::<i32, _>("boom") }).await;

        // Assert
        assert_eq!(ok.unwrap(), 7);
        assert!(matches!(err, Err(BreakerError::Inner("boom"))));
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.counts().requests, 2);
    }

    #[tokio::test]
    async fn test_three_failures_trip_and_short_circuit_next_call() {
        // Arrange
        let clock = clock();
        let breaker = breaker(&clock);
        for _ in 0..3 {
            fail(&breaker).await;
        }
        let invoked = AtomicUsize::new(0);

        // Act
        let result = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;

        // Assert
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(matches!(result, Err(BreakerError::Open)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_does_not_trip_below_failure_ratio() {
        // Arrange
        let clock = clock();
        let breaker = breaker(&clock);

        // Act: 2 failures out of 4 calls, then 3 of 6 (ratio 0.5).
        succeed(&breaker).await;
        fail(&breaker).await;
        succeed(&breaker).await;
        fail(&breaker).await;
        succeed(&breaker).await;
        fail(&breaker).await;

        // Assert
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.counts().total_failures, 3);
    }

    #[tokio::test]
    async fn test_trips_at_exact_ratio_threshold() {
        // Arrange
        let clock = clock();
        let breaker = breaker(&clock);

        // Act: 3 failures out of 5 calls is a ratio of 0.6.
        succeed(&breaker).await;
        succeed(&breaker).await;
        fail(&breaker).await;
        fail(&breaker).await;
        fail(&breaker).await;

        // Assert
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_counts_reset_when_interval_elapses() {
        // Arrange
        let clock = clock();
        let breaker = breaker(&clock);
        fail(&breaker).await;
        fail(&breaker).await;

        // Act
        clock.advance(Duration::from_secs(61));
        fail(&breaker).await;

        // Assert
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.counts().total_failures, 1);
    }

    #[tokio::test]
    async fn test_open_breaker_half_opens_after_timeout_and_closes_on_success() {
        // Arrange
        let clock = clock();
        let observer = Arc::new(RecordingObserver::default());
        let breaker = breaker(&clock).with_observer(observer.clone());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        // Act
        clock.advance(Duration::from_secs(29));
        let still_open = breaker.state();
        clock.advance(Duration::from_secs(1));
        let after_cool_down = breaker.state();
        let trial = breaker.call(|| async { Ok::<_, &str>("fresh") }).await;

        // Assert
        assert_eq!(still_open, BreakerState::Open);
        assert_eq!(after_cool_down, BreakerState::HalfOpen);
        assert_eq!(trial.unwrap(), "fresh");
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(
            *observer.transitions.lock().unwrap(),
            vec![
                (BreakerState::Closed, BreakerState::Open),
                (BreakerState::Open, BreakerState::HalfOpen),
                (BreakerState::HalfOpen, BreakerState::Closed),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_trial_reopens_breaker() {
        // Arrange
        let clock = clock();
        let breaker = breaker(&clock);
        for _ in 0..3 {
            fail(&breaker).await;
        }
        clock.advance(Duration::from_secs(30));

        // Act
        fail(&breaker).await;

        // Assert
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_half_open_admits_exactly_one_trial_at_a_time() {
        // Arrange
        let clock = clock();
        let breaker = Arc::new(breaker(&clock));
        for _ in 0..3 {
            fail(&breaker).await;
        }
        clock.advance(Duration::from_secs(30));
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let trial_breaker = breaker.clone();
        let trial = tokio::spawn(async move {
            trial_breaker
                .call(|| async move {
                    started_tx.send(()).unwrap();
                    release_rx.await.unwrap();
                    Ok::<_, &str>("trial")
                })
                .await
        });
        started_rx.await.unwrap();
        let invoked = AtomicUsize::new(0);

        // Act
        let second = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>("second")
            })
            .await;
        release_tx.send(()).unwrap();
        let trial = trial.await.unwrap();

        // Assert
        assert!(matches!(second, Err(BreakerError::TooManyRequests)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(trial.unwrap(), "trial");
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_trial_counts_as_failure() {
        // Arrange
        let clock = clock();
        let breaker = breaker(&clock);
        for _ in 0..3 {
            fail(&breaker).await;
        }
        clock.advance(Duration::from_secs(30));

        // Act: the trial never completes and its future is dropped.
        let outcome = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.call(|| std::future::pending::<Result<(), &str>>()),
        )
        .await;

        // Assert
        assert!(outcome.is_err());
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_result_from_previous_generation_is_ignored() {
        // Arrange
        let clock = clock();
        let breaker = breaker(&clock);
        fail(&breaker).await;
        fail(&breaker).await;

        // Act: a call that began in the old window finishes after it ended.
        let late = breaker
            .call(|| async {
                clock.advance(Duration::from_secs(61));
                Err::<(), _>("late")
            })
            .await;

        // Assert
        assert!(late.is_err());
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.counts(), Counts::default());
    }
}
