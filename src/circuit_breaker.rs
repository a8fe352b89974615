//! Failure-counting circuit breaker.
//!
//! A breaker guards one unreliable dependency. It starts **Closed** and lets
//! every call through. After `max_failures` consecutive failures it trips
//! **Open** and rejects calls with [`CircuitOpenError`] without running them.
//! The first [`allow`](CircuitBreaker::allow) check made more than `timeout`
//! after the last failure moves it to **HalfOpen** (with the failure count
//! reset) and lets that call through; a success closes the breaker, and
//! failures reaching the threshold open it again.
//!
//! All state lives behind one `RwLock` per breaker. Breakers are shared by
//! name through a [`BreakerRegistry`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Returned instead of running the guarded call while the breaker is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker is open for {breaker}")]
pub struct CircuitOpenError {
    pub breaker: String,
}

/// Outcome of a guarded call that did not succeed.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpenError),
    /// The guarded call ran and returned this error.
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    last_fail_time: Option<Instant>,
}

/// A single named breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    max_failures: u32,
    timeout: Duration,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, max_failures: u32, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            max_failures: max_failures.max(1),
            timeout,
            inner: RwLock::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                last_fail_time: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.read().state
    }

    pub fn failures(&self) -> u32 {
        self.inner.read().failures
    }

    /// Whether a call may proceed right now.
    ///
    /// In the Open state this performs the Open → HalfOpen transition once
    /// the timeout has elapsed since the last failure.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.state != BreakerState::Open {
            return true;
        }
        let elapsed = inner
            .last_fail_time
            .map(|t| t.elapsed() > self.timeout)
            .unwrap_or(true);
        if elapsed {
            inner.state = BreakerState::HalfOpen;
            inner.failures = 0;
            info!(breaker = %self.name, "circuit breaker half-open");
            true
        } else {
            false
        }
    }

    /// Record the outcome of a guarded call.
    pub fn record_result<T, E>(&self, result: &Result<T, E>) {
        let mut inner = self.inner.write();
        match result {
            Err(_) => {
                inner.failures += 1;
                inner.last_fail_time = Some(Instant::now());
                if inner.failures >= self.max_failures && inner.state != BreakerState::Open {
                    inner.state = BreakerState::Open;
                    warn!(
                        breaker = %self.name,
                        failures = inner.failures,
                        "circuit breaker opened"
                    );
                }
            }
            Ok(_) => {
                if inner.state == BreakerState::HalfOpen {
                    inner.state = BreakerState::Closed;
                    info!(breaker = %self.name, "circuit breaker closed");
                }
                inner.failures = 0;
            }
        }
    }

    fn open_error(&self) -> CircuitOpenError {
        CircuitOpenError {
            breaker: self.name.clone(),
        }
    }

    /// Run a synchronous call under the breaker.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.allow() {
            return Err(BreakerError::Open(self.open_error()));
        }
        let result = f();
        self.record_result(&result);
        result.map_err(BreakerError::Inner)
    }

    /// Run an async call under the breaker.
    ///
    /// The lock is never held across the await point.
    pub async fn execute<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow() {
            return Err(BreakerError::Open(self.open_error()));
        }
        let result = f().await;
        self.record_result(&result);
        result.map_err(BreakerError::Inner)
    }
}

/// Named breakers, one per protected dependency.
#[derive(Debug)]
pub struct BreakerRegistry {
    max_failures: u32,
    timeout: Duration,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Breakers created through this registry share these thresholds.
    pub fn new(max_failures: u32, timeout: Duration) -> Self {
        Self {
            max_failures,
            timeout,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the breaker for `name`, creating it on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(name) {
            return Arc::clone(existing);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(name, self.max_failures, self.timeout))
        }))
    }

    /// Snapshot of `(name, state, failures)` for every breaker.
    pub fn snapshot(&self) -> Vec<(String, BreakerState, u32)> {
        let breakers = self.breakers.read();
        let mut out: Vec<_> = breakers
            .values()
            .map(|b| (b.name().to_string(), b.state(), b.failures()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fail() -> Result<(), &'static str> {
        Err("boom")
    }

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::new("dep", 3, Duration::from_secs(1));
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failures(), 0);
        assert!(cb.allow());
    }

    #[test]
    fn test_opens_after_max_failures_and_rejects_without_calling() {
        let cb = CircuitBreaker::new("dep", 3, Duration::from_secs(1));
        for _ in 0..3 {
            assert!(matches!(cb.call(fail), Err(BreakerError::Inner("boom"))));
        }
        assert_eq!(cb.state(), BreakerState::Open);

        let calls = AtomicUsize::new(0);
        let result: Result<(), BreakerError<&str>> = cb.call(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        match result {
            Err(BreakerError::Open(e)) => assert_eq!(e.breaker, "dep"),
            other => panic!("expected open error, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_half_open_then_closed_after_timeout() {
        let cb = CircuitBreaker::new("dep", 3, Duration::from_millis(100));
        for _ in 0..3 {
            let _ = cb.call(fail);
        }
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow());

        std::thread::sleep(Duration::from_millis(150));
        let result: Result<u32, BreakerError<&str>> = cb.call(|| Ok(7));
        assert_eq!(result.unwrap(), 7);
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failures(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens_at_threshold() {
        let cb = CircuitBreaker::new("dep", 2, Duration::from_millis(50));
        let _ = cb.call(fail);
        let _ = cb.call(fail);
        std::thread::sleep(Duration::from_millis(80));

        assert!(cb.allow());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert_eq!(cb.failures(), 0);

        let _ = cb.call(fail);
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        let _ = cb.call(fail);
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("dep", 3, Duration::from_secs(1));
        let _ = cb.call(fail);
        let _ = cb.call(fail);
        assert_eq!(cb.failures(), 2);
        let _: Result<(), BreakerError<&str>> = cb.call(|| Ok(()));
        assert_eq!(cb.failures(), 0);
        let _ = cb.call(fail);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_execute_async() {
        let cb = CircuitBreaker::new("dep", 1, Duration::from_secs(60));
        let ok: Result<&str, BreakerError<String>> = cb.execute(|| async { Ok("fine") }).await;
        assert_eq!(ok.unwrap(), "fine");

        let err: Result<(), BreakerError<String>> =
            cb.execute(|| async { Err("down".to_string()) }).await;
        assert!(matches!(err, Err(BreakerError::Inner(ref m)) if m == "down"));
        assert_eq!(cb.state(), BreakerState::Open);

        let rejected: Result<(), BreakerError<String>> = cb.execute(|| async { Ok(()) }).await;
        assert!(matches!(rejected, Err(BreakerError::Open(_))));
    }

    #[test]
    fn test_registry_shares_breakers_by_name() {
        let registry = BreakerRegistry::new(2, Duration::from_secs(5));
        let a = registry.get("embedding");
        let b = registry.get("embedding");
        let c = registry.get("index_store");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let _ = a.call(fail);
        let _ = a.call(fail);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0], ("embedding".to_string(), BreakerState::Open, 2));
        assert_eq!(snapshot[1], ("index_store".to_string(), BreakerState::Closed, 0));
    }
}
