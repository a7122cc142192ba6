/*!
 * # Circuit Breaker
 *
 * Fails fast against an external service (the geocoding lookup) after a run
 * of transport failures, then lets a single trial request through once the reset
 * timeout has elapsed.
 */

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::errors::ServiceError;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing limited requests to test recovery
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Duration to wait before transitioning from Open to HalfOpen
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker shared by clones of the same client
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
            })),
        }
    }

    /// Runs `call` unless the circuit is open.
    ///
    /// Only transport-level failures (`NetworkError`, `Timeout`) count
    /// against the breaker; a well-formed "no results" answer means the
    /// service is healthy.
    pub async fn execute<F, Fut, T>(&self, call: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if !self.can_execute() {
            return Err(ServiceError::CircuitBreakerOpen);
        }

        let result = call().await;
        match &result {
            Err(ServiceError::NetworkError(_)) | Err(ServiceError::Timeout) => self.on_failure(),
            _ => self.on_success(),
        }
        result
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(), // Recover from poisoned mutex
        }
    }

    fn can_execute(&self) -> bool {
        let mut state = self.lock();

        match state.state {
            CircuitState::Closed => true,
            // A half-open trial that never reported back (dropped future) is
            // replaced after another timeout.
            CircuitState::Open | CircuitState::HalfOpen => match state.last_failure_time {
                Some(last_failure) if last_failure.elapsed() >= self.config.timeout => {
                    state.state = CircuitState::HalfOpen;
                    state.last_failure_time = Some(Instant::now());
                    true
                }
                _ => false,
            },
        }
    }

    fn on_success(&self) {
        let mut state = self.lock();
        if state.state != CircuitState::Closed {
            info!(breaker = self.name, "Circuit closed after successful trial");
        }
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.last_failure_time = None;
    }

    fn on_failure(&self) {
        let mut state = self.lock();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                warn!(
                    breaker = self.name,
                    failures = state.failure_count,
                    "Circuit opened"
                );
                state.state = CircuitState::Open;
            }
            CircuitState::HalfOpen => {
                // Go back to open on any failure in half-open state
                state.state = CircuitState::Open;
            }
            _ => {}
        }
    }
}
