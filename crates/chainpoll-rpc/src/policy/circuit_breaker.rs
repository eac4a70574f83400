//! Consecutive-failure circuit breaker guarding one job's RPC endpoint.
//!
//! A call asks for a [`CallPermit`] before it runs and settles the permit with
//! its outcome afterwards:
//!
//! - closed: every call is admitted; `failure_threshold` failures in a row
//!   open the circuit.
//! - open: nothing is admitted until `open_duration` has passed.
//! - half-open: exactly one trial call is in flight at a time. Its success
//!   counts towards `success_threshold` (reaching it closes the circuit); its
//!   failure reopens the circuit for another `open_duration`.
//!
//! A trial permit dropped without an outcome (the caller was cancelled or
//! timed out before settling) frees the slot for the next caller.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,
    /// Time spent open before a trial call is admitted.
    pub open_duration: Duration,
    /// Successful trial calls needed to close again.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(10),
            success_threshold: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32, trial_in_flight: bool },
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Self::Closed { .. } => CircuitState::Closed,
            Self::Open { .. } => CircuitState::Open,
            Self::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Shared breaker; clones observe and update the same circuit.
#[derive(Clone)]
pub struct CircuitBreaker {
    client: Arc<str>,
    config: CircuitBreakerConfig,
    phase: Arc<Mutex<Phase>>,
}

impl CircuitBreaker {
    pub fn new(client: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self {
            client: client.into(),
            config,
            phase: Arc::new(Mutex::new(Phase::Closed { failures: 0 })),
        }
    }

    /// Lock the phase, first letting an expired open period lapse into
    /// half-open.
    fn phase(&self) -> MutexGuard<'_, Phase> {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if let Phase::Open { since } = *phase {
            if since.elapsed() >= self.config.open_duration {
                *phase = Phase::HalfOpen { successes: 0, trial_in_flight: false };
                tracing::info!(client = %self.client, "circuit half-open, admitting a trial call");
            }
        }
        phase
    }

    pub fn state(&self) -> CircuitState {
        self.phase().state()
    }

    /// Admit a call, or `None` while the circuit is open or a trial call is
    /// already running.
    pub fn admit(&self) -> Option<CallPermit<'_>> {
        let mut phase = self.phase();
        let trial = match &mut *phase {
            Phase::Closed { .. } => false,
            Phase::Open { .. } => return None,
            Phase::HalfOpen { trial_in_flight, .. } => {
                if *trial_in_flight {
                    return None;
                }
                *trial_in_flight = true;
                true
            }
        };
        Some(CallPermit { breaker: self, trial, settled: false })
    }

    fn on_success(&self, trial: bool) {
        let mut phase = self.phase();
        match &mut *phase {
            Phase::Closed { failures } => *failures = 0,
            Phase::HalfOpen { successes, trial_in_flight } if trial => {
                *successes += 1;
                *trial_in_flight = false;
                if *successes >= self.config.success_threshold {
                    *phase = Phase::Closed { failures: 0 };
                    tracing::info!(client = %self.client, "circuit closed");
                }
            }
            // Late result of a call admitted before the circuit opened.
            _ => {}
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut phase = self.phase();
        match &mut *phase {
            Phase::Closed { failures } => {
                *failures += 1;
                if *failures >= self.config.failure_threshold {
                    tracing::warn!(client = %self.client, failures = *failures, "circuit open");
                    *phase = Phase::Open { since: Instant::now() };
                }
            }
            Phase::HalfOpen { .. } if trial => {
                tracing::warn!(client = %self.client, "trial call failed, circuit open again");
                *phase = Phase::Open { since: Instant::now() };
            }
            _ => {}
        }
    }

    fn on_abandoned(&self) {
        if let Phase::HalfOpen { trial_in_flight, .. } = &mut *self.phase() {
            *trial_in_flight = false;
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("client", &self.client)
            .field("state", &self.state())
            .finish()
    }
}

/// Admission of one call; report its outcome with [`CallPermit::success`] or
/// [`CallPermit::failure`].
#[must_use = "an unsettled trial permit frees its slot without a verdict"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallPermit<'_> {
    /// `true` for the single call admitted while half-open.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.on_abandoned();
        }
    }
}
