// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Circuit Breaker Middleware
//!
//! Fast-fail protection for a failing downstream: once failures cross a
//! threshold within the rolling window, the breaker opens and every call
//! short-circuits without invoking `next` until a cooldown elapses.
//!
//! ## State Machine
//!
//! ```text
//! closed --(failures >= threshold within window)--> open
//! open   --(cooldown elapsed)--------------------> half-open
//! half-open --(probe success)--------------------> closed
//! half-open --(probe failure)--------------------> open
//! ```
//!
//! In half-open, at most `half_open_max_probes` calls pass through
//! concurrently; admissions beyond that are rejected as if the breaker
//! were still open.
//!
//! ## Time Source
//!
//! The breaker reads `tokio::time::Instant`, so tests drive the cooldown
//! with paused time instead of wall-clock sleeps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use command_pipeline_domain::entities::ExecutionContext;
use command_pipeline_domain::events::{event_names, PipelineEvent};
use command_pipeline_domain::pipeline::Next;
use command_pipeline_domain::services::{Command, Middleware};
use command_pipeline_domain::{MiddlewarePriority, PipelineError};

/// Breaker position in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through; failures are counted.
    Closed,
    /// Calls short-circuit until the cooldown elapses.
    Open,
    /// A bounded number of probes test the downstream.
    HalfOpen,
}

/// Per-instance breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures within the window that trip the breaker open.
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted.
    pub failure_window: Duration,
    /// How long the breaker stays open before probing.
    pub cooldown: Duration,
    /// Concurrent probes admitted while half-open.
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(30),
            cooldown: Duration::from_secs(30),
            half_open_max_probes: 1,
        }
    }
}

impl CircuitBreakerConfig {
    fn validate(&self) -> Result<(), PipelineError> {
        if self.failure_threshold == 0 {
            return Err(PipelineError::invalid_config("failure_threshold must be non-zero"));
        }
        if self.half_open_max_probes == 0 {
            return Err(PipelineError::invalid_config("half_open_max_probes must be non-zero"));
        }
        Ok(())
    }
}

/// State transition observed during admit/record, reported so the
/// middleware can emit the matching `circuit.*` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Opened,
    HalfOpened,
    Closed,
}

impl Transition {
    fn event_name(self) -> &'static str {
        match self {
            Transition::Opened => event_names::CIRCUIT_OPENED,
            Transition::HalfOpened => event_names::CIRCUIT_HALF_OPEN,
            Transition::Closed => event_names::CIRCUIT_CLOSED,
        }
    }
}

struct BreakerState {
    state: CircuitState,
    failures: u32,
    window_started_at: Option<Instant>,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// Shared circuit-breaker state machine.
///
/// One instance guards one downstream resource; clones share state, so the
/// same breaker can wrap several pipelines over the same dependency.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
}

/// Outcome of a successful admission; handed back on completion.
#[derive(Debug)]
struct Admission {
    probe: bool,
}

impl CircuitBreaker {
    /// Creates a breaker from a validated configuration
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                window_started_at: None,
                last_failure_at: None,
                opened_at: None,
                half_open_in_flight: 0,
            })),
        })
    }

    /// Current state. Open transitions to half-open on the next admission
    /// after the cooldown, not on queries.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Instant of the most recent recorded failure
    pub fn last_failure_at(&self) -> Option<Instant> {
        self.state.lock().last_failure_at
    }

    fn try_admit(&self) -> Result<(Admission, Option<Transition>), PipelineError> {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed => Ok((Admission { probe: false }, None)),
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.cooldown {
                    state.state = CircuitState::HalfOpen;
                    state.half_open_in_flight = 1;
                    Ok((Admission { probe: true }, Some(Transition::HalfOpened)))
                } else {
                    Err(PipelineError::CircuitBreakerOpen {
                        reset_after: self.config.cooldown - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if state.half_open_in_flight < self.config.half_open_max_probes {
                    state.half_open_in_flight += 1;
                    Ok((Admission { probe: true }, None))
                } else {
                    Err(PipelineError::CircuitBreakerOpen {
                        reset_after: Duration::ZERO,
                    })
                }
            }
        }
    }

    fn record_success(&self, admission: Admission) -> Option<Transition> {
        let mut state = self.state.lock();
        if admission.probe && state.state == CircuitState::HalfOpen {
            state.state = CircuitState::Closed;
            state.failures = 0;
            state.window_started_at = None;
            state.half_open_in_flight = 0;
            return Some(Transition::Closed);
        }
        None
    }

    fn record_failure(&self, admission: Admission) -> Option<Transition> {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.last_failure_at = Some(now);

        if admission.probe {
            // A failed probe reopens immediately, restarting the cooldown.
            state.state = CircuitState::Open;
            state.opened_at = Some(now);
            state.half_open_in_flight = 0;
            return Some(Transition::Opened);
        }

        // Rolling window: failures older than the window start a new count.
        match state.window_started_at {
            Some(started) if started.elapsed() <= self.config.failure_window => {
                state.failures += 1;
            }
            _ => {
                state.window_started_at = Some(now);
                state.failures = 1;
            }
        }

        if state.failures >= self.config.failure_threshold {
            state.state = CircuitState::Open;
            state.opened_at = Some(now);
            return Some(Transition::Opened);
        }
        None
    }
}

/// Middleware wrapping a [`CircuitBreaker`] around the downstream chain.
pub struct CircuitBreakerMiddleware {
    breaker: CircuitBreaker,
    priority: MiddlewarePriority,
}

impl CircuitBreakerMiddleware {
    /// Wraps an existing breaker (shareable across pipelines)
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self {
            breaker,
            priority: MiddlewarePriority::CUSTOM,
        }
    }

    /// Creates a dedicated breaker from configuration
    pub fn from_config(config: CircuitBreakerConfig) -> Result<Self, PipelineError> {
        Ok(Self::new(CircuitBreaker::new(config)?))
    }

    /// Overrides the chain position
    pub fn with_priority(mut self, priority: MiddlewarePriority) -> Self {
        self.priority = priority;
        self
    }

    /// The underlying breaker
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn emit_transition(context: &ExecutionContext, transition: Option<Transition>) {
        if let Some(t) = transition {
            context.emit(PipelineEvent::new(t.event_name()));
        }
    }
}

#[async_trait]
impl<C: Command> Middleware<C> for CircuitBreakerMiddleware {
    fn name(&self) -> &'static str {
        "CircuitBreakerMiddleware"
    }

    fn priority(&self) -> MiddlewarePriority {
        self.priority
    }

    fn may_short_circuit(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        command: C,
        context: &ExecutionContext,
        next: Next<'_, C>,
    ) -> Result<C::Output, PipelineError> {
        let (admission, transition) = self.breaker.try_admit()?;
        Self::emit_transition(context, transition);

        match next.run(command, context).await {
            Ok(output) => {
                let transition = self.breaker.record_success(admission);
                Self::emit_transition(context, transition);
                Ok(output)
            }
            Err(e) => {
                let transition = self.breaker.record_failure(admission);
                Self::emit_transition(context, transition);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            failure_window: Duration::from_secs(60),
            cooldown,
            half_open_max_probes: 1,
        })
        .unwrap()
    }

    fn admit(b: &CircuitBreaker) -> Result<Admission, PipelineError> {
        b.try_admit().map(|(a, _)| a)
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(CircuitBreaker::new(config).is_err());
    }

    #[tokio::test]
    async fn test_closed_until_threshold() {
        let b = breaker(3, Duration::from_secs(2));
        for _ in 0..2 {
            let a = admit(&b).unwrap();
            b.record_failure(a);
        }
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(admit(&b).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_cools_down() {
        let b = breaker(3, Duration::from_secs(2));
        for _ in 0..3 {
            let a = admit(&b).unwrap();
            b.record_failure(a);
        }
        assert_eq!(b.state(), CircuitState::Open);

        // While open, admissions short-circuit.
        let err = admit(&b).unwrap_err();
        assert_eq!(err.kind(), "circuitBreakerOpen");

        // After the cooldown the first admission is a half-open probe.
        tokio::time::advance(Duration::from_secs(2)).await;
        let (probe, transition) = b.try_admit().unwrap();
        assert!(probe.probe);
        assert_eq!(transition, Some(Transition::HalfOpened));

        // Probe success closes the breaker.
        assert_eq!(b.record_success(probe), Some(Transition::Closed));
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens() {
        let b = breaker(1, Duration::from_secs(2));
        let a = admit(&b).unwrap();
        b.record_failure(a);
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(2)).await;
        let probe = admit(&b).unwrap();
        b.record_failure(probe);
        assert_eq!(b.state(), CircuitState::Open);

        // Cooldown restarts from the failed probe.
        let err = admit(&b).unwrap_err();
        assert_eq!(err.kind(), "circuitBreakerOpen");
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_bounds_concurrent_probes() {
        let b = breaker(1, Duration::from_secs(1));
        let a = admit(&b).unwrap();
        b.record_failure(a);

        tokio::time::advance(Duration::from_secs(1)).await;
        let _probe = admit(&b).unwrap();
        // Only one probe fits; the second concurrent admission is refused.
        assert!(admit(&b).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_window_expiry_resets_count() {
        let b = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            failure_window: Duration::from_secs(5),
            cooldown: Duration::from_secs(1),
            half_open_max_probes: 1,
        })
        .unwrap();

        let a = admit(&b).unwrap();
        b.record_failure(a);

        // Window expires before the second failure: counting restarts.
        tokio::time::advance(Duration::from_secs(6)).await;
        let a = admit(&b).unwrap();
        b.record_failure(a);
        assert_eq!(b.state(), CircuitState::Closed);
    }
}
