// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retry Middleware
//!
//! Re-runs the downstream chain on retryable failures with a configurable
//! backoff policy.
//!
//! ## Retryability
//!
//! After each failure a classifier predicate decides whether another
//! attempt makes sense; non-retryable errors propagate immediately and
//! unwrapped. The default classifier is
//! [`PipelineError::is_recoverable`]: timeouts, back-pressure refusals,
//! and open breakers retry; validation and security failures never do.
//! Cancellation always aborts the loop.
//!
//! ## Backoff
//!
//! Fixed, linear, or capped-exponential delay between attempts, with
//! optional jitter (uniform in [0.5, 1.0] of the computed delay) to keep
//! synchronized callers from retrying in lockstep.
//!
//! ## Guard Opt-Out
//!
//! Retry legitimately runs `next` more than once, so it declares
//! `uses_unguarded_next` and keeps the contract itself: each attempt runs
//! the continuation to completion before the next starts.
//!
//! ## Boundary Behavior
//!
//! `max_attempts = 1` behaves identically to no retry middleware at all:
//! the error of the single attempt propagates as-is, never wrapped in
//! `retryExhausted`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use command_pipeline_domain::entities::ExecutionContext;
use command_pipeline_domain::events::{event_names, PipelineEvent};
use command_pipeline_domain::pipeline::Next;
use command_pipeline_domain::services::{Command, Middleware};
use command_pipeline_domain::{MiddlewarePriority, PipelineError};

/// Delay progression between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Same delay after every failure.
    Fixed(Duration),
    /// `base * failure_count`.
    Linear { base: Duration },
    /// `base * 2^(failure_count - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl BackoffPolicy {
    /// Delay after the `failure_count`-th consecutive failure (1-based)
    fn delay(&self, failure_count: u32) -> Duration {
        match *self {
            BackoffPolicy::Fixed(delay) => delay,
            BackoffPolicy::Linear { base } => base.saturating_mul(failure_count),
            BackoffPolicy::Exponential { base, max } => {
                let exp = failure_count.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << exp).min(max)
            }
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first. Must be non-zero.
    pub max_attempts: u32,
    /// Delay progression between attempts.
    pub policy: BackoffPolicy,
    /// Randomize each delay into [0.5, 1.0] of its computed value.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            policy: BackoffPolicy::Exponential {
                base: Duration::from_millis(100),
                max: Duration::from_secs(5),
            },
            jitter: true,
        }
    }
}

type Classifier = Arc<dyn Fn(&PipelineError) -> bool + Send + Sync>;

/// Middleware retrying the downstream chain on retryable failures.
pub struct RetryMiddleware {
    config: RetryConfig,
    classifier: Classifier,
    priority: MiddlewarePriority,
}

impl RetryMiddleware {
    /// Creates a retry middleware with the default recoverability
    /// classifier.
    ///
    /// # Errors
    ///
    /// Zero `max_attempts` fails with `invalidConfiguration`.
    pub fn new(config: RetryConfig) -> Result<Self, PipelineError> {
        if config.max_attempts == 0 {
            return Err(PipelineError::invalid_config("max_attempts must be non-zero"));
        }
        Ok(Self {
            config,
            classifier: Arc::new(PipelineError::is_recoverable),
            priority: MiddlewarePriority::CUSTOM,
        })
    }

    /// Replaces the retryability classifier
    pub fn with_classifier(mut self, classifier: impl Fn(&PipelineError) -> bool + Send + Sync + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Overrides the chain position
    pub fn with_priority(mut self, priority: MiddlewarePriority) -> Self {
        self.priority = priority;
        self
    }

    fn backoff_delay(&self, failure_count: u32) -> Duration {
        let delay = self.config.policy.delay(failure_count);
        if self.config.jitter && !delay.is_zero() {
            let factor: f64 = rand::rng().random_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }

    fn is_retryable(&self, error: &PipelineError) -> bool {
        if matches!(error, PipelineError::Cancelled(_)) {
            return false;
        }
        (self.classifier)(error)
    }
}

#[async_trait]
impl<C: Command> Middleware<C> for RetryMiddleware {
    fn name(&self) -> &'static str {
        "RetryMiddleware"
    }

    fn priority(&self) -> MiddlewarePriority {
        self.priority
    }

    fn uses_unguarded_next(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        command: C,
        context: &ExecutionContext,
        next: Next<'_, C>,
    ) -> Result<C::Output, PipelineError> {
        let max_attempts = self.config.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.backoff_delay(attempt - 1);
                context.emit(
                    PipelineEvent::new(event_names::RETRY_ATTEMPT)
                        .with_property("attempt", attempt)
                        .with_property("delayMs", delay.as_millis() as u64),
                );
                tokio::time::sleep(delay).await;
            }

            match next.run(command.clone(), context).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    // Non-retryable (including cancellation) propagates
                    // immediately and unwrapped.
                    if !self.is_retryable(&e) {
                        return Err(e);
                    }
                    if attempt < max_attempts {
                        last_error = Some(e);
                        continue;
                    }
                    // A single-attempt configuration behaves as if the
                    // middleware were absent.
                    if max_attempts == 1 {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| {
            PipelineError::internal_error("retry loop finished without recording an error")
        });
        context.emit(
            PipelineEvent::new(event_names::RETRY_EXHAUSTED)
                .with_property("attempts", max_attempts)
                .with_property("lastError", last_error.kind()),
        );
        Err(PipelineError::RetryExhausted {
            attempts: max_attempts,
            last_error: Box::new(last_error),
        })
    }
}
