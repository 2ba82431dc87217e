// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Timeout Middleware
//!
//! Races the downstream chain against a deadline. On expiry the chain's
//! future is dropped (cooperative cancellation at its next suspension
//! point) and the middleware fails with the expired budget.
//!
//! ## Budget Inheritance
//!
//! The effective budget is the **minimum** of this middleware's own budget
//! and whatever remains of the context deadline, and the middleware
//! installs the effective deadline back into the context before running
//! the chain. Nested timeout middleware therefore only ever shrink the
//! budget; an inner `500ms` request under an outer `100ms` deadline runs
//! with ~100ms.

use std::time::Duration;

use async_trait::async_trait;

use command_pipeline_domain::entities::ExecutionContext;
use command_pipeline_domain::events::{event_names, PipelineEvent};
use command_pipeline_domain::pipeline::Next;
use command_pipeline_domain::services::{Command, Middleware};
use command_pipeline_domain::value_objects::Deadline;
use command_pipeline_domain::{MiddlewarePriority, PipelineError};

/// Middleware bounding the downstream chain to a time budget.
pub struct TimeoutMiddleware {
    budget: Duration,
    priority: MiddlewarePriority,
}

impl TimeoutMiddleware {
    /// Creates a timeout middleware with the given budget.
    ///
    /// # Errors
    ///
    /// A zero budget fails with `invalidConfiguration`; it could never
    /// admit any work.
    pub fn new(budget: Duration) -> Result<Self, PipelineError> {
        if budget.is_zero() {
            return Err(PipelineError::invalid_config("timeout budget must be non-zero"));
        }
        Ok(Self {
            budget,
            priority: MiddlewarePriority::CUSTOM,
        })
    }

    /// Overrides the chain position
    pub fn with_priority(mut self, priority: MiddlewarePriority) -> Self {
        self.priority = priority;
        self
    }

    /// The configured (pre-inheritance) budget
    pub fn budget(&self) -> Duration {
        self.budget
    }
}

#[async_trait]
impl<C: Command> Middleware<C> for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "TimeoutMiddleware"
    }

    fn priority(&self) -> MiddlewarePriority {
        self.priority
    }

    async fn execute(
        &self,
        command: C,
        context: &ExecutionContext,
        next: Next<'_, C>,
    ) -> Result<C::Output, PipelineError> {
        let effective = match context.deadline() {
            Some(deadline) => self.budget.min(deadline.remaining()),
            None => self.budget,
        };
        if effective.is_zero() {
            context.emit(PipelineEvent::new(event_names::TIMEOUT_EXPIRED).with_property("budgetMs", 0));
            return Err(PipelineError::timeout(effective));
        }

        // Children inherit the effective (smaller) deadline.
        context.set_deadline(Deadline::after(effective));

        match tokio::time::timeout(effective, next.run(command, context)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                context.emit(
                    PipelineEvent::new(event_names::TIMEOUT_EXPIRED)
                        .with_property("budgetMs", effective.as_millis() as u64),
                );
                Err(PipelineError::timeout(effective))
            }
        }
    }
}
