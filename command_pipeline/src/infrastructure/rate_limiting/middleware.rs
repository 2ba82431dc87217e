// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Rate-Limiting Middleware
//!
//! Binds a [`RateLimiter`] into the chain: each command is charged against
//! an identifier derived from the invocation, and denials short-circuit
//! with `rateLimitExceeded` before any downstream work runs.
//!
//! The default identifier is the metadata's user id, falling back to a
//! single shared bucket for anonymous callers; supply an extractor to key
//! on anything the command or context carries.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use command_pipeline_domain::entities::ExecutionContext;
use command_pipeline_domain::events::{event_names, PipelineEvent};
use command_pipeline_domain::pipeline::Next;
use command_pipeline_domain::services::{Command, Middleware};
use command_pipeline_domain::{MiddlewarePriority, PipelineError};

use crate::infrastructure::rate_limiting::RateLimiter;

/// Identifier for callers with no user id in their metadata.
const ANONYMOUS_IDENTIFIER: &str = "anonymous";

type Extractor<C> = Arc<dyn Fn(&C, &ExecutionContext) -> String + Send + Sync>;

/// Middleware charging commands against a shared [`RateLimiter`].
pub struct RateLimitingMiddleware<C: Command> {
    limiter: RateLimiter,
    cost: u32,
    extractor: Option<Extractor<C>>,
    priority: MiddlewarePriority,
    _command: PhantomData<fn() -> C>,
}

impl<C: Command> RateLimitingMiddleware<C> {
    /// Binds a limiter with unit cost per command
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            limiter,
            cost: 1,
            extractor: None,
            priority: MiddlewarePriority::PRE_PROCESSING,
            _command: PhantomData,
        }
    }

    /// Sets the token cost charged per command
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Supplies a custom identifier extractor
    pub fn with_identifier(mut self, extractor: impl Fn(&C, &ExecutionContext) -> String + Send + Sync + 'static) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Overrides the chain position
    pub fn with_priority(mut self, priority: MiddlewarePriority) -> Self {
        self.priority = priority;
        self
    }

    fn identifier(&self, command: &C, context: &ExecutionContext) -> String {
        match &self.extractor {
            Some(extract) => extract(command, context),
            None => context
                .metadata()
                .user_id()
                .unwrap_or(ANONYMOUS_IDENTIFIER)
                .to_string(),
        }
    }
}

#[async_trait]
impl<C: Command> Middleware<C> for RateLimitingMiddleware<C> {
    fn name(&self) -> &'static str {
        "RateLimitingMiddleware"
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
        let identifier = self.identifier(&command, context);
        if let Err(denied) = self.limiter.check(&identifier, self.cost) {
            context.emit(
                PipelineEvent::new(event_names::RATE_LIMIT_EXCEEDED)
                    .with_property("identifier", identifier)
                    .with_property("cost", self.cost),
            );
            return Err(denied);
        }
        next.run(command, context).await
    }
}
