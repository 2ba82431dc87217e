// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Next Continuation & Guard
//!
//! This module implements the guarded continuation each middleware receives
//! and the chain-walking dispatch behind it.
//!
//! ## The Exactly-Once Contract
//!
//! Under normal semantics a middleware calls `next` **at most once**:
//!
//! - A second call fails with a pipeline violation (duplicate next call)
//!   **without re-entering the downstream chain**; the guard trips before
//!   any downstream work starts.
//! - Dropping `next` without calling it leaves the downstream chain
//!   uninvoked. In debug builds this emits a `pipeline.violation`
//!   diagnostic event unless the middleware declares the short-circuit
//!   capability.
//! - Retry-style middleware opts out via
//!   [`Middleware::uses_unguarded_next`] and polices its own idempotence.
//!
//! The guard is a thin wrapper over a single-shot atomic flag; there is no
//! locking on the continuation hot path.
//!
//! ## Cancellation
//!
//! Cancellation is cooperative and propagates structurally: dropping the
//! future returned by [`Next::run`] drops every pending downstream future
//! with it, so a cancelled outer task cancels downstream work at its next
//! suspension point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;

use crate::entities::ExecutionContext;
use crate::error::{PipelineError, ViolationKind};
use crate::events::{event_names, PipelineEvent};
use crate::services::{Command, CommandHandler, Middleware};

/// Guard policy derived from the middleware's declared capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GuardPolicy {
    /// Exactly-once enforcement (the default).
    Enforce,
    /// Middleware opted out; it may replay the continuation.
    Unguarded,
}

/// The continuation handed to a middleware.
///
/// Running it executes the remainder of the chain (every later middleware
/// and finally the handler) and yields the command's declared output.
/// The command value passed to [`Next::run`] may differ from the one the
/// middleware received (transformation is allowed); the output type may
/// not.
pub struct Next<'a, C: Command> {
    chain: &'a [Arc<dyn Middleware<C>>],
    handler: &'a dyn CommandHandler<C>,
    invoked: Arc<AtomicBool>,
    policy: GuardPolicy,
}

impl<'a, C: Command> Next<'a, C> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn Middleware<C>>],
        handler: &'a dyn CommandHandler<C>,
        policy: GuardPolicy,
    ) -> Self {
        Self {
            chain,
            handler,
            invoked: Arc::new(AtomicBool::new(false)),
            policy,
        }
    }

    /// Flag shared with the chain layer for drop diagnostics.
    pub(crate) fn invocation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.invoked)
    }

    /// Continues the chain with the (possibly transformed) command.
    ///
    /// # Errors
    ///
    /// Fails with `pipelineViolation.duplicateNextCall` when a guarded
    /// middleware runs the continuation a second time; downstream work is
    /// not re-entered in that case.
    pub async fn run(&self, command: C, context: &ExecutionContext) -> Result<C::Output, PipelineError> {
        let already_invoked = self.invoked.swap(true, Ordering::AcqRel);
        if already_invoked && self.policy == GuardPolicy::Enforce {
            return Err(PipelineError::PipelineViolation(ViolationKind::DuplicateNextCall));
        }
        dispatch(self.chain, self.handler, command, context).await
    }
}

impl<C: Command> std::fmt::Debug for Next<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.chain.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Walks the chain: runs the first in-scope middleware with a fresh guard,
/// or the handler when the chain is exhausted.
///
/// Out-of-scope middleware (scope tag absent from the command's markers)
/// is skipped entirely; the skip does not touch any guard.
pub(crate) fn dispatch<'a, C: Command>(
    chain: &'a [Arc<dyn Middleware<C>>],
    handler: &'a dyn CommandHandler<C>,
    command: C,
    context: &'a ExecutionContext,
) -> BoxFuture<'a, Result<C::Output, PipelineError>> {
    Box::pin(async move {
        let mut chain = chain;
        while let Some((middleware, rest)) = chain.split_first() {
            if let Some(tag) = middleware.scope() {
                if !command.scopes().contains(&tag) {
                    chain = rest;
                    continue;
                }
            }

            let policy = if middleware.uses_unguarded_next() {
                GuardPolicy::Unguarded
            } else {
                GuardPolicy::Enforce
            };
            let next = Next::new(rest, handler, policy);
            let invoked = next.invocation_flag();
            let name = middleware.name();

            context.emit(PipelineEvent::new(event_names::MIDDLEWARE_STARTED).with_property("middleware", name));
            let start = Instant::now();
            let result = middleware.execute(command, context, next).await;
            let duration_ms = start.elapsed().as_secs_f64() * 1_000.0;

            match &result {
                Ok(_) => context.emit(
                    PipelineEvent::new(event_names::MIDDLEWARE_COMPLETED)
                        .with_property("middleware", name)
                        .with_property("durationMs", duration_ms),
                ),
                Err(e) => context.emit(
                    PipelineEvent::new(event_names::MIDDLEWARE_FAILED)
                        .with_property("middleware", name)
                        .with_property("error", e.kind())
                        .with_property("durationMs", duration_ms),
                ),
            }

            #[cfg(debug_assertions)]
            if result.is_ok() && !invoked.load(Ordering::Acquire) && !middleware.may_short_circuit() {
                context.emit(
                    PipelineEvent::new(event_names::PIPELINE_VIOLATION)
                        .with_property("middleware", name)
                        .with_property("violation", "nextNotCalled"),
                );
            }
            #[cfg(not(debug_assertions))]
            let _ = invoked;

            return result;
        }

        handler.handle(command, context).await
    })
}
