// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Standard Pipeline
//!
//! Dispatches one command through the sorted middleware chain to its
//! handler.
//!
//! ## Execution Contract
//!
//! - Verifies that the context's metadata matches the command's bound
//!   metadata, when the command declares the binding capability.
//! - Emits `command.started` before the chain runs.
//! - On success emits `command.completed` with the invocation duration.
//! - On failure emits `command.failed` with the error kind and duration,
//!   then re-raises: the pipeline observes failures, it never swallows
//!   them.
//! - The handler is reached **iff** every in-scope middleware called
//!   `next`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::entities::ExecutionContext;
use crate::error::PipelineError;
use crate::events::{event_names, PipelineEvent};
use crate::pipeline::next::dispatch;
use crate::pipeline::Pipeline;
use crate::services::{Command, CommandHandler, Middleware};

/// Handler plus priority-sorted middleware, ready to execute.
///
/// Construction goes through
/// [`PipelineBuilder`](crate::pipeline::PipelineBuilder), which owns the
/// sorting and depth validation; the pipeline itself is immutable and
/// freely shareable across invocations.
pub struct StandardPipeline<C: Command> {
    handler: Arc<dyn CommandHandler<C>>,
    middleware: Vec<Arc<dyn Middleware<C>>>,
}

impl<C: Command> std::fmt::Debug for StandardPipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardPipeline")
            .field("middleware_count", &self.middleware.len())
            .finish()
    }
}

impl<C: Command> StandardPipeline<C> {
    pub(crate) fn from_parts(
        handler: Arc<dyn CommandHandler<C>>,
        middleware: Vec<Arc<dyn Middleware<C>>>,
    ) -> Self {
        Self { handler, middleware }
    }

    /// The sorted middleware chain (earliest first)
    pub fn middleware(&self) -> &[Arc<dyn Middleware<C>>] {
        &self.middleware
    }
}

#[async_trait]
impl<C: Command> Pipeline<C> for StandardPipeline<C> {
    async fn execute(&self, command: C, context: &ExecutionContext) -> Result<C::Output, PipelineError> {
        if let Some(bound) = command.bound_metadata_id() {
            if bound != context.metadata().id() {
                return Err(PipelineError::execution_failed(format!(
                    "command '{}' is bound to invocation {} but was dispatched with {}",
                    command.name(),
                    bound,
                    context.metadata().id()
                )));
            }
        }

        let name = command.name();
        context.emit(PipelineEvent::new(event_names::COMMAND_STARTED).with_property("command", name));

        let start = Instant::now();
        let result = dispatch(&self.middleware, self.handler.as_ref(), command, context).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1_000.0;

        match &result {
            Ok(_) => context.emit(
                PipelineEvent::new(event_names::COMMAND_COMPLETED)
                    .with_property("command", name)
                    .with_property("durationMs", duration_ms),
            ),
            Err(e) => context.emit(
                PipelineEvent::new(event_names::COMMAND_FAILED)
                    .with_property("command", name)
                    .with_property("error", e.kind())
                    .with_property("durationMs", duration_ms),
            ),
        }

        result
    }
}
