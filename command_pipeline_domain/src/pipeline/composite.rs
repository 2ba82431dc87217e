// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Composite Pipelines & Operators
//!
//! Four first-class composition modes over [`Pipeline`] values:
//!
//! - **Sequential** ([`SequentialPipeline`]): run A, then B on the same
//!   context. A command with the chain-transform capability feeds A's
//!   result into the command B receives; without it, B re-runs the
//!   original command.
//! - **Parallel** ([`ParallelPipeline`]): run both branches concurrently,
//!   each on a **forked** context, combined per [`ParallelStrategy`].
//! - **Conditional** ([`ConditionalPipeline`]): predicate true → inner
//!   pipeline; otherwise the default factory, then the command's fallback
//!   capability, then `conditionNotMet`.
//! - **Error-handling** ([`ErrorHandlingPipeline`]): failures pass through
//!   an observer hook and re-raise; the hook's own error replaces the
//!   original.
//!
//! Composition semantics are exposed as named methods rather than custom
//! operators: [`PipelineExt`] provides `then`, `parallel`, `race`, `when`,
//! and `catching` sugar over the concrete constructors.
//!
//! ## Concurrency Model
//!
//! Parallel branches run as two futures polled concurrently inside the
//! caller's task; no task is spawned. Cancellation is therefore
//! structural: dropping a losing branch cancels its pending work at the
//! next suspension point, and branch context writes never reach the parent
//! (property: forked-context isolation).

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{select, Either};

use crate::entities::ExecutionContext;
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::services::Command;

/// How a [`ParallelPipeline`] combines its two branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelStrategy {
    /// Return whatever finishes first, success or error; cancel the loser.
    FirstCompleted,
    /// Await both; return the last successful result. Errors propagate
    /// only when every branch fails.
    AllCompleted,
    /// Return the first success and cancel the loser; if both branches
    /// fail, surface `allPipelinesFailed` carrying the errors in
    /// completion order.
    Race,
}

/// Runs two pipelines one after the other on the same context.
pub struct SequentialPipeline<C: Command> {
    first: Arc<dyn Pipeline<C>>,
    second: Arc<dyn Pipeline<C>>,
}

impl<C: Command> SequentialPipeline<C> {
    /// Composes `first` then `second`
    pub fn new(first: Arc<dyn Pipeline<C>>, second: Arc<dyn Pipeline<C>>) -> Self {
        Self { first, second }
    }
}

#[async_trait]
impl<C: Command> Pipeline<C> for SequentialPipeline<C> {
    async fn execute(&self, command: C, context: &ExecutionContext) -> Result<C::Output, PipelineError> {
        let first_result = self.first.execute(command.clone(), context).await?;
        let next_command = command.chain_transform(&first_result).unwrap_or(command);
        self.second.execute(next_command, context).await
    }
}

/// Runs two pipelines concurrently on forked contexts.
pub struct ParallelPipeline<C: Command> {
    first: Arc<dyn Pipeline<C>>,
    second: Arc<dyn Pipeline<C>>,
    strategy: ParallelStrategy,
}

impl<C: Command> ParallelPipeline<C> {
    /// Composes two branches under the given strategy
    pub fn new(
        first: Arc<dyn Pipeline<C>>,
        second: Arc<dyn Pipeline<C>>,
        strategy: ParallelStrategy,
    ) -> Self {
        Self {
            first,
            second,
            strategy,
        }
    }
}

#[async_trait]
impl<C: Command> Pipeline<C> for ParallelPipeline<C> {
    async fn execute(&self, command: C, context: &ExecutionContext) -> Result<C::Output, PipelineError> {
        // Each branch gets its own fork: branch writes never reach the
        // parent unless the caller merges them explicitly.
        let ctx_a = context.fork();
        let ctx_b = context.fork();

        let fut_a = self.first.execute(command.clone(), &ctx_a);
        let fut_b = self.second.execute(command, &ctx_b);

        match self.strategy {
            ParallelStrategy::FirstCompleted => match select(fut_a, fut_b).await {
                Either::Left((result, _loser)) => result,
                Either::Right((result, _loser)) => result,
            },
            ParallelStrategy::AllCompleted => {
                let (first_done, last_done) = match select(fut_a, fut_b).await {
                    Either::Left((first, rest)) => (first, rest.await),
                    Either::Right((first, rest)) => (first, rest.await),
                };
                match (first_done, last_done) {
                    (_, Ok(value)) => Ok(value),
                    (Ok(value), Err(_)) => Ok(value),
                    (Err(e1), Err(e2)) => Err(PipelineError::AllPipelinesFailed(vec![e1, e2])),
                }
            }
            ParallelStrategy::Race => match select(fut_a, fut_b).await {
                Either::Left((Ok(value), _loser)) => Ok(value),
                Either::Right((Ok(value), _loser)) => Ok(value),
                Either::Left((Err(first), rest)) => match rest.await {
                    Ok(value) => Ok(value),
                    Err(second) => Err(PipelineError::AllPipelinesFailed(vec![first, second])),
                },
                Either::Right((Err(first), rest)) => match rest.await {
                    Ok(value) => Ok(value),
                    Err(second) => Err(PipelineError::AllPipelinesFailed(vec![first, second])),
                },
            },
        }
    }
}

/// Gates an inner pipeline behind a predicate.
pub struct ConditionalPipeline<C: Command> {
    inner: Arc<dyn Pipeline<C>>,
    predicate: Arc<dyn Fn(&C, &ExecutionContext) -> bool + Send + Sync>,
    default_factory: Option<Arc<dyn Fn(&C) -> C::Output + Send + Sync>>,
}

impl<C: Command> ConditionalPipeline<C> {
    /// Gates `inner` behind `predicate`; a false predicate falls back to
    /// the command's own default-result capability (or fails)
    pub fn new(
        inner: Arc<dyn Pipeline<C>>,
        predicate: impl Fn(&C, &ExecutionContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            predicate: Arc::new(predicate),
            default_factory: None,
        }
    }

    /// Supplies an explicit default-result factory for the false branch
    pub fn with_default(mut self, factory: impl Fn(&C) -> C::Output + Send + Sync + 'static) -> Self {
        self.default_factory = Some(Arc::new(factory));
        self
    }
}

#[async_trait]
impl<C: Command> Pipeline<C> for ConditionalPipeline<C> {
    async fn execute(&self, command: C, context: &ExecutionContext) -> Result<C::Output, PipelineError> {
        if (self.predicate)(&command, context) {
            return self.inner.execute(command, context).await;
        }
        if let Some(factory) = &self.default_factory {
            return Ok(factory(&command));
        }
        if let Some(fallback) = command.fallback_output() {
            return Ok(fallback);
        }
        Err(PipelineError::condition_not_met(format!(
            "predicate rejected '{}' and no default result is available",
            command.name()
        )))
    }
}

/// Observes failures of an inner pipeline without swallowing them.
pub struct ErrorHandlingPipeline<C: Command> {
    inner: Arc<dyn Pipeline<C>>,
    hook: Arc<dyn Fn(&PipelineError) -> Result<(), PipelineError> + Send + Sync>,
}

impl<C: Command> ErrorHandlingPipeline<C> {
    /// Wraps `inner`; `hook` runs on every failure for side effects.
    ///
    /// The hook cannot swallow the error: returning `Ok(())` re-raises
    /// the original; returning `Err` replaces it.
    pub fn new(
        inner: Arc<dyn Pipeline<C>>,
        hook: impl Fn(&PipelineError) -> Result<(), PipelineError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            hook: Arc::new(hook),
        }
    }
}

#[async_trait]
impl<C: Command> Pipeline<C> for ErrorHandlingPipeline<C> {
    async fn execute(&self, command: C, context: &ExecutionContext) -> Result<C::Output, PipelineError> {
        match self.inner.execute(command, context).await {
            Ok(value) => Ok(value),
            Err(original) => match (self.hook)(&original) {
                Ok(()) => Err(original),
                Err(replacement) => Err(replacement),
            },
        }
    }
}

/// Named composition operators available on every pipeline.
///
/// Methods consume `self` and wrap it in the corresponding composite;
/// chains read left-to-right:
///
/// ```rust,ignore
/// let pipeline = primary.race(replica).catching(|e| { log(e); Ok(()) });
/// ```
pub trait PipelineExt<C: Command>: Pipeline<C> + Sized + 'static {
    /// Sequential composition: `self`, then `second`
    fn then(self, second: impl Pipeline<C> + 'static) -> SequentialPipeline<C> {
        SequentialPipeline::new(Arc::new(self), Arc::new(second))
    }

    /// Parallel composition under an explicit strategy
    fn parallel(self, other: impl Pipeline<C> + 'static, strategy: ParallelStrategy) -> ParallelPipeline<C> {
        ParallelPipeline::new(Arc::new(self), Arc::new(other), strategy)
    }

    /// Parallel composition racing for the first success
    fn race(self, other: impl Pipeline<C> + 'static) -> ParallelPipeline<C> {
        self.parallel(other, ParallelStrategy::Race)
    }

    /// Conditional composition behind a predicate
    fn when(self, predicate: impl Fn(&C, &ExecutionContext) -> bool + Send + Sync + 'static) -> ConditionalPipeline<C> {
        ConditionalPipeline::new(Arc::new(self), predicate)
    }

    /// Error-handling composition around a failure hook
    fn catching(
        self,
        hook: impl Fn(&PipelineError) -> Result<(), PipelineError> + Send + Sync + 'static,
    ) -> ErrorHandlingPipeline<C> {
        ErrorHandlingPipeline::new(Arc::new(self), hook)
    }
}

impl<C: Command, P: Pipeline<C> + Sized + 'static> PipelineExt<C> for P {}
