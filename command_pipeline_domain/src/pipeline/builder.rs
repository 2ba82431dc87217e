// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Builder
//!
//! Assembles a [`StandardPipeline`] from a handler and a set of middleware.
//!
//! ## Algorithm
//!
//! 1. Collect middleware in registration order.
//! 2. **Stable-sort** by priority ascending; equal priorities keep their
//!    insertion order, which is what makes chain layout deterministic when
//!    several middleware share the default `CUSTOM` slot.
//! 3. Fold the handler in as the innermost step; each middleware wraps the
//!    chain built so far (the fold itself happens lazily at dispatch, over
//!    the sorted vector).
//!
//! ## Edge Cases
//!
//! - An empty middleware set builds a pipeline that calls the handler
//!   directly.
//! - Duplicate middleware **instances** are permitted (the same `Arc`
//!   registered twice runs twice); removal compares by `Arc` identity, not
//!   by type, so removing one registration leaves the other in place.
//! - Chains longer than the configured depth cap fail the build with
//!   `maxDepthExceeded`.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::pipeline::StandardPipeline;
use crate::services::{Command, CommandHandler, Middleware};

/// Default middleware depth cap; generous, but bounded so a buggy
/// registration loop fails the build instead of the first dispatch.
pub const DEFAULT_MAX_MIDDLEWARE_DEPTH: usize = 100;

/// Builder producing ready-to-execute [`StandardPipeline`] values.
pub struct PipelineBuilder<C: Command> {
    handler: Arc<dyn CommandHandler<C>>,
    middleware: Vec<Arc<dyn Middleware<C>>>,
    max_depth: usize,
}

impl<C: Command> PipelineBuilder<C> {
    /// Starts a builder around the terminal handler
    pub fn new(handler: Arc<dyn CommandHandler<C>>) -> Self {
        Self {
            handler,
            middleware: Vec::new(),
            max_depth: DEFAULT_MAX_MIDDLEWARE_DEPTH,
        }
    }

    /// Registers a middleware (builder style)
    pub fn with(mut self, middleware: Arc<dyn Middleware<C>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers several middleware, preserving their order
    pub fn with_all(mut self, middleware: impl IntoIterator<Item = Arc<dyn Middleware<C>>>) -> Self {
        self.middleware.extend(middleware);
        self
    }

    /// Removes a previously registered middleware by instance identity.
    ///
    /// Comparison is `Arc::ptr_eq`: only the exact registration is
    /// removed, never another instance of the same type.
    pub fn remove(mut self, target: &Arc<dyn Middleware<C>>) -> Self {
        self.middleware.retain(|m| !Arc::ptr_eq(m, target));
        self
    }

    /// Overrides the middleware depth cap
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Number of middleware currently registered
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Checks whether no middleware is registered
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Sorts the chain and produces the pipeline.
    ///
    /// # Errors
    ///
    /// Fails with `maxDepthExceeded` when more middleware is registered
    /// than the depth cap allows.
    pub fn build(self) -> Result<StandardPipeline<C>, PipelineError> {
        if self.middleware.len() > self.max_depth {
            return Err(PipelineError::MaxDepthExceeded {
                depth: self.middleware.len(),
                max: self.max_depth,
            });
        }

        let mut middleware = self.middleware;
        // Vec::sort_by_key is stable: equal priorities keep insertion order.
        middleware.sort_by_key(|m| m.priority());

        Ok(StandardPipeline::from_parts(self.handler, middleware))
    }
}
