// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Handler Contract
//!
//! The terminal step of every pipeline: once the middleware chain has let a
//! command through, exactly one handler produces its typed result. The
//! standard pipeline guarantees the handler is reached **iff** every
//! middleware called `next`.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::entities::ExecutionContext;
use crate::error::PipelineError;
use crate::services::Command;

/// Terminal processor for a command type.
///
/// Handlers are polymorphic over the command they accept and may suspend at
/// I/O. They receive the execution context read-mostly; writing results
/// into the context is allowed but the returned value is the result of
/// record.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    /// Processes the command and produces its declared output
    async fn handle(&self, command: C, context: &ExecutionContext) -> Result<C::Output, PipelineError>;
}

/// Handler over a plain async closure.
///
/// Lets tests and small call sites register a handler without a named
/// type: any `Fn(C) -> Future<Output = Result<C::Output, PipelineError>>`
/// wrapped in [`FnHandler`] becomes a [`CommandHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut> {
    /// Wraps an async closure as a handler
    pub fn new(f: F) -> Self {
        Self {
            f,
            _future: PhantomData,
        }
    }
}

#[async_trait]
impl<C, F, Fut> CommandHandler<C> for FnHandler<F, Fut>
where
    C: Command,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<C::Output, PipelineError>> + Send,
{
    async fn handle(&self, command: C, _context: &ExecutionContext) -> Result<C::Output, PipelineError> {
        (self.f)(command).await
    }
}
