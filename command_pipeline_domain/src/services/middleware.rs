// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Middleware Contract
//!
//! This module defines the `Middleware` trait implemented by every chain
//! participant, whether built-in (resilience, rate limiting, caching) or
//! user-defined.
//!
//! ## Execution Protocol
//!
//! A middleware receives the command, the shared execution context, and a
//! [`Next`] continuation for the rest of the chain. Under normal semantics
//! it may:
//!
//! 1. **Short-circuit**: return a result without calling `next` (declare
//!    [`Middleware::may_short_circuit`] to suppress the debug diagnostic);
//! 2. **Observe/transform**: call `next` once and inspect or rewrite the
//!    result;
//! 3. **Suppress/replace errors**: call `next` once and map the error.
//!
//! Calling `next` more than once is a contract breach and fails with a
//! pipeline violation, unless the middleware declares
//! [`Middleware::uses_unguarded_next`], in which case it polices its own
//! idempotence (retry does this).
//!
//! ## Scoped Middleware
//!
//! A middleware with a [`Middleware::scope`] tag activates only for
//! commands whose [`Command::scopes`](crate::services::Command::scopes)
//! include that tag. The check is a slice scan performed by the chain
//! before `execute` runs; out-of-scope middleware is skipped entirely and
//! does not count as having called `next` (the chain calls it on the
//! middleware's behalf).
//!
//! ## Ordering
//!
//! [`Middleware::priority`] positions the middleware in the chain; lower
//! runs earlier, ties keep registration order.

use async_trait::async_trait;

use crate::entities::ExecutionContext;
use crate::error::PipelineError;
use crate::pipeline::Next;
use crate::services::Command;
use crate::value_objects::MiddlewarePriority;

/// A composable pre/post-processor in a command's execution chain.
///
/// Implementations are shared (`Arc`) and must be safe to call
/// concurrently from many invocations at once; per-invocation state
/// belongs in the [`ExecutionContext`], not in the middleware.
#[async_trait]
pub trait Middleware<C: Command>: Send + Sync {
    /// Middleware name used in events and error payloads
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Chain position; lower runs earlier, ties keep insertion order
    fn priority(&self) -> MiddlewarePriority {
        MiddlewarePriority::CUSTOM
    }

    /// Scope tag limiting activation to commands carrying the same marker
    fn scope(&self) -> Option<&'static str> {
        None
    }

    /// Declares legitimate short-circuiting (suppresses the debug
    /// diagnostic when `next` is dropped uncalled)
    fn may_short_circuit(&self) -> bool {
        false
    }

    /// Opts out of the exactly-once next-guard for retry-style patterns.
    ///
    /// Unsafe middleware must self-police the continuation contract.
    fn uses_unguarded_next(&self) -> bool {
        false
    }

    /// Processes the command, optionally continuing the chain via `next`
    async fn execute(
        &self,
        command: C,
        context: &ExecutionContext,
        next: Next<'_, C>,
    ) -> Result<C::Output, PipelineError>;
}
