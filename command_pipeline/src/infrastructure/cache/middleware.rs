// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Caching Middleware
//!
//! Memoizes command results: each command is fingerprinted, the cache is
//! consulted, and on a miss the chain executes and its successful result
//! is stored under the fingerprint. Errors are never cached.
//!
//! At-most-one concurrent build per fingerprint is **not** guaranteed
//! here: two simultaneous misses for the same fingerprint both execute
//! the chain and both store (last write wins). Callers that need
//! single-flight deduplication layer it separately.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use command_pipeline_domain::entities::ExecutionContext;
use command_pipeline_domain::pipeline::Next;
use command_pipeline_domain::services::{Command, Middleware};
use command_pipeline_domain::value_objects::Fingerprint;
use command_pipeline_domain::{MiddlewarePriority, PipelineError};

use crate::infrastructure::cache::MemoryCache;

type FingerprintFn<C> = Arc<dyn Fn(&C) -> Fingerprint + Send + Sync>;

/// Middleware memoizing chain results by command fingerprint.
pub struct CachingMiddleware<C: Command> {
    cache: MemoryCache<Fingerprint, C::Output>,
    ttl: Duration,
    fingerprint: FingerprintFn<C>,
    priority: MiddlewarePriority,
    _command: PhantomData<fn() -> C>,
}

impl<C: Command> CachingMiddleware<C>
where
    C::Output: Clone,
{
    /// Binds a cache and a fingerprint function.
    ///
    /// The fingerprint must be deterministic over the command's cacheable
    /// content; see [`Fingerprint::compute`].
    pub fn new(
        cache: MemoryCache<Fingerprint, C::Output>,
        ttl: Duration,
        fingerprint: impl Fn(&C) -> Fingerprint + Send + Sync + 'static,
    ) -> Self {
        Self {
            cache,
            ttl,
            fingerprint: Arc::new(fingerprint),
            priority: MiddlewarePriority::PRE_PROCESSING,
            _command: PhantomData,
        }
    }

    /// Overrides the chain position
    pub fn with_priority(mut self, priority: MiddlewarePriority) -> Self {
        self.priority = priority;
        self
    }

    /// The underlying cache (for invalidation and inspection)
    pub fn cache(&self) -> &MemoryCache<Fingerprint, C::Output> {
        &self.cache
    }
}

#[async_trait]
impl<C: Command> Middleware<C> for CachingMiddleware<C>
where
    C::Output: Clone,
{
    fn name(&self) -> &'static str {
        "CachingMiddleware"
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
        let fingerprint = (self.fingerprint)(&command);

        if let Some(cached) = self.cache.get(&fingerprint) {
            return Ok(cached);
        }

        let output = next.run(command, context).await?;
        self.cache.put(fingerprint, output.clone(), self.ttl);
        Ok(output)
    }
}
