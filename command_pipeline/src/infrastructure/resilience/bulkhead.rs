// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bulkhead Middleware
//!
//! Isolates a named resource behind its own back-pressure semaphore so one
//! saturated dependency cannot drain the whole system's concurrency. Each
//! call acquires a token before `next` runs; the token is an RAII credit,
//! so every exit path (success, error, or cancellation) releases the slot.
//!
//! Semaphore refusals surface with their back-pressure error kinds
//! (`backPressure.rejected` / `preempted` / `exhausted`); the emitted
//! `middleware.failed` event names this bulkhead, which keeps per-resource
//! rejection dashboards straightforward.

use async_trait::async_trait;

use command_pipeline_domain::entities::ExecutionContext;
use command_pipeline_domain::pipeline::Next;
use command_pipeline_domain::services::{Command, Middleware};
use command_pipeline_domain::{MiddlewarePriority, PipelineError};

use crate::infrastructure::runtime::{BackPressureConfig, BackPressureSemaphore, BackPressureSnapshot};

/// Middleware gating the chain behind a named resource's semaphore.
pub struct BulkheadMiddleware {
    resource: &'static str,
    semaphore: BackPressureSemaphore,
    priority: MiddlewarePriority,
}

impl BulkheadMiddleware {
    /// Associates an existing semaphore with a named resource
    pub fn new(resource: &'static str, semaphore: BackPressureSemaphore) -> Self {
        Self {
            resource,
            semaphore,
            priority: MiddlewarePriority::CUSTOM,
        }
    }

    /// Creates a dedicated semaphore for the resource
    pub fn from_config(resource: &'static str, config: BackPressureConfig) -> Result<Self, PipelineError> {
        Ok(Self::new(resource, BackPressureSemaphore::new(config)?))
    }

    /// Overrides the chain position
    pub fn with_priority(mut self, priority: MiddlewarePriority) -> Self {
        self.priority = priority;
        self
    }

    /// The guarded resource name
    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// Usage snapshot of the underlying semaphore
    pub fn snapshot(&self) -> BackPressureSnapshot {
        self.semaphore.snapshot()
    }
}

#[async_trait]
impl<C: Command> Middleware<C> for BulkheadMiddleware {
    fn name(&self) -> &'static str {
        "BulkheadMiddleware"
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
        let token = self.semaphore.acquire(0).await?;
        let result = next.run(command, context).await;
        token.release();
        result
    }
}
