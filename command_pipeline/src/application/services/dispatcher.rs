// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Dispatcher
//!
//! The application-layer orchestration service: callers hand it a command,
//! it finds the registered pipeline for the command's type, mints the
//! invocation metadata, builds the execution context, applies admission
//! control, executes, and records metrics.
//!
//! ## Registry
//!
//! Pipelines register per command **type**; dispatching a command type
//! with no registration fails with `handlerNotFound`. Registration is
//! type-erased internally (`TypeId` → pipeline) but the dispatch surface
//! stays fully typed: `dispatch::<C>` returns `C::Output`.
//!
//! ## Admission
//!
//! Every dispatch acquires a back-pressure token per the configured
//! [`PipelineOptions`] before the pipeline runs, and holds it until the
//! result propagates. Refusals surface as `backPressure.*` errors without
//! touching the pipeline.
//!
//! ## Secure Wrapper
//!
//! [`SecureDispatcher`] layers the command's validation and sanitization
//! capabilities in front of dispatch and maps every failure through
//! [`PipelineError::public_message`], so callers across a trust boundary
//! never see internal detail.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::debug;

use command_pipeline_domain::entities::{CommandMetadata, ExecutionContext};
use command_pipeline_domain::events::EventEmitter;
use command_pipeline_domain::pipeline::{Pipeline, PipelineBuilder};
use command_pipeline_domain::services::{Command, CommandHandler};
use command_pipeline_domain::PipelineError;

use crate::infrastructure::config::PipelineOptions;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::runtime::BackPressureSemaphore;

/// Application service routing commands to their registered pipelines.
pub struct CommandDispatcher {
    options: PipelineOptions,
    pipelines: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    semaphore: BackPressureSemaphore,
    emitter: Option<Arc<dyn EventEmitter>>,
    metrics: Option<MetricsService>,
}

impl CommandDispatcher {
    /// Creates a dispatcher from validated options.
    ///
    /// # Errors
    ///
    /// Propagates option validation failures (zero concurrency, inverted
    /// caps).
    pub fn new(options: PipelineOptions) -> Result<Self, PipelineError> {
        options.validate()?;
        let semaphore = BackPressureSemaphore::new(options.back_pressure_config())?;
        Ok(Self {
            options,
            pipelines: RwLock::new(HashMap::new()),
            semaphore,
            emitter: None,
            metrics: None,
        })
    }

    /// Binds an event emitter shared by every dispatched context
    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Binds a metrics service
    pub fn with_metrics(mut self, metrics: MetricsService) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The options this dispatcher runs under
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// The admission semaphore (for snapshots)
    pub fn semaphore(&self) -> &BackPressureSemaphore {
        &self.semaphore
    }

    /// Registers a pipeline for command type `C`, replacing any previous
    /// registration
    pub fn register<C: Command>(&self, pipeline: Arc<dyn Pipeline<C>>) {
        debug!(command = std::any::type_name::<C>(), "registered pipeline");
        self.pipelines.write().insert(TypeId::of::<C>(), Box::new(pipeline));
    }

    /// Registers a bare handler for `C` (no middleware)
    pub fn register_handler<C: Command>(&self, handler: Arc<dyn CommandHandler<C>>) -> Result<(), PipelineError> {
        let pipeline = PipelineBuilder::new(handler)
            .with_max_depth(self.options.max_middleware_depth)
            .build()?;
        self.register::<C>(Arc::new(pipeline));
        Ok(())
    }

    /// Builds and registers a pipeline under this dispatcher's depth cap
    pub fn register_builder<C: Command>(&self, builder: PipelineBuilder<C>) -> Result<(), PipelineError> {
        let pipeline = builder.with_max_depth(self.options.max_middleware_depth).build()?;
        self.register::<C>(Arc::new(pipeline));
        Ok(())
    }

    /// The registered pipeline for `C`, if any
    pub fn pipeline_for<C: Command>(&self) -> Option<Arc<dyn Pipeline<C>>> {
        self.pipelines
            .read()
            .get(&TypeId::of::<C>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<dyn Pipeline<C>>>())
            .cloned()
    }

    /// Dispatches a command with freshly minted metadata
    pub async fn dispatch<C: Command>(&self, command: C) -> Result<C::Output, PipelineError> {
        self.dispatch_with_metadata(command, CommandMetadata::new()).await
    }

    /// Dispatches a command under caller-supplied metadata (correlation
    /// ids, user identity, source labels).
    ///
    /// # Errors
    ///
    /// - `handlerNotFound` when no pipeline is registered for `C`
    /// - `backPressure.*` when admission is refused
    /// - whatever the pipeline itself surfaces
    pub async fn dispatch_with_metadata<C: Command>(
        &self,
        command: C,
        metadata: CommandMetadata,
    ) -> Result<C::Output, PipelineError> {
        let pipeline = self
            .pipeline_for::<C>()
            .ok_or_else(|| PipelineError::handler_not_found(command.name()))?;

        let token = match self.semaphore.acquire(0).await {
            Ok(token) => token,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_back_pressure_rejection();
                }
                return Err(e);
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch();
        }

        let context = match &self.emitter {
            Some(emitter) => ExecutionContext::with_emitter(metadata, Arc::clone(emitter)),
            None => ExecutionContext::new(metadata),
        };

        let start = Instant::now();
        let result = pipeline.execute(command, &context).await;
        context.dispose();

        if let Some(metrics) = &self.metrics {
            metrics.record_completion(start.elapsed().as_secs_f64(), result.is_err());
        }
        token.release();
        result
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("options", &self.options)
            .field("registered", &self.pipelines.read().len())
            .finish()
    }
}

/// Rebuilds an error with caller-safe text, preserving its kind where the
/// payload is structural and scrubbing it where it is free-form.
fn sanitize_error(error: PipelineError) -> PipelineError {
    match error {
        // Structured payloads carry retry hints, not internal detail.
        e @ PipelineError::RateLimitExceeded { .. }
        | e @ PipelineError::CircuitBreakerOpen { .. }
        | e @ PipelineError::TimeoutError(_)
        | e @ PipelineError::BackPressureRejected
        | e @ PipelineError::BackPressurePreempted
        | e @ PipelineError::BackPressureExhausted
        | e @ PipelineError::MaxDepthExceeded { .. }
        | e @ PipelineError::PipelineViolation(_) => e,

        // Validation messages are written for callers.
        e @ PipelineError::ValidationError(_) => e,

        // Everything else gets its free-form payload replaced.
        other => {
            let public = other.public_message();
            match other {
                PipelineError::HandlerNotFound(_) => PipelineError::HandlerNotFound(public),
                PipelineError::AuthenticationError(_) => PipelineError::AuthenticationError(public),
                PipelineError::AuthorizationError(_) => PipelineError::AuthorizationError(public),
                PipelineError::Cancelled(_) => PipelineError::Cancelled(public),
                PipelineError::ConditionNotMet(_) => PipelineError::ConditionNotMet(public),
                _ => PipelineError::ExecutionFailed(public),
            }
        }
    }
}

/// Dispatcher wrapper enforcing command hygiene at a trust boundary.
///
/// Runs the command's validation hook, executes the sanitized copy, and
/// scrubs internal detail from every error before it reaches the caller.
pub struct SecureDispatcher {
    inner: Arc<CommandDispatcher>,
}

impl SecureDispatcher {
    /// Wraps a dispatcher
    pub fn new(inner: Arc<CommandDispatcher>) -> Self {
        Self { inner }
    }

    /// The wrapped dispatcher
    pub fn inner(&self) -> &Arc<CommandDispatcher> {
        &self.inner
    }

    /// Validates, sanitizes, dispatches, and scrubs errors
    pub async fn dispatch<C: Command>(&self, command: C) -> Result<C::Output, PipelineError> {
        command.validate()?;
        let command = command.sanitized();
        self.inner.dispatch(command).await.map_err(sanitize_error)
    }

    /// Same as [`SecureDispatcher::dispatch`] under caller-supplied
    /// metadata
    pub async fn dispatch_with_metadata<C: Command>(
        &self,
        command: C,
        metadata: CommandMetadata,
    ) -> Result<C::Output, PipelineError> {
        command.validate()?;
        let command = command.sanitized();
        self.inner
            .dispatch_with_metadata(command, metadata)
            .await
            .map_err(sanitize_error)
    }
}
