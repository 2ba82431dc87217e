// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Pipeline Domain
//!
//! Pure domain layer for the command execution pipeline system: the
//! contracts, entities, value objects, events, and the pipeline execution
//! core. This crate contains no runtime dependency; infrastructure
//! concerns (back-pressure, resilience, rate limiting, caching) live in
//! the `command-pipeline` crate.
//!
//! ## Core Concepts
//!
//! ### Command
//! A typed request artifact with a statically-declared output type. The
//! pipeline preserves that type end-to-end: dispatching a `C` produces a
//! `C::Output`, never an erased value.
//!
//! ### Middleware
//! Composable pre/post-processors forming a chain ordered by priority.
//! Each middleware receives the command, the shared execution context,
//! and a guarded `next` continuation for the rest of the chain.
//!
//! ### Handler
//! The terminal processor. The standard pipeline guarantees the handler
//! is reached iff every in-scope middleware called `next`.
//!
//! ### Execution Context
//! A concurrency-safe, per-invocation state bag carrying the immutable
//! command metadata, a typed key/value map, an optional event emitter,
//! and an optional cooperative deadline. Parallel composition forks it;
//! child writes stay in the child unless explicitly merged.
//!
//! ## Architecture
//!
//! Following Domain-Driven Design and Clean Architecture principles:
//!
//! - **Entities**: `CommandMetadata`, `ExecutionContext`
//! - **Value Objects**: `CommandId`, `MiddlewarePriority`, `Fingerprint`,
//!   `Deadline`
//! - **Domain Services (contracts)**: `Command`, `CommandHandler`,
//!   `Middleware`
//! - **Events**: `PipelineEvent` and the stable event-name vocabulary
//! - **Execution Core**: `PipelineBuilder`, `StandardPipeline`, the
//!   composite pipelines, and the guarded `Next` continuation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use command_pipeline_domain::prelude::*;
//!
//! let pipeline = PipelineBuilder::new(handler)
//!     .with(auth_middleware)
//!     .with(validation_middleware)
//!     .build()?;
//!
//! let context = ExecutionContext::new(CommandMetadata::new());
//! let result = pipeline.execute(command, &context).await?;
//! ```

pub mod entities;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod services;
pub mod value_objects;

// Re-export the main types for convenient access
pub use entities::{CommandMetadata, ContextKey, ExecutionContext};
pub use error::{PipelineError, ViolationKind};
pub use events::{event_names, EventEmitter, NoopEventEmitter, PipelineEvent};
pub use pipeline::{
    ConditionalPipeline, ErrorHandlingPipeline, Next, ParallelPipeline, ParallelStrategy, Pipeline,
    PipelineBuilder, PipelineExt, SequentialPipeline, StandardPipeline,
};
pub use services::{Command, CommandHandler, Middleware};
pub use value_objects::{CommandId, Deadline, Fingerprint, MiddlewarePriority};

/// Library prelude bringing in the most used structures and traits
pub mod prelude {
    pub use crate::entities::{CommandMetadata, ContextKey, ExecutionContext};
    pub use crate::error::PipelineError;
    pub use crate::events::{event_names, EventEmitter, PipelineEvent};
    pub use crate::pipeline::{
        ParallelStrategy, Pipeline, PipelineBuilder, PipelineExt, StandardPipeline,
    };
    pub use crate::services::{Command, CommandHandler, Middleware};
    pub use crate::value_objects::{CommandId, Deadline, Fingerprint, MiddlewarePriority};
    pub use crate::Next;
}
