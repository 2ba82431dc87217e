// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib checked separately from tests - tests may use unwrap/expect)

//! # Command Pipeline
//!
//! A composable command execution pipeline built with Rust: a caller
//! issues a typed command, a priority-ordered chain of middleware
//! processes it (authentication, validation, rate limiting, caching,
//! retries, timeouts, observability), and a terminal handler produces a
//! typed result.
//!
//! ## Architecture Overview
//!
//! The system follows Clean Architecture and Domain-Driven Design
//! principles across two crates:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (CommandDispatcher, SecureDispatcher)                      │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Domain Layer (command-pipeline-domain)           │
//! │  (Contracts, Context, Events, Builder, Composition)         │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (Back-Pressure, Resilience, Rate Limiting, Cache,          │
//! │   Logging, Metrics, Configuration)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Concepts
//!
//! ### Pipelines
//! A pipeline carries a typed command to its typed result through a
//! deterministic middleware chain. Pipelines compose: sequentially
//! (`then`), concurrently (`parallel`, `race`), conditionally (`when`),
//! and around failure hooks (`catching`).
//!
//! ### Admission Control
//! The back-pressure semaphore bounds concurrency and queue memory with
//! four overflow strategies; the rate limiter meters identifiers through
//! token-bucket, sliding-window, or adaptive admission.
//!
//! ### Resilience
//! Circuit breaker, retry with backoff, timeout with budget inheritance,
//! and bulkhead isolation are ordinary middleware; stack them per
//! command type as the failure domain requires.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use command_pipeline::application::CommandDispatcher;
//! use command_pipeline::infrastructure::config::PipelineOptions;
//! use command_pipeline_domain::prelude::*;
//!
//! let dispatcher = CommandDispatcher::new(PipelineOptions::default())?;
//! dispatcher.register_builder(
//!     PipelineBuilder::new(handler)
//!         .with(rate_limit)
//!         .with(retry)
//!         .with(timeout),
//! )?;
//!
//! let result = dispatcher.dispatch(GetUser { id: 42 }).await?;
//! ```

pub mod application;
pub mod infrastructure;

// Re-export domain types so callers depend on one crate
pub use command_pipeline_domain::{
    event_names, Command, CommandHandler, CommandId, CommandMetadata, ContextKey, Deadline,
    EventEmitter, ExecutionContext, Fingerprint, Middleware, MiddlewarePriority, Next,
    ParallelStrategy, Pipeline, PipelineBuilder, PipelineError, PipelineEvent, PipelineExt,
    StandardPipeline,
};

pub use application::{CommandDispatcher, SecureDispatcher};
