// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Execution Core
//!
//! The pipeline abstractions and their composition algebra:
//!
//! - [`Pipeline`]: the opaque executor contract (a typed command in, its
//!   declared output out)
//! - [`Next`]: the guarded continuation each middleware receives
//! - [`PipelineBuilder`]: priority-sorts middleware and folds the handler
//!   into a chain
//! - [`StandardPipeline`]: dispatches one command through the built chain
//! - Composite pipelines: sequential, parallel, conditional, and
//!   error-handling composition, plus the [`PipelineExt`] operator sugar
//!   (`then`, `race`, `parallel`, `when`, `catching`)
//!
//! Composition never erases the command's output type: every combinator
//! takes and returns `Pipeline<C>` values for the same `C`.

pub mod builder;
pub mod composite;
pub mod next;
pub mod standard;

pub use builder::PipelineBuilder;
pub use composite::{
    ConditionalPipeline, ErrorHandlingPipeline, ParallelPipeline, ParallelStrategy, PipelineExt,
    SequentialPipeline,
};
pub use next::Next;
pub use standard::StandardPipeline;

use async_trait::async_trait;

use crate::entities::ExecutionContext;
use crate::error::PipelineError;
use crate::services::Command;

/// An opaque executor carrying a typed command to its typed result.
///
/// Implemented by [`StandardPipeline`] and every composite; callers hold
/// pipelines as `Arc<dyn Pipeline<C>>` and treat them uniformly.
#[async_trait]
pub trait Pipeline<C: Command>: Send + Sync {
    /// Executes the command through this pipeline
    async fn execute(&self, command: C, context: &ExecutionContext) -> Result<C::Output, PipelineError>;
}
