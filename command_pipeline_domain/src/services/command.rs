// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Contract
//!
//! This module defines the `Command` trait that every request artifact in
//! the pipeline system implements, together with its optional capability
//! hooks.
//!
//! ## Overview
//!
//! A command is a typed value carrying a statically-known output type. The
//! pipeline preserves that type end-to-end: dispatching a `C` always
//! produces a `C::Output`, never an erased value.
//!
//! ## Why One Unified Trait?
//!
//! The capability surface (validation, sanitization, chaining, fallback
//! output, scope markers) could be split into one trait per capability.
//! That design creates complexity:
//!
//! - Middleware would need a bound per capability it consults
//! - A `dyn`-safe middleware signature becomes impossible to state
//! - Callers implement boilerplate impls to satisfy bounds they never use
//!
//! The unified approach keeps one bound (`C: Command`) and defaults every
//! capability to "absent": implement only the hooks a command actually
//! has. A capability check at runtime is a virtual call returning a
//! default, which costs nothing observable next to an `.await`.
//!
//! ## Lifecycle
//!
//! Commands are created by the caller, treated as immutable during
//! execution (the pipeline clones rather than mutates), and dropped after
//! result propagation. They must be `Clone` because retry, caching, and
//! sequential composition re-submit the same command value.

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::value_objects::CommandId;

/// A typed request artifact with a declared output type.
///
/// The only required piece is `Output`; everything else is a defaulted
/// capability hook. Commands are value types: cloning must be cheap and
/// clones must be interchangeable.
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Clone)]
/// struct GetUser { id: u64 }
///
/// impl Command for GetUser {
///     type Output = User;
/// }
/// ```
pub trait Command: Clone + Send + Sync + 'static {
    /// The result type produced when this command completes.
    type Output: Send + Sync + 'static;

    /// Human-readable command name used in events and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Validation hook: rejects malformed commands before dispatch.
    ///
    /// The secure dispatcher calls this; a plain pipeline does not.
    fn validate(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Sanitization hook: returns a cleaned copy for execution.
    ///
    /// The default returns the command unchanged.
    fn sanitized(&self) -> Self {
        self.clone()
    }

    /// Sensitive fields by name, as opaque display values.
    ///
    /// Observability layers use this to redact payloads; the core never
    /// logs a field listed here.
    fn sensitive_fields(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Chain transform capability for sequential composition.
    ///
    /// Given the previous stage's result, produces the command for the
    /// next stage (same output type). Commands without this capability
    /// return `None` and the next stage re-runs the original command.
    #[allow(unused_variables)]
    fn chain_transform(&self, previous: &Self::Output) -> Option<Self> {
        None
    }

    /// Default-result capability for conditional composition.
    ///
    /// Consulted when a conditional pipeline's predicate is false and no
    /// explicit default factory was supplied.
    fn fallback_output(&self) -> Option<Self::Output> {
        None
    }

    /// Capability markers this command carries (e.g. `"requires-encryption"`).
    ///
    /// Scoped middleware activates only when its scope tag appears here;
    /// the check is a cheap slice scan before `execute` runs.
    fn scopes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Metadata binding capability.
    ///
    /// A command bound to a specific invocation returns that invocation's
    /// id; the standard pipeline then verifies the context carries the
    /// same metadata before executing.
    fn bound_metadata_id(&self) -> Option<CommandId> {
        None
    }
}
