// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides a comprehensive, hierarchical error system for the
//! command pipeline domain. It implements a robust error handling strategy
//! that categorizes failures, carries stable kind identifiers for
//! observability, and separates internal diagnostics from caller-facing
//! messages.
//!
//! ## Overview
//!
//! The error system is designed around Domain-Driven Design principles:
//!
//! - **Domain-Specific**: Errors are tailored to command execution concepts
//! - **Categorized**: Failures are grouped for systematic handling
//! - **Actionable**: Each error provides sufficient context for debugging and
//!   recovery
//! - **Type-Safe**: Rust's type system ensures comprehensive error handling
//! - **Sanitizable**: Internal detail never reaches callers unless asked for
//!
//! ## Error Categories
//!
//! ### Dispatch Errors
//! - **HandlerNotFound**: No pipeline registered for the command type
//! - **ExecutionFailed**: Generic execution wrapper carrying command context
//! - **MiddlewareError**: A middleware's own logic failed
//! - **MaxDepthExceeded**: Middleware chain longer than the configured cap
//! - **PipelineViolation**: Next-guard contract breach
//!
//! ### Admission Errors
//! - **RateLimitExceeded**: Admission denied by the rate limiter
//! - **BackPressureRejected / Preempted / Exhausted**: Semaphore refusals
//! - **CircuitBreakerOpen**: Fast-fail while the breaker cools down
//!
//! ### Deadline Errors
//! - **TimeoutError**: Budget expired before the chain completed
//! - **Cancelled**: Cooperative task cancellation propagated
//! - **RetryExhausted**: Every attempt failed
//!
//! ### Security Errors
//! - **AuthenticationError / AuthorizationError**: Caller identity missing or
//!   insufficient
//! - **ValidationError**: Command rejected pre-dispatch
//! - **EncryptionError**: Encryption collaborator failure
//!
//! ## Propagation Policy
//!
//! Middleware may catch and transform errors; the core never silently
//! swallows one. Every variant exposes a stable kind string via
//! [`PipelineError::kind`] and a sanitized caller-facing message via
//! [`PipelineError::public_message`], distinct from the internal `Display`
//! output used in logs.
//!
//! ## Recovery Strategies
//!
//! Some errors indicate temporary conditions that can be retried:
//!
//! - **TimeoutError**: The downstream dependency may recover
//! - **BackPressureRejected / Exhausted**: Load may subside
//! - **RateLimitExceeded**: The bucket refills over time
//! - **CircuitBreakerOpen**: The breaker half-opens after cooldown
//!
//! Non-recoverable errors (validation, security, contract violations)
//! require caller intervention and propagate immediately through the retry
//! middleware's classifier.

use std::time::Duration;
use thiserror::Error;

/// The two ways a middleware can breach the next-guard contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// `next` was invoked more than once by a guarded middleware.
    DuplicateNextCall,
    /// `next` was dropped without being invoked by a middleware that did not
    /// declare the short-circuit capability.
    NextNotCalled,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::DuplicateNextCall => write!(f, "duplicate next call"),
            ViolationKind::NextNotCalled => write!(f, "next not called"),
        }
    }
}

/// Domain-specific errors for the command pipeline system.
///
/// This enum represents all possible errors that can occur within the domain
/// layer. Each variant includes enough context to diagnose what went wrong
/// and, where the failure is time-bound (timeouts, rate limits, open
/// breakers), how long until a retry could succeed.
///
/// ## Design Principles
///
/// - **Specific**: Each error type represents a specific failure mode
/// - **Actionable**: Error payloads provide enough context for debugging
/// - **Categorized**: Errors are grouped by type for systematic handling
/// - **Recoverable**: Some errors indicate retry-able conditions
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("No handler registered for command: {0}")]
    HandlerNotFound(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Middleware '{name}' failed: {message}")]
    MiddlewareError { name: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Authorization error: {0}")]
    AuthorizationError(String),

    #[error("Rate limit of {limit} exceeded, resets in {reset_after:?}")]
    RateLimitExceeded { limit: u64, reset_after: Duration },

    #[error("Timed out after {0:?}")]
    TimeoutError(Duration),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: Box<PipelineError>,
    },

    #[error("Circuit breaker is open, resets in {reset_after:?}")]
    CircuitBreakerOpen { reset_after: Duration },

    #[error("Back-pressure: acquire rejected")]
    BackPressureRejected,

    #[error("Back-pressure: waiter preempted by a newer acquire")]
    BackPressurePreempted,

    #[error("Back-pressure: capacity exhausted")]
    BackPressureExhausted,

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Condition not met: {0}")]
    ConditionNotMet(String),

    #[error("All pipelines failed ({} errors)", .0.len())]
    AllPipelinesFailed(Vec<PipelineError>),

    #[error("Pipeline violation: {0}")]
    PipelineViolation(ViolationKind),

    #[error("Middleware depth {depth} exceeds maximum of {max}")]
    MaxDepthExceeded { depth: usize, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl PipelineError {
    /// Creates a new handler-not-found error
    pub fn handler_not_found(command: impl Into<String>) -> Self {
        Self::HandlerNotFound(command.into())
    }

    /// Creates a new execution error
    pub fn execution_failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Creates a new middleware error
    pub fn middleware_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MiddlewareError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a new validation error
    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Creates a new cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates a new timeout error carrying the expired budget
    pub fn timeout(budget: Duration) -> Self {
        Self::TimeoutError(budget)
    }

    /// Creates a new condition-not-met error
    pub fn condition_not_met(msg: impl Into<String>) -> Self {
        Self::ConditionNotMet(msg.into())
    }

    /// Creates a new cache error
    pub fn cache_error(msg: impl Into<String>) -> Self {
        Self::CacheError(msg.into())
    }

    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Creates a new metrics error
    pub fn metrics_error(msg: impl Into<String>) -> Self {
        Self::MetricsError(msg.into())
    }

    /// Stable kind identifier for observability sinks.
    ///
    /// These strings are part of the public contract: dashboards and alerts
    /// key on them, so they never change even when messages do.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::HandlerNotFound(_) => "handlerNotFound",
            PipelineError::ExecutionFailed(_) => "executionFailed",
            PipelineError::MiddlewareError { .. } => "middlewareError",
            PipelineError::ValidationError(_) => "validation",
            PipelineError::AuthenticationError(_) => "authentication",
            PipelineError::AuthorizationError(_) => "authorization",
            PipelineError::RateLimitExceeded { .. } => "rateLimitExceeded",
            PipelineError::TimeoutError(_) => "timeout",
            PipelineError::Cancelled(_) => "cancelled",
            PipelineError::RetryExhausted { .. } => "retryExhausted",
            PipelineError::CircuitBreakerOpen { .. } => "circuitBreakerOpen",
            PipelineError::BackPressureRejected => "backPressure.rejected",
            PipelineError::BackPressurePreempted => "backPressure.preempted",
            PipelineError::BackPressureExhausted => "backPressure.exhausted",
            PipelineError::CacheError(_) => "cache",
            PipelineError::EncryptionError(_) => "encryption",
            PipelineError::ConditionNotMet(_) => "conditionNotMet",
            PipelineError::AllPipelinesFailed(_) => "allPipelinesFailed",
            PipelineError::PipelineViolation(ViolationKind::DuplicateNextCall) => {
                "pipelineViolation.duplicateNextCall"
            }
            PipelineError::PipelineViolation(ViolationKind::NextNotCalled) => {
                "pipelineViolation.nextNotCalled"
            }
            PipelineError::MaxDepthExceeded { .. } => "maxDepthExceeded",
            PipelineError::InvalidConfiguration(_) => "invalidConfiguration",
            PipelineError::InternalError(_) => "internalError",
            PipelineError::MetricsError(_) => "metricsError",
        }
    }

    /// Caller-facing message with internal detail removed.
    ///
    /// The secure dispatch wrapper maps every failure through this method so
    /// that command names, middleware identifiers, and infrastructure detail
    /// never leak across the API boundary. Time-bound errors keep their
    /// retry hints because callers act on them.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::HandlerNotFound(_) => "The requested operation is not available".into(),
            PipelineError::ValidationError(msg) => format!("Validation failed: {}", msg),
            PipelineError::AuthenticationError(_) => "Authentication required".into(),
            PipelineError::AuthorizationError(_) => "Access denied".into(),
            PipelineError::RateLimitExceeded { reset_after, .. } => {
                format!("Too many requests, retry in {:?}", reset_after)
            }
            PipelineError::TimeoutError(_) => "The operation timed out".into(),
            PipelineError::Cancelled(_) => "The operation was cancelled".into(),
            PipelineError::CircuitBreakerOpen { reset_after } => {
                format!("Service unavailable, retry in {:?}", reset_after)
            }
            PipelineError::BackPressureRejected
            | PipelineError::BackPressurePreempted
            | PipelineError::BackPressureExhausted => "The system is over capacity".into(),
            PipelineError::ConditionNotMet(_) => "The operation's precondition was not met".into(),
            _ => "The operation failed".into(),
        }
    }

    /// Checks if the error is recoverable
    ///
    /// Recoverable errors indicate temporary conditions; the retry
    /// middleware's default classifier consults this predicate.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::TimeoutError(_)
                | PipelineError::BackPressureRejected
                | PipelineError::BackPressureExhausted
                | PipelineError::RateLimitExceeded { .. }
                | PipelineError::CircuitBreakerOpen { .. }
        )
    }

    /// Checks if the error is a security-related error
    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            PipelineError::AuthenticationError(_)
                | PipelineError::AuthorizationError(_)
                | PipelineError::EncryptionError(_)
        )
    }

    /// Checks if the error represents refused admission rather than a
    /// failed execution (the handler was never reached).
    pub fn is_admission_refusal(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimitExceeded { .. }
                | PipelineError::CircuitBreakerOpen { .. }
                | PipelineError::BackPressureRejected
                | PipelineError::BackPressurePreempted
                | PipelineError::BackPressureExhausted
        )
    }
}
