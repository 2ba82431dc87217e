// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resilience Middleware
//!
//! Failure-tolerance primitives with well-defined state machines:
//!
//! - [`circuit_breaker`]: fast-fail while a downstream recovers
//! - [`retry`]: bounded re-attempts with backoff and a retryability
//!   classifier
//! - [`timeout`]: deadline racing with context budget inheritance
//! - [`bulkhead`]: per-resource concurrency isolation
//!
//! All four are ordinary [`Middleware`](command_pipeline_domain::Middleware)
//! implementations; stack them in any order the failure domain calls for
//! (a common chain is timeout → retry → circuit breaker → bulkhead, outermost
//! first).

pub mod bulkhead;
pub mod circuit_breaker;
pub mod retry;
pub mod timeout;

pub use bulkhead::BulkheadMiddleware;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMiddleware, CircuitState};
pub use retry::{BackoffPolicy, RetryConfig, RetryMiddleware};
pub use timeout::TimeoutMiddleware;
