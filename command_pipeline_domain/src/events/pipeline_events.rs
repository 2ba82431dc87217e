// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Domain Events
//!
//! This module defines the observability events emitted by the pipeline
//! core, implementing event-driven patterns for decoupled monitoring and
//! audit.
//!
//! ## Overview
//!
//! Pipeline events capture significant occurrences during command
//! execution. These events enable:
//!
//! - **Monitoring**: Real-time system observability and alerting
//! - **Audit Trail**: Track all significant operations for compliance
//! - **Correlation**: Follow one command across middleware and components
//! - **Integration**: Communicate with external systems and sinks
//!
//! ## Event Names
//!
//! Event names are **stable strings**: dashboards key on them, so they
//! never change. The full vocabulary lives in [`event_names`]:
//!
//! - Command lifecycle: `command.started`, `command.completed`,
//!   `command.failed`
//! - Middleware lifecycle: `middleware.started`, `middleware.completed`,
//!   `middleware.failed`
//! - Admission: `backpressure.acquired`, `backpressure.queued`,
//!   `backpressure.rejected`, `rateLimit.exceeded`
//! - Resilience: `circuit.opened`, `circuit.halfOpen`, `circuit.closed`,
//!   `retry.attempt`, `retry.exhausted`, `timeout.expired`
//! - Cache: `cache.hit`, `cache.miss`, `cache.stored`, `cache.evicted`
//! - Diagnostics: `pipeline.violation` (debug builds only)
//!
//! ## Delivery Model
//!
//! [`EventEmitter::emit`] is a synchronous, non-blocking enqueue; sinks
//! deliver asynchronously on their own schedule. Emission is ordered per
//! invocation but carries no ordering guarantee across invocations.
//! Emitters must never block the pipeline hot path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Stable event-name vocabulary emitted by the pipeline core.
///
/// These strings are part of the public observability contract.
pub mod event_names {
    /// A command entered a pipeline.
    pub const COMMAND_STARTED: &str = "command.started";
    /// A command's chain completed successfully.
    pub const COMMAND_COMPLETED: &str = "command.completed";
    /// A command's chain surfaced an error.
    pub const COMMAND_FAILED: &str = "command.failed";
    /// A middleware began executing.
    pub const MIDDLEWARE_STARTED: &str = "middleware.started";
    /// A middleware returned successfully.
    pub const MIDDLEWARE_COMPLETED: &str = "middleware.completed";
    /// A middleware surfaced an error.
    pub const MIDDLEWARE_FAILED: &str = "middleware.failed";
    /// A back-pressure token was granted.
    pub const BACKPRESSURE_ACQUIRED: &str = "backpressure.acquired";
    /// An acquire was queued behind the concurrency limit.
    pub const BACKPRESSURE_QUEUED: &str = "backpressure.queued";
    /// An acquire was refused.
    pub const BACKPRESSURE_REJECTED: &str = "backpressure.rejected";
    /// A circuit breaker tripped open.
    pub const CIRCUIT_OPENED: &str = "circuit.opened";
    /// A circuit breaker began probing.
    pub const CIRCUIT_HALF_OPEN: &str = "circuit.halfOpen";
    /// A circuit breaker recovered.
    pub const CIRCUIT_CLOSED: &str = "circuit.closed";
    /// A retry attempt is about to run.
    pub const RETRY_ATTEMPT: &str = "retry.attempt";
    /// Every retry attempt failed.
    pub const RETRY_EXHAUSTED: &str = "retry.exhausted";
    /// A timeout budget expired.
    pub const TIMEOUT_EXPIRED: &str = "timeout.expired";
    /// A cached result was served.
    pub const CACHE_HIT: &str = "cache.hit";
    /// No cached result was found.
    pub const CACHE_MISS: &str = "cache.miss";
    /// A result was stored in the cache.
    pub const CACHE_STORED: &str = "cache.stored";
    /// An entry was evicted to make room.
    pub const CACHE_EVICTED: &str = "cache.evicted";
    /// The rate limiter denied admission.
    pub const RATE_LIMIT_EXCEEDED: &str = "rateLimit.exceeded";
    /// Next-guard contract breach diagnostic (debug builds).
    pub const PIPELINE_VIOLATION: &str = "pipeline.violation";
}

/// An observability event emitted by the pipeline core.
///
/// Events carry a stable name, a free-form property bag, and the
/// correlation id of the invocation they belong to. They are immutable
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    name: String,
    properties: HashMap<String, serde_json::Value>,
    correlation_id: Option<Uuid>,
    occurred_at: DateTime<Utc>,
}

impl PipelineEvent {
    /// Creates a new event with the given stable name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            correlation_id: None,
            occurred_at: Utc::now(),
        }
    }

    /// Attaches a property (builder style)
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attaches the invocation's correlation id (builder style)
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Gets the stable event name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the property bag
    pub fn properties(&self) -> &HashMap<String, serde_json::Value> {
        &self.properties
    }

    /// Gets one property, if present
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    /// Gets the correlation id, if any
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id
    }

    /// Gets the occurrence timestamp
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Port for observability sinks.
///
/// `emit` must be non-blocking: implementations enqueue or hand off to a
/// logging facade and deliver asynchronously. The pipeline calls this from
/// hot paths and, for diagnostics, from drop paths.
pub trait EventEmitter: Send + Sync {
    /// Accepts an event for asynchronous delivery
    fn emit(&self, event: PipelineEvent);
}

/// Emitter that discards every event.
#[derive(Debug, Default, Clone)]
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Emitter that records events in memory, in emission order.
///
/// Test support: assertions read the recorded stream back with
/// [`CollectingEventEmitter::events`].
#[derive(Debug, Default)]
pub struct CollectingEventEmitter {
    events: Mutex<Vec<PipelineEvent>>,
}

impl CollectingEventEmitter {
    /// Creates an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event emitted so far
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Names of every event emitted so far, in order
    pub fn names(&self) -> Vec<String> {
        self.events().iter().map(|e| e.name().to_string()).collect()
    }
}

impl EventEmitter for CollectingEventEmitter {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}
