// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Observability Sinks
//!
//! Event-emitter implementations bridging pipeline events into the
//! process's observability stack:
//!
//! - [`TracingEventEmitter`]: renders each event as a structured
//!   `tracing` record, the default sink for services that already ship
//!   logs
//! - [`ChannelEventEmitter`]: forwards events into an unbounded tokio
//!   channel for custom fan-out (metrics aggregation, test capture,
//!   external shipping)
//!
//! Both sinks keep [`EventEmitter::emit`] non-blocking: tracing writes are
//! synchronous-but-cheap at the callsite, and channel sends never wait.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use command_pipeline_domain::events::{EventEmitter, PipelineEvent};

/// Emitter rendering pipeline events as structured tracing records.
///
/// Failure-ish events (`*.failed`, `*.rejected`, `rateLimit.exceeded`,
/// `pipeline.violation`) log at `warn`; everything else at `debug`.
#[derive(Debug, Default, Clone)]
pub struct TracingEventEmitter;

impl TracingEventEmitter {
    /// Creates the tracing sink
    pub fn new() -> Self {
        Self
    }

    fn is_warning(name: &str) -> bool {
        name.ends_with(".failed")
            || name.ends_with(".rejected")
            || name == "rateLimit.exceeded"
            || name == "pipeline.violation"
    }
}

impl EventEmitter for TracingEventEmitter {
    fn emit(&self, event: PipelineEvent) {
        let properties = serde_json::to_string(event.properties()).unwrap_or_default();
        if Self::is_warning(event.name()) {
            warn!(
                event = event.name(),
                correlation_id = ?event.correlation_id(),
                %properties,
                "pipeline event"
            );
        } else {
            debug!(
                event = event.name(),
                correlation_id = ?event.correlation_id(),
                %properties,
                "pipeline event"
            );
        }
    }
}

/// Emitter forwarding events into an unbounded channel.
///
/// The receiving half is handed out once at construction; drop it to
/// silently discard further events (emission never errors).
#[derive(Debug, Clone)]
pub struct ChannelEventEmitter {
    sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelEventEmitter {
    /// Creates the emitter and its receiving half
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventEmitter for ChannelEventEmitter {
    fn emit(&self, event: PipelineEvent) {
        // A closed receiver means nobody is listening anymore; that is
        // not the pipeline's problem.
        let _ = self.sender.send(event);
    }
}
