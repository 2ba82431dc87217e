// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Events Module
//!
//! Domain events for the command pipeline system: the [`PipelineEvent`]
//! value, the stable event-name vocabulary, and the [`EventEmitter`] port
//! that observability sinks implement.

pub mod pipeline_events;

pub use pipeline_events::{
    event_names, CollectingEventEmitter, EventEmitter, NoopEventEmitter, PipelineEvent,
};
