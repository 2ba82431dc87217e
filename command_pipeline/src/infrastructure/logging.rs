// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Infrastructure
//!
//! Event-emitter sinks bridging pipeline events into tracing and channels.

pub mod observability;

pub use observability::{ChannelEventEmitter, TracingEventEmitter};
