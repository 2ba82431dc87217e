// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Metadata Entity
//!
//! The immutable record attached to every command invocation. Metadata is
//! created once at dispatch and never mutated; every middleware, event, and
//! audit record of an invocation refers back to it.
//!
//! ## Contents
//!
//! - **Invocation id**: ULID, unique per dispatch
//! - **Creation timestamp**: wall-clock dispatch time
//! - **User id** (optional): caller identity when known
//! - **Correlation id** (optional): threads one logical operation across
//!   invocations and systems
//! - **Source** (optional): free-form label of the originating subsystem
//!
//! ## Immutability
//!
//! There are no setters. The optional fields are supplied through the
//! builder-style `with_*` constructors before the record is attached to a
//! context; attempting to replace a context's metadata afterwards is a
//! programming error the API simply does not expose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::CommandId;

/// Immutable per-invocation record.
///
/// Created by the dispatcher (or manually for tests) and shared read-only
/// by every participant in the invocation. Cloning is cheap and safe:
/// clones are indistinguishable snapshots of the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMetadata {
    // Identity fields (always first)
    id: CommandId,

    // Core business fields
    correlation_id: Option<Uuid>,
    source: Option<String>,
    user_id: Option<String>,

    // Metadata fields (always last)
    created_at: DateTime<Utc>,
}

impl CommandMetadata {
    /// Creates a fresh metadata record stamped now
    pub fn new() -> Self {
        Self {
            id: CommandId::new(),
            correlation_id: None,
            source: None,
            user_id: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the caller identity (builder style)
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the correlation id (builder style)
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Sets the originating source label (builder style)
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Gets the unique invocation id
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Gets the caller identity, if known
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Gets the correlation id, if any
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id
    }

    /// Gets the source label, if any
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Gets the dispatch timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Default for CommandMetadata {
    fn default() -> Self {
        Self::new()
    }
}
