// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Middleware Priority Value Object
//!
//! Type-safe priority value for middleware chain ordering. The chain
//! executes middleware in ascending priority order; equal priorities keep
//! registration order (the sort is stable).
//!
//! ## Priority Vocabulary
//!
//! A small ordered vocabulary covers the common chain positions:
//!
//! | Named priority   | Raw value | Typical use                          |
//! |------------------|-----------|--------------------------------------|
//! | `AUTHENTICATION` | 100       | Establish caller identity            |
//! | `AUTHORIZATION`  | 200       | Check permissions                    |
//! | `VALIDATION`     | 300       | Reject malformed commands early      |
//! | `PRE_PROCESSING` | 400       | Enrichment, normalization            |
//! | `CUSTOM`         | 500       | Application middleware (the default) |
//! | `POST_PROCESSING`| 600       | Result shaping                       |
//! | `OBSERVABILITY`  | 700       | Metrics, tracing, audit              |
//!
//! Raw values in between are valid; the vocabulary is a convention, not a
//! restriction.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Chain-ordering priority for a middleware (lower executes earlier).
///
/// Wraps a plain integer so that priorities cannot be confused with other
/// numeric configuration, while still admitting any value between the named
/// positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MiddlewarePriority(i32);

impl MiddlewarePriority {
    /// Establish caller identity before anything else runs.
    pub const AUTHENTICATION: MiddlewarePriority = MiddlewarePriority(100);
    /// Check permissions once identity is known.
    pub const AUTHORIZATION: MiddlewarePriority = MiddlewarePriority(200);
    /// Reject malformed commands before business logic.
    pub const VALIDATION: MiddlewarePriority = MiddlewarePriority(300);
    /// Enrichment and normalization ahead of the handler.
    pub const PRE_PROCESSING: MiddlewarePriority = MiddlewarePriority(400);
    /// Default position for application middleware.
    pub const CUSTOM: MiddlewarePriority = MiddlewarePriority(500);
    /// Result shaping after the handler.
    pub const POST_PROCESSING: MiddlewarePriority = MiddlewarePriority(600);
    /// Metrics and tracing wrap the whole chain tail.
    pub const OBSERVABILITY: MiddlewarePriority = MiddlewarePriority(700);

    /// Creates a priority from a raw integer value
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the raw integer value
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl Default for MiddlewarePriority {
    fn default() -> Self {
        Self::CUSTOM
    }
}

impl Display for MiddlewarePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::AUTHENTICATION => write!(f, "authentication({})", self.0),
            Self::AUTHORIZATION => write!(f, "authorization({})", self.0),
            Self::VALIDATION => write!(f, "validation({})", self.0),
            Self::PRE_PROCESSING => write!(f, "preProcessing({})", self.0),
            Self::CUSTOM => write!(f, "custom({})", self.0),
            Self::POST_PROCESSING => write!(f, "postProcessing({})", self.0),
            Self::OBSERVABILITY => write!(f, "observability({})", self.0),
            _ => write!(f, "priority({})", self.0),
        }
    }
}

impl From<i32> for MiddlewarePriority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}
