// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command ID Value Object
//!
//! Type-safe unique identifier for a single command invocation. Uses ULID
//! (Universally Unique Lexicographically Sortable Identifier) so that ids
//! sort by creation time, which keeps event streams and audit logs naturally
//! ordered without an extra sequence column.
//!
//! ## ULID Properties
//!
//! - **Sortable**: Lexicographically sortable by creation time
//! - **Unique**: 80 bits of randomness per millisecond
//! - **Compact**: 26-character Crockford base32 text form
//! - **Timestamped**: Embeds millisecond creation time, recoverable via
//!   [`CommandId::timestamp_ms`]

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use ulid::Ulid;

use crate::PipelineError;

/// Unique identifier for one command invocation.
///
/// Minted at dispatch when the command's metadata record is created, and
/// never reused. The newtype keeps invocation ids from being confused with
/// other ULID-backed identifiers at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(Ulid);

impl CommandId {
    /// Creates a new id stamped with the current time
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates the nil id (all zeros), useful as a sentinel in tests
    pub fn nil() -> Self {
        Self(Ulid::nil())
    }

    /// Parses an id from its 26-character string form
    pub fn from_string(s: &str) -> Result<Self, PipelineError> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| PipelineError::validation_error(format!("Invalid command id '{}': {}", s, e)))
    }

    /// Returns the underlying ULID
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Millisecond timestamp embedded in the id
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }

    /// Checks whether this is the nil sentinel
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CommandId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl From<Ulid> for CommandId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_uniqueness() {
        let a = CommandId::new();
        let b = CommandId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_command_id_roundtrip() {
        let id = CommandId::new();
        let parsed = CommandId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_command_id_rejects_garbage() {
        assert!(CommandId::from_string("not-a-ulid").is_err());
    }

    #[test]
    fn test_nil_sentinel() {
        assert!(CommandId::nil().is_nil());
        assert!(!CommandId::new().is_nil());
    }

    #[test]
    fn test_ids_sort_by_creation_time() {
        let a = CommandId::from(Ulid::from_parts(1_000, 42));
        let b = CommandId::from(Ulid::from_parts(2_000, 0));
        assert!(a < b);
    }
}
