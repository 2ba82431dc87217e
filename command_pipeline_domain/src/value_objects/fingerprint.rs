// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fingerprint Value Object
//!
//! Deterministic, content-derived key used by the caching middleware to
//! look up memoized command results. Two commands with identical cacheable
//! content produce identical fingerprints; anything else would either miss
//! the cache forever or, worse, serve another command's result.
//!
//! The digest is SHA-256 over a caller-supplied canonical representation of
//! the command (the command type name is always mixed in, so two command
//! types with coincidentally equal payload bytes never collide).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display};

/// Content-derived cache key for a command.
///
/// Immutable once computed. The hex form is the canonical representation
/// used as the cache map key and in `cache.*` event properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes a fingerprint over a command's canonical content.
    ///
    /// # Arguments
    ///
    /// * `command_name` - The command's type name, mixed into the digest so
    ///   distinct command types never share a fingerprint
    /// * `content` - Canonical bytes of the cacheable command content
    pub fn compute(command_name: &str, content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(command_name.as_bytes());
        hasher.update([0u8]); // separator so name/content boundaries can't alias
        hasher.update(content);
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex digest string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
