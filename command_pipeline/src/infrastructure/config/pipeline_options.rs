// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Options
//!
//! The recognized configuration surface of the dispatcher: admission
//! limits, queue accounting, overflow strategy, and the middleware depth
//! cap. Options load from TOML (file or string) and are validated before
//! any component is built from them, so misconfiguration fails at startup
//! rather than on the first dispatch.
//!
//! ```toml
//! max_concurrency = 16
//! max_outstanding = 64
//! max_queue_memory = 1048576
//! back_pressure_strategy = "suspend"
//! max_middleware_depth = 50
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use command_pipeline_domain::PipelineError;

use crate::infrastructure::runtime::{BackPressureConfig, BackPressureStrategy};

fn default_max_concurrency() -> usize {
    10
}

fn default_max_outstanding() -> usize {
    50
}

fn default_max_queue_memory() -> usize {
    10 * 1024 * 1024
}

fn default_strategy() -> BackPressureStrategy {
    BackPressureStrategy::Suspend
}

fn default_max_middleware_depth() -> usize {
    100
}

/// Dispatcher configuration object.
///
/// Every field carries a documented default, so a partial TOML document
/// (or `PipelineOptions::default()`) is always usable once it validates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Admission cap for concurrent invocations.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Concurrent plus queued invocation cap.
    #[serde(default = "default_max_outstanding")]
    pub max_outstanding: usize,
    /// Aggregate estimated bytes of queued invocations.
    #[serde(default = "default_max_queue_memory")]
    pub max_queue_memory: usize,
    /// Overflow strategy when the admission cap is hit.
    #[serde(default = "default_strategy")]
    pub back_pressure_strategy: BackPressureStrategy,
    /// Builds with more middleware than this are rejected.
    #[serde(default = "default_max_middleware_depth")]
    pub max_middleware_depth: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_outstanding: default_max_outstanding(),
            max_queue_memory: default_max_queue_memory(),
            back_pressure_strategy: default_strategy(),
            max_middleware_depth: default_max_middleware_depth(),
        }
    }
}

impl PipelineOptions {
    /// Validates the option invariants.
    ///
    /// # Errors
    ///
    /// Zero `max_concurrency` or `max_middleware_depth`, or
    /// `max_outstanding` below `max_concurrency`, fail with
    /// `invalidConfiguration`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.back_pressure_config().validate()?;
        if self.max_middleware_depth == 0 {
            return Err(PipelineError::invalid_config(
                "max_middleware_depth must be greater than zero",
            ));
        }
        Ok(())
    }

    /// The semaphore configuration slice of these options
    pub fn back_pressure_config(&self) -> BackPressureConfig {
        BackPressureConfig {
            max_concurrency: self.max_concurrency,
            max_outstanding: self.max_outstanding,
            max_queue_memory: self.max_queue_memory,
            strategy: self.back_pressure_strategy,
        }
    }

    /// Parses and validates options from a TOML document
    pub fn from_toml(content: &str) -> Result<Self, PipelineError> {
        let options: PipelineOptions = toml::from_str(content)
            .map_err(|e| PipelineError::invalid_config(format!("Failed to parse pipeline options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Loads and validates options from a TOML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            PipelineError::invalid_config(format!("Failed to read options from {}: {}", path.display(), e))
        })?;
        let options = Self::from_toml(&content)?;
        debug!(path = %path.display(), "loaded pipeline options");
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(PipelineOptions::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let options = PipelineOptions::from_toml("max_concurrency = 4\n").unwrap();
        assert_eq!(options.max_concurrency, 4);
        assert_eq!(options.max_outstanding, default_max_outstanding());
        assert_eq!(options.back_pressure_strategy, BackPressureStrategy::Suspend);
    }

    #[test]
    fn test_strategy_parses_camel_case() {
        let options = PipelineOptions::from_toml("back_pressure_strategy = \"dropOldest\"\n").unwrap();
        assert_eq!(options.back_pressure_strategy, BackPressureStrategy::DropOldest);
    }

    #[test]
    fn test_zero_concurrency_fails_validation() {
        let err = PipelineOptions::from_toml("max_concurrency = 0\n").unwrap_err();
        assert_eq!(err.kind(), "invalidConfiguration");
    }

    #[test]
    fn test_zero_depth_fails_validation() {
        assert!(PipelineOptions::from_toml("max_middleware_depth = 0\n").is_err());
    }

    #[test]
    fn test_garbage_toml_is_a_config_error() {
        assert!(PipelineOptions::from_toml("max_concurrency = \"many\"\n").is_err());
    }
}
