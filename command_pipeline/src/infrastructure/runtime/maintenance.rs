// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Periodic Maintenance Tasks
//!
//! The cache sweeper and rate-limiter pruner share the same shape: a
//! housekeeping pass that reclaims stale entries, repeated on an interval
//! for the life of the component. This module owns that loop so call
//! sites hand over only the pass itself.
//!
//! ## Lifecycle
//!
//! [`spawn_periodic`] runs the pass every interval until the returned
//! [`MaintenanceHandle`] is stopped or dropped. Dropping the handle
//! closes the shutdown channel, so a forgotten handle stops its task
//! instead of orphaning it. [`MaintenanceHandle::stop`] shuts down
//! gracefully and returns a [`MaintenanceReport`] totalling the passes
//! run and entries reclaimed, which shutdown paths log for capacity
//! tuning.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use command_pipeline_domain::PipelineError;

/// Totals accumulated over a maintenance task's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Passes that ran.
    pub passes: u64,
    /// Entries reclaimed across all passes.
    pub reclaimed: u64,
}

/// Handle to a running maintenance task.
///
/// The task stops when the handle is stopped, aborted, or dropped.
pub struct MaintenanceHandle {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<MaintenanceReport>,
}

impl MaintenanceHandle {
    /// The task's name as it appears in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Requests shutdown and waits for the final report.
    ///
    /// # Errors
    ///
    /// A panicking pass surfaces as `internalError`; an externally
    /// aborted task as `cancelled`.
    pub async fn stop(mut self) -> Result<MaintenanceReport, PipelineError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match self.task.await {
            Ok(report) => Ok(report),
            Err(join_error) if join_error.is_cancelled() => Err(PipelineError::cancelled(format!(
                "maintenance task '{}' was aborted",
                self.name
            ))),
            Err(join_error) => Err(PipelineError::internal_error(format!(
                "maintenance task '{}' panicked: {}",
                self.name, join_error
            ))),
        }
    }

    /// Stops the task immediately, discarding any in-flight pass
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for MaintenanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceHandle")
            .field("name", &self.name)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Spawns a maintenance pass on a fixed interval.
///
/// `pass` returns how many entries it reclaimed; non-zero passes are
/// logged at debug level with the running task name.
pub fn spawn_periodic<F>(name: &'static str, interval: Duration, mut pass: F) -> MaintenanceHandle
where
    F: FnMut() -> usize + Send + 'static,
{
    let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        debug!(task = name, interval_ms = interval.as_millis() as u64, "maintenance task starting");
        let mut report = MaintenanceReport::default();
        loop {
            tokio::select! {
                // Resolves on explicit stop and when the handle is
                // dropped; either way the task winds down.
                _ = &mut shutdown_rx => break,
                _ = tokio::time::sleep(interval) => {
                    let reclaimed = pass();
                    report.passes += 1;
                    report.reclaimed += reclaimed as u64;
                    if reclaimed > 0 {
                        debug!(task = name, reclaimed, "maintenance pass reclaimed entries");
                    }
                }
            }
        }
        debug!(
            task = name,
            passes = report.passes,
            reclaimed = report.reclaimed,
            "maintenance task stopped"
        );
        report
    });

    MaintenanceHandle {
        name,
        shutdown: Some(shutdown),
        task,
    }
}
