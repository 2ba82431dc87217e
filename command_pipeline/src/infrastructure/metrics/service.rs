// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service Implementation
//!
//! Prometheus-based metrics collection for pipeline observability.
//! Provides execution metrics (dispatched commands, duration, failures),
//! admission metrics (back-pressure usage, rate-limit rejections), and
//! cache effectiveness (hits/misses). Thread-safe with low overhead; the
//! registry is exposed for scraping by whatever HTTP surface the host
//! application runs.

use std::sync::Arc;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};

use command_pipeline_domain::PipelineError;

const NAMESPACE: &str = "command_pipeline";

/// Prometheus metrics service for the pipeline system.
///
/// # Design Principles
///
/// - **Separation of Concerns**: metrics live in dedicated observability
///   infrastructure, never in domain logic
/// - **Performance**: counter/gauge updates are lock-free atomics
/// - **Reliability**: metric registration failures surface at
///   construction, not on the hot path
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    // Command execution metrics
    commands_dispatched_total: IntCounter,
    commands_failed_total: IntCounter,
    command_duration_seconds: Histogram,

    // Admission metrics
    commands_in_flight: IntGauge,
    rate_limit_rejections_total: IntCounter,
    back_pressure_rejections_total: IntCounter,

    // Cache metrics
    cache_hits_total: IntCounter,
    cache_misses_total: IntCounter,
}

impl MetricsService {
    /// Creates the service with a fresh Prometheus registry
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();

        let commands_dispatched_total = IntCounter::with_opts(
            Opts::new("commands_dispatched_total", "Total commands dispatched").namespace(NAMESPACE),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create commands_dispatched_total: {}", e)))?;

        let commands_failed_total = IntCounter::with_opts(
            Opts::new("commands_failed_total", "Total commands that surfaced an error").namespace(NAMESPACE),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create commands_failed_total: {}", e)))?;

        let command_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("command_duration_seconds", "Time spent executing commands")
                .namespace(NAMESPACE)
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create command_duration_seconds: {}", e)))?;

        let commands_in_flight = IntGauge::with_opts(
            Opts::new("commands_in_flight", "Commands currently executing").namespace(NAMESPACE),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create commands_in_flight: {}", e)))?;

        let rate_limit_rejections_total = IntCounter::with_opts(
            Opts::new("rate_limit_rejections_total", "Admissions denied by the rate limiter").namespace(NAMESPACE),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create rate_limit_rejections_total: {}", e)))?;

        let back_pressure_rejections_total = IntCounter::with_opts(
            Opts::new(
                "back_pressure_rejections_total",
                "Admissions refused by the back-pressure semaphore",
            )
            .namespace(NAMESPACE),
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create back_pressure_rejections_total: {}", e))
        })?;

        let cache_hits_total =
            IntCounter::with_opts(Opts::new("cache_hits_total", "Cache lookups served from cache").namespace(NAMESPACE))
                .map_err(|e| PipelineError::metrics_error(format!("Failed to create cache_hits_total: {}", e)))?;

        let cache_misses_total =
            IntCounter::with_opts(Opts::new("cache_misses_total", "Cache lookups that missed").namespace(NAMESPACE))
                .map_err(|e| PipelineError::metrics_error(format!("Failed to create cache_misses_total: {}", e)))?;

        registry
            .register(Box::new(commands_dispatched_total.clone()))
            .and_then(|_| registry.register(Box::new(commands_failed_total.clone())))
            .and_then(|_| registry.register(Box::new(command_duration_seconds.clone())))
            .and_then(|_| registry.register(Box::new(commands_in_flight.clone())))
            .and_then(|_| registry.register(Box::new(rate_limit_rejections_total.clone())))
            .and_then(|_| registry.register(Box::new(back_pressure_rejections_total.clone())))
            .and_then(|_| registry.register(Box::new(cache_hits_total.clone())))
            .and_then(|_| registry.register(Box::new(cache_misses_total.clone())))
            .map_err(|e| PipelineError::metrics_error(format!("Failed to register metrics: {}", e)))?;

        Ok(Self {
            registry: Arc::new(registry),
            commands_dispatched_total,
            commands_failed_total,
            command_duration_seconds,
            commands_in_flight,
            rate_limit_rejections_total,
            back_pressure_rejections_total,
            cache_hits_total,
            cache_misses_total,
        })
    }

    /// The registry backing this service, for scraping/export
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Records a command entering execution
    pub fn record_dispatch(&self) {
        self.commands_dispatched_total.inc();
        self.commands_in_flight.inc();
    }

    /// Records a command finishing, with duration and outcome
    pub fn record_completion(&self, duration_secs: f64, failed: bool) {
        self.commands_in_flight.dec();
        self.command_duration_seconds.observe(duration_secs);
        if failed {
            self.commands_failed_total.inc();
        }
    }

    /// Records a rate-limit denial
    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejections_total.inc();
    }

    /// Records a back-pressure refusal
    pub fn record_back_pressure_rejection(&self) {
        self.back_pressure_rejections_total.inc();
    }

    /// Records a cache lookup outcome
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits_total.inc();
        } else {
            self.cache_misses_total.inc();
        }
    }

    /// Commands currently executing
    pub fn in_flight(&self) -> i64 {
        self.commands_in_flight.get()
    }
}

impl std::fmt::Debug for MetricsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsService")
            .field("dispatched", &self.commands_dispatched_total.get())
            .field("failed", &self.commands_failed_total.get())
            .field("in_flight", &self.commands_in_flight.get())
            .finish()
    }
}
