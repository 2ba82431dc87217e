// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Rate Limiter
//!
//! Identifier-keyed admission control with three strategies:
//!
//! - **Token bucket**: capacity `C`, refill rate `R`/s. On each request
//!   tokens refill by `elapsed × R` (capped at `C`) and the request
//!   consumes `cost` tokens if available. Over any interval Δ the limiter
//!   admits at most `C + R·Δ` requests of cost 1.
//! - **Sliding window**: admits while the count of requests in
//!   `[now − window, now]` stays below the cap; old timestamps are pruned
//!   lazily on access.
//! - **Adaptive**: a token bucket whose effective capacity is
//!   `base_rate × (2 − load_factor())`, shedding admission as the
//!   supplied load gauge climbs toward 2.0 and doubling it when idle at
//!   0.0.
//!
//! ## State & Time
//!
//! Per-identifier state lives behind one mutex; every operation is a short
//! critical section with no await inside. The limiter reads
//! `tokio::time::Instant`, so tests drive refill with paused time.
//! Identifiers idle past the inactivity threshold are pruned lazily and by
//! the optional background sweeper ([`RateLimiter::spawn_cleanup`]).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use command_pipeline_domain::PipelineError;

use crate::infrastructure::runtime::{spawn_periodic, MaintenanceHandle};

/// Admission strategy for a limiter instance.
#[derive(Debug, Clone)]
pub enum RateLimitStrategy {
    /// Classic token bucket.
    TokenBucket {
        /// Maximum stored tokens.
        capacity: f64,
        /// Tokens added per second.
        refill_rate: f64,
    },
    /// Count of requests within a rolling window.
    SlidingWindow {
        /// Window length.
        window: Duration,
        /// Maximum requests inside the window.
        max_requests: usize,
    },
    /// Token bucket with load-scaled capacity.
    Adaptive {
        /// Baseline capacity at load factor 1.0.
        base_rate: f64,
        /// Tokens added per second.
        refill_rate: f64,
    },
}

/// Result of a status query: what an identifier has left.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    /// Whole tokens (or window slots) still available.
    pub remaining: u64,
    /// The configured admission limit.
    pub limit: u64,
    /// Time until the next token (or freed slot); zero when admissible now.
    pub reset_after: Duration,
}

enum IdentifierState {
    Bucket {
        tokens: f64,
        last_refill: Instant,
        last_access: Instant,
    },
    Window {
        timestamps: VecDeque<Instant>,
        last_access: Instant,
    },
}

impl IdentifierState {
    fn last_access(&self) -> Instant {
        match self {
            IdentifierState::Bucket { last_access, .. } => *last_access,
            IdentifierState::Window { last_access, .. } => *last_access,
        }
    }
}

type LoadFactorFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Identifier-keyed admission controller.
///
/// Cheap to clone; clones share per-identifier state.
#[derive(Clone)]
pub struct RateLimiter {
    strategy: RateLimitStrategy,
    load_factor: Option<LoadFactorFn>,
    inactive_after: Duration,
    state: Arc<Mutex<HashMap<String, IdentifierState>>>,
}

/// Identifiers idle this long are dropped by pruning.
const DEFAULT_INACTIVE_AFTER: Duration = Duration::from_secs(300);

impl RateLimiter {
    /// Creates a limiter for the given strategy.
    ///
    /// # Errors
    ///
    /// Non-positive capacities, rates, or window sizes fail with
    /// `invalidConfiguration`.
    pub fn new(strategy: RateLimitStrategy) -> Result<Self, PipelineError> {
        match &strategy {
            RateLimitStrategy::TokenBucket { capacity, refill_rate } => {
                if *capacity <= 0.0 || *refill_rate <= 0.0 {
                    return Err(PipelineError::invalid_config(
                        "token bucket capacity and refill rate must be positive",
                    ));
                }
            }
            RateLimitStrategy::SlidingWindow { window, max_requests } => {
                if window.is_zero() || *max_requests == 0 {
                    return Err(PipelineError::invalid_config(
                        "sliding window size and request cap must be positive",
                    ));
                }
            }
            RateLimitStrategy::Adaptive { base_rate, refill_rate } => {
                if *base_rate <= 0.0 || *refill_rate <= 0.0 {
                    return Err(PipelineError::invalid_config(
                        "adaptive base rate and refill rate must be positive",
                    ));
                }
            }
        }
        Ok(Self {
            strategy,
            load_factor: None,
            inactive_after: DEFAULT_INACTIVE_AFTER,
            state: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Supplies the load gauge consulted by the adaptive strategy.
    ///
    /// Expected range is [0.0, 2.0]; values outside are clamped. Without a
    /// gauge the adaptive strategy behaves like a plain bucket at
    /// `base_rate` capacity (load factor 1.0).
    pub fn with_load_factor(mut self, load_factor: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.load_factor = Some(Arc::new(load_factor));
        self
    }

    /// Overrides the inactivity threshold used by pruning
    pub fn with_inactive_after(mut self, inactive_after: Duration) -> Self {
        self.inactive_after = inactive_after;
        self
    }

    fn effective_capacity(&self) -> f64 {
        match &self.strategy {
            RateLimitStrategy::TokenBucket { capacity, .. } => *capacity,
            RateLimitStrategy::SlidingWindow { max_requests, .. } => *max_requests as f64,
            RateLimitStrategy::Adaptive { base_rate, .. } => {
                let load = self
                    .load_factor
                    .as_ref()
                    .map(|f| f().clamp(0.0, 2.0))
                    .unwrap_or(1.0);
                base_rate * (2.0 - load)
            }
        }
    }

    fn refill_rate(&self) -> f64 {
        match &self.strategy {
            RateLimitStrategy::TokenBucket { refill_rate, .. }
            | RateLimitStrategy::Adaptive { refill_rate, .. } => *refill_rate,
            RateLimitStrategy::SlidingWindow { .. } => 0.0,
        }
    }

    /// Admission check: consumes `cost` units for `identifier` if
    /// available. Returns `true` on allow.
    pub fn allow(&self, identifier: &str, cost: u32) -> bool {
        self.check(identifier, cost).is_ok()
    }

    /// Admission check returning the denial detail.
    ///
    /// # Errors
    ///
    /// `rateLimitExceeded` carrying the limit and the time until the next
    /// unit frees up.
    pub fn check(&self, identifier: &str, cost: u32) -> Result<(), PipelineError> {
        let now = Instant::now();
        let cost = f64::from(cost);
        let mut state = self.state.lock();

        match &self.strategy {
            RateLimitStrategy::TokenBucket { .. } | RateLimitStrategy::Adaptive { .. } => {
                let capacity = self.effective_capacity();
                let rate = self.refill_rate();
                let entry = state.entry(identifier.to_string()).or_insert(IdentifierState::Bucket {
                    tokens: capacity,
                    last_refill: now,
                    last_access: now,
                });
                let IdentifierState::Bucket {
                    tokens,
                    last_refill,
                    last_access,
                } = entry
                else {
                    return Err(PipelineError::internal_error("rate limiter state kind changed"));
                };

                let elapsed = now.duration_since(*last_refill).as_secs_f64();
                *tokens = (*tokens + elapsed * rate).min(capacity);
                *last_refill = now;
                *last_access = now;

                if *tokens >= cost {
                    *tokens -= cost;
                    Ok(())
                } else {
                    let deficit = cost - *tokens;
                    Err(PipelineError::RateLimitExceeded {
                        limit: capacity as u64,
                        reset_after: Duration::from_secs_f64(deficit / rate),
                    })
                }
            }
            RateLimitStrategy::SlidingWindow { window, max_requests } => {
                let entry = state.entry(identifier.to_string()).or_insert(IdentifierState::Window {
                    timestamps: VecDeque::new(),
                    last_access: now,
                });
                let IdentifierState::Window {
                    timestamps,
                    last_access,
                } = entry
                else {
                    return Err(PipelineError::internal_error("rate limiter state kind changed"));
                };

                *last_access = now;
                // Lazy pruning of entries that slid out of the window.
                while let Some(&oldest) = timestamps.front() {
                    if now.duration_since(oldest) > *window {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }

                if timestamps.len() + cost as usize <= *max_requests {
                    for _ in 0..cost as usize {
                        timestamps.push_back(now);
                    }
                    Ok(())
                } else {
                    let reset_after = timestamps
                        .front()
                        .map(|&oldest| (*window).saturating_sub(now.duration_since(oldest)))
                        .unwrap_or(Duration::ZERO);
                    Err(PipelineError::RateLimitExceeded {
                        limit: *max_requests as u64,
                        reset_after,
                    })
                }
            }
        }
    }

    /// Reports what `identifier` has left without consuming anything
    pub fn status(&self, identifier: &str) -> RateLimitStatus {
        let now = Instant::now();
        let state = self.state.lock();

        match &self.strategy {
            RateLimitStrategy::TokenBucket { .. } | RateLimitStrategy::Adaptive { .. } => {
                let capacity = self.effective_capacity();
                let rate = self.refill_rate();
                let tokens = match state.get(identifier) {
                    Some(IdentifierState::Bucket { tokens, last_refill, .. }) => {
                        let elapsed = now.duration_since(*last_refill).as_secs_f64();
                        (*tokens + elapsed * rate).min(capacity)
                    }
                    _ => capacity,
                };
                let reset_after = if tokens >= 1.0 {
                    Duration::ZERO
                } else {
                    Duration::from_secs_f64((1.0 - tokens) / rate)
                };
                RateLimitStatus {
                    remaining: tokens as u64,
                    limit: capacity as u64,
                    reset_after,
                }
            }
            RateLimitStrategy::SlidingWindow { window, max_requests } => {
                let in_window = match state.get(identifier) {
                    Some(IdentifierState::Window { timestamps, .. }) => timestamps
                        .iter()
                        .filter(|&&t| now.duration_since(t) <= *window)
                        .count(),
                    _ => 0,
                };
                let reset_after = match state.get(identifier) {
                    Some(IdentifierState::Window { timestamps, .. }) if in_window >= *max_requests => timestamps
                        .front()
                        .map(|&oldest| (*window).saturating_sub(now.duration_since(oldest)))
                        .unwrap_or(Duration::ZERO),
                    _ => Duration::ZERO,
                };
                RateLimitStatus {
                    remaining: max_requests.saturating_sub(in_window) as u64,
                    limit: *max_requests as u64,
                    reset_after,
                }
            }
        }
    }

    /// Drops identifiers idle past the inactivity threshold; returns how
    /// many were removed
    pub fn prune_inactive(&self) -> usize {
        let now = Instant::now();
        let inactive_after = self.inactive_after;
        let mut state = self.state.lock();
        let before = state.len();
        state.retain(|_, entry| now.duration_since(entry.last_access()) < inactive_after);
        before - state.len()
    }

    /// Number of identifiers currently tracked
    pub fn tracked_identifiers(&self) -> usize {
        self.state.lock().len()
    }

    /// Spawns the background pruner; stop or drop the handle on shutdown
    pub fn spawn_cleanup(&self, interval: Duration) -> MaintenanceHandle {
        let limiter = self.clone();
        spawn_periodic("rate-limiter-pruner", interval, move || limiter.prune_inactive())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("strategy", &self.strategy)
            .field("tracked_identifiers", &self.tracked_identifiers())
            .finish()
    }
}
