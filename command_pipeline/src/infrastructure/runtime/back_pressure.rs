// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Back-Pressure Semaphore
//!
//! This module provides the bounded-concurrency primitive used to keep
//! command admission from overwhelming the process: a counting semaphore
//! with queue accounting, pluggable overflow strategies, and RAII tokens.
//!
//! ## Why Not a Plain Semaphore?
//!
//! A plain counting semaphore bounds concurrency but not *queue memory*:
//! under sustained overload the waiter queue itself grows without limit.
//! This semaphore accounts both dimensions:
//!
//! - **maxConcurrency**: simultaneous held tokens
//! - **maxOutstanding**: held tokens plus queued waiters
//! - **maxQueueMemory**: aggregate estimated bytes of queued acquires
//!
//! ## Overflow Strategies
//!
//! | Strategy     | When no slot is free                                     |
//! |--------------|----------------------------------------------------------|
//! | `Suspend`    | Queue FIFO and wait; reject once the queue caps are hit  |
//! | `DropNewest` | Reject the caller immediately                            |
//! | `DropOldest` | Queue; once caps are hit, preempt the oldest waiter      |
//! | `Fail`       | Reject immediately with a capacity-exhausted error       |
//!
//! ## Tokens
//!
//! Acquires yield a [`BackPressureToken`]: an RAII credit for one in-flight
//! execution slot. Dropping the token releases its slot exactly once;
//! double release and release-after-cancel are no-ops. The release path
//! hands the freed slot directly to the next live waiter, so slots never
//! bounce through an unlocked window where a newcomer could jump the FIFO
//! queue.
//!
//! ## Observability
//!
//! [`BackPressureSemaphore::snapshot`] exposes
//! `{in_use, queued, total_admitted, total_rejected, peak_in_use}` plus a
//! bucketed wait-time histogram for tuning queue depths.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use command_pipeline_domain::events::{event_names, EventEmitter, PipelineEvent};
use command_pipeline_domain::PipelineError;

/// Behavior when an acquire arrives and no slot is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackPressureStrategy {
    /// Enqueue and wait (FIFO) until a slot frees or the caller cancels.
    Suspend,
    /// Reject the incoming caller.
    DropNewest,
    /// Enqueue; when the queue caps are hit, preempt the oldest waiter
    /// instead of rejecting the newcomer.
    DropOldest,
    /// Reject immediately, signalling capacity exhaustion.
    Fail,
}

/// Semaphore configuration. All knobs have documented defaults.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BackPressureConfig {
    /// Number of simultaneously held tokens. Must be non-zero.
    pub max_concurrency: usize,
    /// Hard cap on held tokens plus queued waiters.
    pub max_outstanding: usize,
    /// Aggregate estimated size of queued acquires, in bytes.
    pub max_queue_memory: usize,
    /// Overflow strategy.
    pub strategy: BackPressureStrategy,
}

impl Default for BackPressureConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_outstanding: 50,
            max_queue_memory: 10 * 1024 * 1024,
            strategy: BackPressureStrategy::Suspend,
        }
    }
}

impl BackPressureConfig {
    /// Validates the configuration invariants.
    ///
    /// # Errors
    ///
    /// Zero `max_concurrency`, or `max_outstanding` below
    /// `max_concurrency`, fail with `invalidConfiguration`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_concurrency == 0 {
            return Err(PipelineError::invalid_config(
                "max_concurrency must be greater than zero",
            ));
        }
        if self.max_outstanding < self.max_concurrency {
            return Err(PipelineError::invalid_config(format!(
                "max_outstanding ({}) must be at least max_concurrency ({})",
                self.max_outstanding, self.max_concurrency
            )));
        }
        Ok(())
    }
}

/// Point-in-time view of semaphore usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackPressureSnapshot {
    /// Tokens currently held.
    pub in_use: usize,
    /// Waiters currently queued.
    pub queued: usize,
    /// Aggregate estimated bytes of queued acquires.
    pub queued_memory: usize,
    /// Tokens granted since construction.
    pub total_admitted: u64,
    /// Acquires refused (rejected, preempted, or exhausted).
    pub total_rejected: u64,
    /// High-water mark of held tokens.
    pub peak_in_use: usize,
}

/// Bucketed wait-time distribution for suspended acquires.
///
/// Averages hide tail latency; the fixed millisecond buckets
/// (0-1, 1-5, 5-10, 10-50, 50-100, 100+) surface it cheaply without a
/// full histogram dependency on the hot path.
#[derive(Debug)]
pub struct WaitHistogram {
    buckets: [AtomicU64; 6],
}

const WAIT_BUCKET_BOUNDS_MS: [u64; 5] = [1, 5, 10, 50, 100];

impl WaitHistogram {
    fn new() -> Self {
        Self {
            buckets: Default::default(),
        }
    }

    fn record(&self, wait_ms: u64) {
        let idx = WAIT_BUCKET_BOUNDS_MS
            .iter()
            .position(|&bound| wait_ms < bound)
            .unwrap_or(WAIT_BUCKET_BOUNDS_MS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Per-bucket counts, last bucket is 100ms+
    pub fn counts(&self) -> [u64; 6] {
        let mut out = [0; 6];
        for (slot, bucket) in out.iter_mut().zip(&self.buckets) {
            *slot = bucket.load(Ordering::Relaxed);
        }
        out
    }

    /// Total recorded waits
    pub fn count(&self) -> u64 {
        self.counts().iter().sum()
    }
}

struct Waiter {
    estimated_size: usize,
    granted: oneshot::Sender<Result<BackPressureToken, PipelineError>>,
    enqueued_at: Instant,
}

struct State {
    in_use: usize,
    queue: VecDeque<Waiter>,
    queued_memory: usize,
    total_admitted: u64,
    total_rejected: u64,
    peak_in_use: usize,
}

struct Core {
    config: BackPressureConfig,
    state: Mutex<State>,
    wait_histogram: WaitHistogram,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl Core {
    fn emit(&self, event: PipelineEvent) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(event);
        }
    }

    /// Returns a freed slot to the next live waiter, or to the pool.
    ///
    /// The slot travels as a [`BackPressureToken`] inside the channel: a
    /// waiter cancelled after the grant was sent drops the token, whose
    /// `Drop` re-releases the slot instead of leaking it.
    fn release_slot(core: &Arc<Core>) {
        let mut state = core.state.lock();
        state.in_use -= 1;
        // Hand the slot straight to the oldest waiter that is still
        // listening; cancelled waiters are skipped and never admitted.
        while let Some(waiter) = state.queue.pop_front() {
            state.queued_memory -= waiter.estimated_size;
            let wait_ms = waiter.enqueued_at.elapsed().as_millis() as u64;
            let token = BackPressureToken::new(Arc::clone(core));
            match waiter.granted.send(Ok(token)) {
                Ok(()) => {
                    state.in_use += 1;
                    state.total_admitted += 1;
                    state.peak_in_use = state.peak_in_use.max(state.in_use);
                    core.wait_histogram.record(wait_ms);
                    return;
                }
                Err(unclaimed) => {
                    // Receiver already gone. Defuse the never-delivered
                    // token so its Drop does not re-enter the held lock.
                    if let Ok(token) = unclaimed {
                        token.defuse();
                    }
                }
            }
        }
    }

    /// Drops waiters whose receiving side has gone away.
    fn prune_cancelled(state: &mut State) {
        let mut freed = 0;
        state.queue.retain(|w| {
            if w.granted.is_closed() {
                freed += w.estimated_size;
                false
            } else {
                true
            }
        });
        state.queued_memory -= freed;
    }
}

/// Bounded-concurrency semaphore with queue accounting.
///
/// Cheap to clone; clones share the same slots and statistics.
#[derive(Clone)]
pub struct BackPressureSemaphore {
    core: Arc<Core>,
}

impl BackPressureSemaphore {
    /// Creates a semaphore from a validated configuration.
    ///
    /// # Errors
    ///
    /// Propagates [`BackPressureConfig::validate`] failures; a zero
    /// `max_concurrency` is rejected here, at construction.
    pub fn new(config: BackPressureConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(Core {
                config,
                state: Mutex::new(State {
                    in_use: 0,
                    queue: VecDeque::new(),
                    queued_memory: 0,
                    total_admitted: 0,
                    total_rejected: 0,
                    peak_in_use: 0,
                }),
                wait_histogram: WaitHistogram::new(),
                emitter: None,
            }),
        })
    }

    /// Creates a semaphore that reports admission events to `emitter`
    pub fn with_emitter(
        config: BackPressureConfig,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(Core {
                config,
                state: Mutex::new(State {
                    in_use: 0,
                    queue: VecDeque::new(),
                    queued_memory: 0,
                    total_admitted: 0,
                    total_rejected: 0,
                    peak_in_use: 0,
                }),
                wait_histogram: WaitHistogram::new(),
                emitter: Some(emitter),
            }),
        })
    }

    /// The configuration this semaphore was built with
    pub fn config(&self) -> &BackPressureConfig {
        &self.core.config
    }

    /// Acquires an execution slot, applying the overflow strategy when
    /// none is free.
    ///
    /// `estimated_size` is the caller's queue-memory estimate for this
    /// acquire; pass 0 when unknown.
    ///
    /// # Errors
    ///
    /// - `backPressure.rejected`: strategy refused the caller
    /// - `backPressure.preempted`: a `DropOldest` newcomer displaced this
    ///   waiter
    /// - `backPressure.exhausted`: `Fail` strategy with no free slot
    pub async fn acquire(&self, estimated_size: usize) -> Result<BackPressureToken, PipelineError> {
        let receiver = {
            let mut state = self.core.state.lock();

            if state.in_use < self.core.config.max_concurrency {
                state.in_use += 1;
                state.total_admitted += 1;
                state.peak_in_use = state.peak_in_use.max(state.in_use);
                self.core
                    .emit(PipelineEvent::new(event_names::BACKPRESSURE_ACQUIRED).with_property("inUse", state.in_use));
                return Ok(BackPressureToken::new(Arc::clone(&self.core)));
            }

            match self.core.config.strategy {
                BackPressureStrategy::Fail => {
                    state.total_rejected += 1;
                    self.core.emit(
                        PipelineEvent::new(event_names::BACKPRESSURE_REJECTED).with_property("reason", "exhausted"),
                    );
                    return Err(PipelineError::BackPressureExhausted);
                }
                BackPressureStrategy::DropNewest => {
                    state.total_rejected += 1;
                    self.core.emit(
                        PipelineEvent::new(event_names::BACKPRESSURE_REJECTED).with_property("reason", "dropNewest"),
                    );
                    return Err(PipelineError::BackPressureRejected);
                }
                BackPressureStrategy::Suspend | BackPressureStrategy::DropOldest => {
                    Core::prune_cancelled(&mut state);

                    let over_outstanding =
                        state.in_use + state.queue.len() >= self.core.config.max_outstanding;
                    let over_memory =
                        state.queued_memory + estimated_size > self.core.config.max_queue_memory;

                    if over_outstanding || over_memory {
                        match self.core.config.strategy {
                            BackPressureStrategy::DropOldest => {
                                if let Some(oldest) = state.queue.pop_front() {
                                    state.queued_memory -= oldest.estimated_size;
                                    state.total_rejected += 1;
                                    let _ = oldest.granted.send(Err(PipelineError::BackPressurePreempted));
                                } else {
                                    // Nothing to preempt: the cap is consumed
                                    // entirely by held tokens.
                                    state.total_rejected += 1;
                                    return Err(PipelineError::BackPressureRejected);
                                }
                            }
                            _ => {
                                state.total_rejected += 1;
                                self.core.emit(
                                    PipelineEvent::new(event_names::BACKPRESSURE_REJECTED)
                                        .with_property("reason", "queueFull"),
                                );
                                return Err(PipelineError::BackPressureRejected);
                            }
                        }
                    }

                    let (tx, rx) = oneshot::channel();
                    state.queue.push_back(Waiter {
                        estimated_size,
                        granted: tx,
                        enqueued_at: Instant::now(),
                    });
                    state.queued_memory += estimated_size;
                    self.core.emit(
                        PipelineEvent::new(event_names::BACKPRESSURE_QUEUED)
                            .with_property("queued", state.queue.len()),
                    );
                    rx
                }
            }
        };

        // Queue slot held; wait for a release to hand us the token. If the
        // caller is cancelled here the receiver drops and the release path
        // skips us (or the in-flight grant releases itself).
        match receiver.await {
            Ok(Ok(token)) => {
                self.core.emit(PipelineEvent::new(event_names::BACKPRESSURE_ACQUIRED).with_property("queued", true));
                Ok(token)
            }
            Ok(Err(e)) => Err(e),
            // Semaphore dropped while we waited.
            Err(_) => Err(PipelineError::cancelled("back-pressure semaphore closed")),
        }
    }

    /// Non-blocking acquire; returns `None` when no slot is free
    pub fn try_acquire(&self) -> Option<BackPressureToken> {
        let mut state = self.core.state.lock();
        if state.in_use < self.core.config.max_concurrency {
            state.in_use += 1;
            state.total_admitted += 1;
            state.peak_in_use = state.peak_in_use.max(state.in_use);
            Some(BackPressureToken::new(Arc::clone(&self.core)))
        } else {
            None
        }
    }

    /// Current usage snapshot
    pub fn snapshot(&self) -> BackPressureSnapshot {
        let state = self.core.state.lock();
        BackPressureSnapshot {
            in_use: state.in_use,
            queued: state.queue.len(),
            queued_memory: state.queued_memory,
            total_admitted: state.total_admitted,
            total_rejected: state.total_rejected,
            peak_in_use: state.peak_in_use,
        }
    }

    /// Wait-time distribution of queued acquires
    pub fn wait_histogram(&self) -> &WaitHistogram {
        &self.core.wait_histogram
    }
}

impl std::fmt::Debug for BackPressureSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("BackPressureSemaphore")
            .field("config", &self.core.config)
            .field("in_use", &snapshot.in_use)
            .field("queued", &snapshot.queued)
            .finish()
    }
}

/// RAII credit for one in-flight execution slot.
///
/// Uniquely issued per acquire. Dropping the token releases its slot
/// exactly once; [`BackPressureToken::release`] and
/// [`BackPressureToken::cancel`] are explicit, idempotent forms of the
/// same release.
pub struct BackPressureToken {
    core: Arc<Core>,
    released: AtomicBool,
}

impl BackPressureToken {
    fn new(core: Arc<Core>) -> Self {
        Self {
            core,
            released: AtomicBool::new(false),
        }
    }

    /// Marks the token spent without touching the slot accounting.
    fn defuse(&self) {
        self.released.store(true, Ordering::Release);
    }

    fn release_once(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            Core::release_slot(&self.core);
        }
    }

    /// Releases the slot now; double release is a no-op
    pub fn release(self) {
        self.release_once();
    }

    /// Cancels the token, returning its slot; release-after-cancel is a
    /// no-op
    pub fn cancel(&self) {
        self.release_once();
    }

    /// Whether the slot has already been returned
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for BackPressureToken {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for BackPressureToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackPressureToken")
            .field("released", &self.is_released())
            .finish()
    }
}
