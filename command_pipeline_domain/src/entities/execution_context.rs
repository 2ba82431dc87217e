// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Context Entity
//!
//! The `ExecutionContext` entity maintains runtime state throughout one
//! pipeline invocation. It serves as the central carrier object that every
//! middleware reads and writes while a command travels toward its handler.
//!
//! ## Overview
//!
//! The execution context acts as a stateful carrier that:
//!
//! - **Carries Metadata**: Holds the immutable [`CommandMetadata`] record
//! - **Stores Values**: A typed, concurrency-safe key/value map
//! - **Tracks Time**: Start instant for durations, optional deadline
//! - **Emits Events**: Optional reference to the invocation's event emitter
//! - **Forks**: Snapshot children for parallel composition
//!
//! ## Concurrency Discipline
//!
//! The value map sits behind a single `RwLock`: writes appear atomic,
//! readers never observe torn values, and reads/writes against the same key
//! are linearizable. Values are stored as `Arc<dyn Any>` so heterogeneous
//! types coexist; [`ContextKey`] carries the type downcast so lookups stay
//! type-safe at the call site.
//!
//! Lock scope is always a single map operation; the lock is never held
//! across an `.await`, so the context is safe to share by reference across
//! suspension points.
//!
//! ## Fork Semantics
//!
//! [`ExecutionContext::fork`] produces a child sharing the metadata and
//! emitter, with a **snapshot copy** of the value map and an inherited
//! deadline. Writes to the child are not visible in the parent; a caller
//! that wants child results back merges them explicitly with
//! [`ExecutionContext::merge_from`].
//!
//! ## Lifecycle
//!
//! Created at dispatch entry, passed through every middleware, disposed
//! after the handler returns. `set` after disposal is a silent no-op;
//! `get` of an unknown key returns `None` (no error either way).

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::entities::CommandMetadata;
use crate::events::{EventEmitter, PipelineEvent};
use crate::value_objects::Deadline;

type StoredValue = Arc<dyn Any + Send + Sync>;

/// Typed key into the context value map.
///
/// The key's name identifies the slot; the type parameter travels only in
/// the signature, so two keys with the same name and different types refer
/// to the same slot (the later write wins, and a mismatched `get` returns
/// `None` after the failed downcast).
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    /// Creates a key for the given slot name
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Gets the slot name
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> std::fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

/// Mutable, concurrency-safe state bag scoped to one pipeline invocation.
///
/// Shared by reference (or `Arc`) across the middleware chain. All mutation
/// goes through the interior lock; the entity itself is handed around
/// immutably.
pub struct ExecutionContext {
    // Identity fields (always first)
    metadata: CommandMetadata,

    // Core state
    values: RwLock<HashMap<&'static str, StoredValue>>,
    deadline: RwLock<Option<Deadline>>,
    emitter: Option<Arc<dyn EventEmitter>>,
    fork_depth: u32,
    disposed: AtomicBool,

    // Metadata fields (always last)
    started_at: Instant,
}

impl ExecutionContext {
    /// Creates a context for a new invocation
    pub fn new(metadata: CommandMetadata) -> Self {
        Self {
            metadata,
            values: RwLock::new(HashMap::new()),
            deadline: RwLock::new(None),
            emitter: None,
            fork_depth: 0,
            disposed: AtomicBool::new(false),
            started_at: Instant::now(),
        }
    }

    /// Creates a context with an event emitter bound
    pub fn with_emitter(metadata: CommandMetadata, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            emitter: Some(emitter),
            ..Self::new(metadata)
        }
    }

    /// Compatibility adapter for metadata-only callers.
    ///
    /// Synthesizes a fresh context (empty map, no emitter) around an
    /// existing metadata record, for bridging call sites that predate the
    /// context-bearing signature.
    pub fn from_metadata(metadata: CommandMetadata) -> Self {
        Self::new(metadata)
    }

    /// Gets the immutable invocation metadata
    pub fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    /// Gets the bound event emitter, if any
    pub fn emitter(&self) -> Option<&Arc<dyn EventEmitter>> {
        self.emitter.as_ref()
    }

    /// Instant the invocation entered the pipeline
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Elapsed time since dispatch entry
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// How many forks deep this context is (0 for the root)
    pub fn fork_depth(&self) -> u32 {
        self.fork_depth
    }

    /// Reads the value stored under `key`, if present and of the right type.
    ///
    /// Unknown keys return `None`; this is not an error.
    pub fn get<T: Send + Sync + 'static>(&self, key: &ContextKey<T>) -> Option<Arc<T>> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key.name).cloned().and_then(|v| v.downcast::<T>().ok())
    }

    /// Stores `value` under `key`.
    ///
    /// Writes after [`ExecutionContext::dispose`] are silently dropped: the
    /// invocation is over and nobody will read them.
    pub fn set<T: Send + Sync + 'static>(&self, key: &ContextKey<T>, value: T) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.name, Arc::new(value));
    }

    /// Removes the value under `key`, returning it if it was present
    pub fn remove<T: Send + Sync + 'static>(&self, key: &ContextKey<T>) -> Option<Arc<T>> {
        if self.disposed.load(Ordering::Acquire) {
            return None;
        }
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key.name).and_then(|v| v.downcast::<T>().ok())
    }

    /// Atomically replaces the value under `key` with `f(current)`.
    ///
    /// The write lock is held across the closure, so concurrent updates to
    /// the same key serialize rather than losing writes. The closure gets
    /// `None` when the slot is empty or holds a different type.
    pub fn update<T, F>(&self, key: &ContextKey<T>, f: F)
    where
        T: Send + Sync + 'static,
        F: FnOnce(Option<&T>) -> T,
    {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        let current = values.get(key.name).and_then(|v| v.downcast_ref::<T>());
        let next = f(current);
        values.insert(key.name, Arc::new(next));
    }

    /// Checks whether any value is stored under `key` (regardless of type)
    pub fn contains<T>(&self, key: &ContextKey<T>) -> bool {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.contains_key(key.name)
    }

    /// Current effective deadline, if one has been set
    pub fn deadline(&self) -> Option<Deadline> {
        *self.deadline.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Installs a deadline, min-combining with any existing one.
    ///
    /// Deadlines only shrink: setting a later deadline than the current one
    /// has no effect, so a child can never extend its parent's budget.
    pub fn set_deadline(&self, deadline: Deadline) {
        let mut slot = self.deadline.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(deadline.min_opt(*slot));
    }

    /// Forks a child context for a parallel branch.
    ///
    /// The child shares metadata and emitter, inherits the deadline, and
    /// starts from a snapshot copy of the value map. Subsequent writes to
    /// either side are invisible to the other.
    pub fn fork(&self) -> ExecutionContext {
        let snapshot = self.values.read().unwrap_or_else(|e| e.into_inner()).clone();
        ExecutionContext {
            metadata: self.metadata.clone(),
            values: RwLock::new(snapshot),
            deadline: RwLock::new(self.deadline()),
            emitter: self.emitter.clone(),
            fork_depth: self.fork_depth + 1,
            disposed: AtomicBool::new(false),
            started_at: self.started_at,
        }
    }

    /// Explicitly merges another context's values into this one.
    ///
    /// Entries from `other` overwrite same-named entries here. This is the
    /// only way forked-child writes ever reach a parent.
    pub fn merge_from(&self, other: &ExecutionContext) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let snapshot = other.values.read().unwrap_or_else(|e| e.into_inner()).clone();
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        for (k, v) in snapshot {
            values.insert(k, v);
        }
    }

    /// Marks the invocation finished; later writes become no-ops
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Checks whether the context has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Emits an event through the bound emitter, stamping the invocation's
    /// correlation id. No-op when no emitter is bound.
    pub fn emit(&self, event: PipelineEvent) {
        if let Some(emitter) = &self.emitter {
            let event = match self.metadata.correlation_id() {
                Some(correlation) => event.with_correlation_id(correlation),
                None => event,
            };
            emitter.emit(event);
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("metadata", &self.metadata)
            .field("fork_depth", &self.fork_depth)
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
