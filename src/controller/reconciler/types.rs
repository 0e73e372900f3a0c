//! # Types
//!
//! Core types for the reconciler.

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::{ResourceStore, StoreError};
use crate::keto::{AcpEngine, EngineError};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The resource can never be applied as written
    #[error("{0}")]
    Validation(String),
}

impl ReconcilerError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcilerError::Store(StoreError::Conflict))
    }
}

/// Timing settings of the reconciler
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerSettings {
    /// Requeue interval after a successful reconciliation
    pub sync_period: Duration,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared context of the reconciliations of one kind
pub struct Reconciler<K> {
    pub store: Arc<dyn ResourceStore<K>>,
    pub engine: Arc<dyn AcpEngine>,
    pub settings: ReconcilerSettings,
    // Backoff state per resource (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl<K> Clone for Reconciler<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            engine: Arc::clone(&self.engine),
            settings: self.settings,
            backoff_states: Arc::clone(&self.backoff_states),
        }
    }
}

impl<K> fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<K> Reconciler<K> {
    pub fn new(
        store: Arc<dyn ResourceStore<K>>,
        engine: Arc<dyn AcpEngine>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            store,
            engine,
            settings,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}
