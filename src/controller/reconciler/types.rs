//! # Types
//!
//! Core types for the reconciler.

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::local_users::LocalUserContext;
use crate::store::KubeSecretStore;
use crate::store::SecretStore;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
    #[error("Finalizer failed: {0}")]
    FinalizerFailed(#[source] Box<kube::runtime::finalizer::Error<Self>>),
}

impl From<kube::runtime::finalizer::Error<Self>> for ReconcilerError {
    fn from(error: kube::runtime::finalizer::Error<Self>) -> Self {
        Self::FinalizerFailed(Box::new(error))
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10), // 1 minute min, 10 minutes max (converted to seconds internally)
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct Reconciler {
    pub client: Client,
    /// Token state for the local-user pass: secret store plus renewal timers.
    /// Shared across reconciliations so timers armed in one pass survive the next.
    pub users: LocalUserContext,
    /// Interval between periodic reconciliations of a healthy resource
    pub reconcile_interval: Duration,
    // Backoff state per resource (identified by namespace/name)
    // Lives in the error_policy() layer to keep the happy path lock-free
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("reconcile_interval", &self.reconcile_interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(client: Client, reconcile_interval: Duration) -> Self {
        let store: Arc<dyn SecretStore> = Arc::new(KubeSecretStore::new(client.clone()));
        Self {
            client,
            users: LocalUserContext::new(store),
            reconcile_interval,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}
