//! # Renewal Timer Registry
//!
//! Process-wide registry of armed token renewal timers, keyed by
//! `namespace/username`. One mutex guards the whole map; the same mutex is
//! held across token issuance so that a timer-fired renewal and a
//! reconciler-driven renewal for the same user can never interleave.
//!
//! At most one timer is live per key: arming a key always cancels and
//! removes any existing entry first. Cancellation sets a `stopped` flag
//! before aborting the sleeper task; a fire that has already woken up
//! re-checks that flag after acquiring the mutex, so a cancellation that
//! races the wakeup still wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Timer key for a user: `namespace/username`
pub fn timer_key(namespace: &str, username: &str) -> String {
    format!("{namespace}/{username}")
}

/// Work performed when a renewal timer fires
///
/// The task runs while the registry mutex is held and receives the guard,
/// so it can re-arm its own key without racing other timer operations.
#[async_trait]
pub trait RenewalTask: Send + Sync + 'static {
    async fn run(&self, timers: &mut TimerGuard<'_>);
}

#[derive(Debug)]
struct TimerEntry {
    stopped: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    fire_at: DateTime<Utc>,
}

/// Registry of armed renewal timers
///
/// Cheap to clone; all clones share the same map and mutex.
#[derive(Debug, Clone, Default)]
pub struct RenewalTimerRegistry {
    inner: Arc<Mutex<HashMap<String, TimerEntry>>>,
}

impl RenewalTimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the registry mutex
    ///
    /// Callers hold the returned guard for the full duration of any
    /// operation that arms or disarms timers, including token issuance.
    pub async fn lock(&self) -> TimerGuard<'_> {
        TimerGuard {
            map: self.inner.lock().await,
            registry: self.clone(),
        }
    }
}

/// Exclusive access to the timer map
///
/// All arm/disarm operations go through a guard, which proves the registry
/// mutex is held for their entire body.
#[derive(Debug)]
pub struct TimerGuard<'a> {
    map: MutexGuard<'a, HashMap<String, TimerEntry>>,
    registry: RenewalTimerRegistry,
}

impl TimerGuard<'_> {
    /// Arm a timer for `key`, replacing any existing one
    ///
    /// The existing entry (if any) is stopped and removed before the new
    /// sleeper is installed, so two live timers can never exist for one key.
    pub fn arm(&mut self, key: &str, fire_at: DateTime<Utc>, task: Arc<dyn RenewalTask>) {
        self.disarm(key);

        let stopped = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn({
            let registry = self.registry.clone();
            let stopped = Arc::clone(&stopped);
            let key = key.to_string();
            async move {
                let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(delay).await;

                let mut guard = registry.lock().await;
                if stopped.load(Ordering::SeqCst) {
                    // Lost the race against a disarm that happened between
                    // wakeup and lock acquisition
                    return;
                }
                // Remove our own entry before running the task: if the task
                // re-arms this key, arm() must not abort the very task that
                // is executing it.
                guard.map.remove(&key);
                task.run(&mut guard).await;
            }
        });

        self.map.insert(
            key.to_string(),
            TimerEntry {
                stopped,
                handle,
                fire_at,
            },
        );
    }

    /// Cancel and remove the timer for `key`, if one exists
    pub fn disarm(&mut self, key: &str) {
        if let Some(entry) = self.map.remove(key) {
            entry.stopped.store(true, Ordering::SeqCst);
            entry.handle.abort();
        }
    }

    /// Cancel and remove every timer whose key starts with `prefix`
    ///
    /// Used on namespace teardown with the `namespace/` prefix.
    pub fn disarm_all(&mut self, prefix: &str) {
        let keys: Vec<String> = self
            .map
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in keys {
            self.disarm(&key);
        }
    }

    /// Whether a timer is currently armed for `key`
    pub fn is_armed(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// When the timer for `key` will fire, if one is armed
    pub fn fire_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.map.get(key).map(|entry| entry.fire_at)
    }

    /// Number of currently armed timers
    pub fn armed_count(&self) -> usize {
        self.map.len()
    }
}
