//! # In-Memory Secret Store
//!
//! [`SecretStore`] implementation holding Secrets in a process-local map.
//! Used by tests to exercise the reconciler without a Kubernetes API server.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;

use crate::store::SecretStore;

/// In-memory secret store keyed by `namespace/name`
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    inner: Arc<Mutex<BTreeMap<String, Secret>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent create/update/delete fail
    /// Lets tests simulate an unreachable API server mid-flight
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Names of all secrets currently stored in a namespace
    pub fn secret_names(&self, namespace: &str) -> Vec<String> {
        let prefix = format!("{namespace}/");
        match self.inner.lock() {
            Ok(map) => map
                .keys()
                .filter_map(|key| key.strip_prefix(&prefix))
                .map(String::from)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Secret>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("In-memory secret store lock poisoned"))
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("Simulated secret store write failure");
        }
        Ok(())
    }

    fn key(namespace: &str, name: &str) -> String {
        format!("{namespace}/{name}")
    }
}

fn matches_selector(secret: &Secret, label_selector: &str) -> bool {
    if label_selector.is_empty() {
        return true;
    }
    let labels = secret.metadata.labels.clone().unwrap_or_default();
    label_selector.split(',').all(|pair| match pair.split_once('=') {
        Some((key, value)) => labels
            .get(key.trim())
            .is_some_and(|have| have == value.trim()),
        None => false,
    })
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let map = self.lock()?;
        Ok(map.get(&Self::key(namespace, name)).cloned())
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<()> {
        self.check_writable()?;
        let name = secret
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| anyhow!("Cannot create a secret without a name"))?;
        let key = Self::key(namespace, name);
        let mut map = self.lock()?;
        if map.contains_key(&key) {
            bail!("Secret {key} already exists");
        }
        map.insert(key, secret.clone());
        Ok(())
    }

    async fn update(&self, namespace: &str, secret: &Secret) -> Result<()> {
        self.check_writable()?;
        let name = secret
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| anyhow!("Cannot update a secret without a name"))?;
        let key = Self::key(namespace, name);
        let mut map = self.lock()?;
        if !map.contains_key(&key) {
            bail!("Secret {key} not found");
        }
        map.insert(key, secret.clone());
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.check_writable()?;
        let mut map = self.lock()?;
        map.remove(&Self::key(namespace, name));
        Ok(())
    }

    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>> {
        let prefix = format!("{namespace}/");
        let map = self.lock()?;
        Ok(map
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, secret)| matches_selector(secret, label_selector))
            .map(|(_, secret)| secret.clone())
            .collect())
    }
}
