//! # Kubernetes Secret Store
//!
//! [`SecretStore`] implementation backed by the Kubernetes API server.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::core::ErrorResponse;
use kube::Client;

use crate::store::SecretStore;

/// Secret store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    /// Create a store using the given Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        match self.api(namespace).get(name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => Ok(None),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to get secret {namespace}/{name}")
            }),
        }
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<()> {
        let name = secret
            .metadata
            .name
            .as_deref()
            .context("Cannot create a secret without a name")?;
        self.api(namespace)
            .create(&PostParams::default(), secret)
            .await
            .with_context(|| format!("Failed to create secret {namespace}/{name}"))?;
        Ok(())
    }

    async fn update(&self, namespace: &str, secret: &Secret) -> Result<()> {
        let name = secret
            .metadata
            .name
            .as_deref()
            .context("Cannot update a secret without a name")?;
        self.api(namespace)
            .replace(name, &PostParams::default(), secret)
            .await
            .with_context(|| format!("Failed to update secret {namespace}/{name}"))?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            // Already gone counts as deleted
            Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to delete secret {namespace}/{name}")
            }),
        }
    }

    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>> {
        let params = ListParams::default().labels(label_selector);
        let secrets = self
            .api(namespace)
            .list(&params)
            .await
            .with_context(|| {
                format!("Failed to list secrets in {namespace} matching {label_selector}")
            })?;
        Ok(secrets.items)
    }
}
