//! # Secret Store
//!
//! Storage abstraction for Kubernetes Secrets.
//!
//! All reads and writes of Secrets go through the [`SecretStore`] trait so
//! the reconciler can be exercised against an in-memory implementation in
//! tests while production code talks to the Kubernetes API server.

use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;

/// Storage trait for Kubernetes Secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret by name
    /// Returns `Ok(None)` when the secret does not exist; any other failure
    /// is propagated
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Create a new secret
    async fn create(&self, namespace: &str, secret: &Secret) -> Result<()>;

    /// Replace an existing secret
    async fn update(&self, namespace: &str, secret: &Secret) -> Result<()>;

    /// Delete a secret by name
    /// Deleting a secret that is already absent succeeds silently
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// List secrets matching a label selector
    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>>;
}

// Store implementations
pub mod kube;
pub mod memory;

pub use kube::KubeSecretStore;
pub use memory::MemorySecretStore;
