//! Common test utilities for reconciler integration tests
//!
//! Builders for the ClusterArgoCD resources and pre-seeded secret stores
//! the integration tests drive the reconciler with.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;

use argocd_local_user_controller::constants::{ARGOCD_SECRET_NAME, SERVER_SECRET_KEY_FIELD};
use argocd_local_user_controller::crd::{ClusterArgoCD, ClusterArgoCDSpec, LocalUserSpec};
use argocd_local_user_controller::store::{MemorySecretStore, SecretStore};

/// HMAC key seeded into the test `argocd-secret`
pub const SIGNING_KEY: &[u8] = b"integration-test-signing-key";

/// A ClusterArgoCD named `argocd` in the given namespace
pub fn cluster_argocd(namespace: &str, users: Vec<LocalUserSpec>) -> Arc<ClusterArgoCD> {
    cluster_argocd_with_extra_config(namespace, users, BTreeMap::new())
}

pub fn cluster_argocd_with_extra_config(
    namespace: &str,
    users: Vec<LocalUserSpec>,
    extra_config: BTreeMap<String, String>,
) -> Arc<ClusterArgoCD> {
    let mut cr = ClusterArgoCD::new(
        "argocd",
        ClusterArgoCDSpec {
            local_users: users,
            extra_config,
        },
    );
    cr.metadata.namespace = Some(namespace.to_string());
    cr.metadata.uid = Some("test-uid".to_string());
    Arc::new(cr)
}

/// A declared user with the apiKey capability granted
pub fn user(name: &str, lifetime: &str, auto_renew: bool) -> LocalUserSpec {
    LocalUserSpec {
        name: name.to_string(),
        api_key: Some(true),
        token_lifetime: Some(lifetime.to_string()),
        auto_renew_token: Some(auto_renew),
    }
}

/// In-memory store pre-seeded with an `argocd-secret` carrying [`SIGNING_KEY`]
pub async fn seeded_store(namespace: &str) -> MemorySecretStore {
    let store = MemorySecretStore::new();
    let mut data = BTreeMap::new();
    data.insert(
        SERVER_SECRET_KEY_FIELD.to_string(),
        ByteString(SIGNING_KEY.to_vec()),
    );
    store
        .create(
            namespace,
            &Secret {
                metadata: ObjectMeta {
                    name: Some(ARGOCD_SECRET_NAME.to_string()),
                    namespace: Some(namespace.to_string()),
                    ..Default::default()
                },
                data: Some(data),
                ..Default::default()
            },
        )
        .await
        .expect("seeding the signing secret should succeed");
    store
}
