//! # ClusterArgoCD Spec
//!
//! Main CRD specification types and default values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ClusterArgoCD Custom Resource Definition
///
/// This CRD declares an Argo CD installation whose local user accounts are
/// managed by this controller: for every declared user with the `apiKey`
/// capability, the controller issues a signed API token, persists it in a
/// per-user Secret, and keeps the Argo CD authentication layer in sync.
///
/// # Example
///
/// ```yaml
/// apiVersion: argoproj.io/v1alpha1
/// kind: ClusterArgoCD
/// metadata:
///   name: argocd
///   namespace: argocd
/// spec:
///   localUsers:
///     - name: ci-deployer
///       apiKey: true
///       tokenLifetime: 30d
///       autoRenewToken: true
///     - name: readonly-probe
///       tokenLifetime: "0"
///   extraConfig:
///     accounts.legacy-bot: "apiKey, login"
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ClusterArgoCD",
    group = "argoproj.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ClusterArgoCDStatus",
    shortname = "cacd",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Users", "type":"integer", "jsonPath":".status.localUsers"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterArgoCDSpec {
    /// Local user accounts managed by this controller
    /// Each entry declares an Argo CD account whose API token is issued,
    /// persisted, and renewed automatically
    #[serde(default)]
    pub local_users: Vec<LocalUserSpec>,
    /// Free-form extra configuration merged into the Argo CD ConfigMap
    /// Accounts declared here via `accounts.<name>` keys are considered
    /// externally managed and are skipped by token reconciliation
    #[serde(default)]
    pub extra_config: BTreeMap<String, String>,
}

/// A single declared local user account
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalUserSpec {
    /// Account name, unique within the ClusterArgoCD instance
    /// Used as the token subject and in the generated Secret name
    pub name: String,
    /// Grant the apiKey capability
    /// When unset the capability is granted; an explicit `false` on a user
    /// with an issued token tears the token, Secret, and renewal timer down
    /// Default: true
    #[serde(default)]
    pub api_key: Option<bool>,
    /// Lifetime of issued tokens as a duration string (e.g. "30d", "12h", "90m")
    /// An empty string or "0" issues a non-expiring token
    /// Default: "0" (never expires)
    #[serde(default)]
    pub token_lifetime: Option<String>,
    /// Re-issue the token automatically when its lifetime elapses
    /// Only meaningful for expiring tokens
    /// Default: true
    #[serde(default)]
    pub auto_renew_token: Option<bool>,
}

impl LocalUserSpec {
    /// Whether the apiKey capability is granted for this account
    pub fn api_key_enabled(&self) -> bool {
        self.api_key.unwrap_or(true)
    }

    /// The declared token lifetime string, defaulting to "0" (never expires)
    pub fn declared_lifetime(&self) -> &str {
        self.token_lifetime.as_deref().unwrap_or("0")
    }

    /// Whether expiring tokens are re-issued automatically
    pub fn auto_renew(&self) -> bool {
        self.auto_renew_token.unwrap_or(true)
    }
}
