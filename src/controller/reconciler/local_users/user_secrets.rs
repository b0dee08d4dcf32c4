//! # User Secret Records
//!
//! Codec between [`UserSecretRecord`] and the per-user Kubernetes Secret
//! that persists it. One Secret exists per managed local user, created on
//! first token issuance and deleted on revocation or sweep.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::constants::{
    API_TOKEN_FIELD, AUTO_RENEW_FIELD, COMPONENT_LABEL, EXP_AT_FIELD, LOCAL_USER_COMPONENT,
    MANAGED_BY_LABEL, TOKEN_LIFETIME_FIELD, USER_FIELD,
};
use crate::crd::ClusterArgoCD;

/// Persisted state for one managed local user
///
/// `exp_at`, `token_lifetime`, and `auto_renew` always describe the
/// configuration that produced the stored `api_token`; comparing them
/// against the declared spec is the only drift signal the reconciler has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSecretRecord {
    pub user: String,
    pub api_token: String,
    /// Epoch seconds the token expires, 0 for never
    pub exp_at: i64,
    pub token_lifetime: String,
    pub auto_renew: bool,
}

/// Name of the Secret holding a user's record
pub fn user_secret_name(cr_name: &str, username: &str) -> String {
    format!("{cr_name}-{username}-local-user")
}

/// Label selector matching every user secret owned by one ClusterArgoCD
pub fn local_user_selector(cr_name: &str) -> String {
    format!("{COMPONENT_LABEL}={LOCAL_USER_COMPONENT},{MANAGED_BY_LABEL}={cr_name}")
}

/// Username recorded in a user secret, if any
///
/// The sweep uses this to recover identity from listed secrets without
/// requiring the rest of the record to parse.
pub fn secret_username(secret: &Secret) -> Option<String> {
    string_field(secret, USER_FIELD)
}

fn string_field(secret: &Secret, field: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(field))
        .and_then(|value| String::from_utf8(value.0.clone()).ok())
}

impl UserSecretRecord {
    /// Parse a record out of its Secret
    ///
    /// A missing `user` or `apiToken` field, or a non-integer `expAt`,
    /// is an error for this one user; other users are unaffected.
    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let name = secret.name_any();

        let user = string_field(secret, USER_FIELD)
            .ok_or_else(|| anyhow!("Secret {name} has no {USER_FIELD} field"))?;
        let api_token = string_field(secret, API_TOKEN_FIELD)
            .ok_or_else(|| anyhow!("Secret {name} has no {API_TOKEN_FIELD} field"))?;
        let exp_at = string_field(secret, EXP_AT_FIELD)
            .ok_or_else(|| anyhow!("Secret {name} has no {EXP_AT_FIELD} field"))?
            .parse::<i64>()
            .with_context(|| format!("Secret {name} has a malformed {EXP_AT_FIELD} value"))?;

        // Older records may lack these fields; the defaults read as drift
        // and trigger one corrective re-issuance
        let token_lifetime = string_field(secret, TOKEN_LIFETIME_FIELD).unwrap_or_default();
        let auto_renew = string_field(secret, AUTO_RENEW_FIELD)
            .map(|value| value == "true")
            .unwrap_or(false);

        Ok(Self {
            user,
            api_token,
            exp_at,
            token_lifetime,
            auto_renew,
        })
    }

    /// The five data fields of the persisted record
    pub fn record_data(&self) -> BTreeMap<String, ByteString> {
        let mut data = BTreeMap::new();
        data.insert(
            USER_FIELD.to_string(),
            ByteString(self.user.clone().into_bytes()),
        );
        data.insert(
            API_TOKEN_FIELD.to_string(),
            ByteString(self.api_token.clone().into_bytes()),
        );
        data.insert(
            EXP_AT_FIELD.to_string(),
            ByteString(self.exp_at.to_string().into_bytes()),
        );
        data.insert(
            TOKEN_LIFETIME_FIELD.to_string(),
            ByteString(self.token_lifetime.clone().into_bytes()),
        );
        data.insert(
            AUTO_RENEW_FIELD.to_string(),
            ByteString(self.auto_renew.to_string().into_bytes()),
        );
        data
    }

    /// Build a new Secret for this record, owned by the given ClusterArgoCD
    ///
    /// The owner reference lets cluster garbage collection remove the
    /// secret if the CR itself disappears; the labels make it discoverable
    /// by the sweep's list query.
    pub fn to_secret(&self, cr: &ClusterArgoCD) -> Secret {
        let cr_name = cr.name_any();
        let labels = BTreeMap::from([
            (
                COMPONENT_LABEL.to_string(),
                LOCAL_USER_COMPONENT.to_string(),
            ),
            (MANAGED_BY_LABEL.to_string(), cr_name.clone()),
        ]);

        Secret {
            metadata: ObjectMeta {
                name: Some(user_secret_name(&cr_name, &self.user)),
                namespace: cr.namespace(),
                labels: Some(labels),
                owner_references: cr.controller_owner_ref(&()).map(|oref| vec![oref]),
                ..Default::default()
            },
            data: Some(self.record_data()),
            ..Default::default()
        }
    }

    /// Replace the record fields inside an existing Secret, preserving its
    /// metadata (including the resourceVersion needed for the update)
    pub fn write_into(&self, secret: &mut Secret) {
        secret.data = Some(self.record_data());
    }
}
