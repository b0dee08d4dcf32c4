//! # Argo CD Shared Secret
//!
//! Access to the `argocd-secret` Secret this controller shares with the
//! Argo CD server: the HMAC signing key under `server.secretkey`, and the
//! per-account `accounts.<name>.tokens` entries the authentication layer
//! consults when it verifies an API token.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::constants::{ARGOCD_SECRET_NAME, SERVER_SECRET_KEY_FIELD};
use crate::store::SecretStore;

/// Metadata describing one issued token, mirrored into `argocd-secret`
///
/// Field names are a wire contract with the Argo CD authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTokenEntry {
    pub id: String,
    pub issued_at: i64,
    /// Epoch seconds, 0 for tokens that never expire
    pub expires_at: i64,
}

/// Secret field carrying the token list for an account
pub fn account_tokens_field(username: &str) -> String {
    format!("accounts.{username}.tokens")
}

/// Fetch the HMAC signing key for a control-plane namespace
///
/// A missing `argocd-secret`, or a secret without the `server.secretkey`
/// field, means no token can be signed at all and aborts the whole
/// reconcile pass.
pub async fn get_signing_key(
    store: &dyn SecretStore,
    namespace: &str,
) -> Result<Zeroizing<Vec<u8>>> {
    let secret = store
        .get(namespace, ARGOCD_SECRET_NAME)
        .await?
        .ok_or_else(|| anyhow!("Signing secret {namespace}/{ARGOCD_SECRET_NAME} not found"))?;

    let key = secret
        .data
        .as_ref()
        .and_then(|data| data.get(SERVER_SECRET_KEY_FIELD))
        .ok_or_else(|| {
            anyhow!(
                "Signing secret {namespace}/{ARGOCD_SECRET_NAME} has no {SERVER_SECRET_KEY_FIELD} field"
            )
        })?;

    Ok(Zeroizing::new(key.0.clone()))
}

/// Overwrite the token list for an account with exactly one entry
///
/// The list always describes the newest token only. The Argo CD server
/// resolves API tokens against it, so a failure here leaves a freshly
/// issued token unusable and must be propagated.
pub async fn write_account_token_entry(
    store: &dyn SecretStore,
    namespace: &str,
    username: &str,
    entry: &AccountTokenEntry,
) -> Result<()> {
    let mut secret = store
        .get(namespace, ARGOCD_SECRET_NAME)
        .await?
        .ok_or_else(|| anyhow!("Signing secret {namespace}/{ARGOCD_SECRET_NAME} not found"))?;

    let tokens = serde_json::to_vec(std::slice::from_ref(entry))
        .context("Failed to serialize account token entry")?;
    secret
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(account_tokens_field(username), ByteString(tokens));

    store.update(namespace, &secret).await
}

/// Remove the token list for an account, if present
///
/// Both a missing `argocd-secret` and an already-absent entry succeed
/// silently.
pub async fn remove_account_token_entry(
    store: &dyn SecretStore,
    namespace: &str,
    username: &str,
) -> Result<()> {
    let Some(mut secret) = store.get(namespace, ARGOCD_SECRET_NAME).await? else {
        return Ok(());
    };

    let field = account_tokens_field(username);
    let had_entry = secret
        .data
        .as_mut()
        .map(|data| data.remove(&field).is_some())
        .unwrap_or(false);

    if had_entry {
        store.update(namespace, &secret).await?;
    }
    Ok(())
}

/// Read back the token list recorded for an account
///
/// Returns an empty list when the shared secret or the account's field is
/// absent.
pub async fn read_account_token_entries(
    store: &dyn SecretStore,
    namespace: &str,
    username: &str,
) -> Result<Vec<AccountTokenEntry>> {
    let Some(secret) = store.get(namespace, ARGOCD_SECRET_NAME).await? else {
        return Ok(Vec::new());
    };

    let field = account_tokens_field(username);
    match secret.data.as_ref().and_then(|data| data.get(&field)) {
        Some(raw) => serde_json::from_slice(&raw.0)
            .with_context(|| format!("Malformed token list in field {field}")),
        None => Ok(Vec::new()),
    }
}
