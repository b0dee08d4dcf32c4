//! # Cleanup Sweep
//!
//! Removes token state for users that are no longer declared: the
//! per-user Secret, its renewal timer, and (unless the account lives on
//! through extraConfig) the account's token entry in `argocd-secret`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use kube::ResourceExt;

use crate::controller::reconciler::argocd_secret::remove_account_token_entry;
use crate::controller::reconciler::timers::{timer_key, TimerGuard};
use crate::crd::ClusterArgoCD;
use crate::observability::metrics;
use crate::store::SecretStore;

use super::user_secrets::{local_user_selector, secret_username};

/// Sweep secrets belonging to users absent from the declared spec
///
/// Secrets are found through the component label, and the username is
/// recovered from the secret's own `user` field. A failure to sweep one
/// secret is logged and does not stop the rest of the sweep; the listing
/// itself failing aborts the pass.
pub async fn sweep_removed_users(
    store: &Arc<dyn SecretStore>,
    cr: &Arc<ClusterArgoCD>,
    namespace: &str,
    externally_managed: &HashSet<String>,
    timers: &mut TimerGuard<'_>,
) -> Result<usize> {
    let cr_name = cr.name_any();
    let declared: HashSet<&str> = cr
        .spec
        .local_users
        .iter()
        .map(|user| user.name.as_str())
        .collect();

    let secrets = store
        .list(namespace, &local_user_selector(&cr_name))
        .await?;

    let mut swept = 0;
    for secret in &secrets {
        let secret_name = secret.name_any();
        let Some(username) = secret_username(secret) else {
            tracing::warn!(
                secret = %secret_name,
                namespace = %namespace,
                "User secret carries no user field; leaving it in place"
            );
            continue;
        };
        if declared.contains(username.as_str()) {
            continue;
        }

        let result = remove_secret_state(
            store,
            namespace,
            &secret_name,
            &username,
            !externally_managed.contains(&username),
            timers,
        )
        .await;
        match result {
            Ok(()) => {
                tracing::info!(
                    user = %username,
                    namespace = %namespace,
                    secret = %secret_name,
                    "Swept token state for removed user"
                );
                metrics::increment_secrets_swept();
                swept += 1;
            }
            Err(e) => {
                tracing::error!(
                    user = %username,
                    namespace = %namespace,
                    "Failed to sweep removed user: {e:#}"
                );
                metrics::increment_user_errors();
            }
        }
    }

    Ok(swept)
}

async fn remove_secret_state(
    store: &Arc<dyn SecretStore>,
    namespace: &str,
    secret_name: &str,
    username: &str,
    clear_account_entry: bool,
    timers: &mut TimerGuard<'_>,
) -> Result<()> {
    timers.disarm(&timer_key(namespace, username));
    store.delete(namespace, secret_name).await?;
    if clear_account_entry {
        remove_account_token_entry(store.as_ref(), namespace, username).await?;
    }
    Ok(())
}
