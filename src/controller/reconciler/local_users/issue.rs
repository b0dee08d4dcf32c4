//! # Token Issuance
//!
//! Mints a token for one user and persists every artifact that must stay
//! consistent with it: the per-user Secret record, the account's token
//! entry in `argocd-secret`, and the renewal timer. Callers hold the timer
//! registry mutex for the whole call, so concurrent issuance attempts for
//! any user are serialized process-wide.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use kube::ResourceExt;
use uuid::Uuid;

use crate::controller::reconciler::argocd_secret::{
    get_signing_key, write_account_token_entry, AccountTokenEntry,
};
use crate::controller::reconciler::timers::{timer_key, RenewalTask, TimerGuard};
use crate::crd::ClusterArgoCD;
use crate::observability::metrics;
use crate::store::SecretStore;
use crate::token;

use super::decision::IssueReason;
use super::user_secrets::{user_secret_name, UserSecretRecord};

/// Per-user inputs to one issuance
#[derive(Debug)]
pub struct IssueParams<'a> {
    pub username: &'a str,
    /// Raw declared lifetime string, persisted verbatim for drift detection
    pub lifetime: &'a str,
    pub lifetime_secs: u64,
    pub auto_renew: bool,
    pub reason: IssueReason,
}

/// Issue a token for one user and persist it
///
/// The user Secret write is the durability point: a crash before it leaves
/// the previous token (if any) valid. The `argocd-secret` entry write after
/// it must succeed for the new token to be usable, so its failure is
/// propagated. Finally a renewal timer is armed for expiring tokens with
/// auto-renew on, and any stale timer is disarmed otherwise.
pub async fn issue_token(
    store: &Arc<dyn SecretStore>,
    cr: &Arc<ClusterArgoCD>,
    namespace: &str,
    timers: &mut TimerGuard<'_>,
    params: &IssueParams<'_>,
    signing_key: &[u8],
) -> Result<()> {
    let username = params.username;
    let secret_name = user_secret_name(&cr.name_any(), username);
    let existing = store.get(namespace, &secret_name).await?;

    let token_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let lifetime_secs = i64::try_from(params.lifetime_secs).unwrap_or(i64::MAX);
    let exp_at = if lifetime_secs > 0 {
        now.timestamp() + lifetime_secs
    } else {
        0
    };

    let api_token = token::issue(username, now, lifetime_secs, &token_id, signing_key)?;

    let record = UserSecretRecord {
        user: username.to_string(),
        api_token,
        exp_at,
        token_lifetime: params.lifetime.to_string(),
        auto_renew: params.auto_renew,
    };

    match existing {
        Some(mut secret) => {
            record.write_into(&mut secret);
            store.update(namespace, &secret).await?;
        }
        None => {
            store.create(namespace, &record.to_secret(cr)).await?;
        }
    }

    // The auth layer resolves tokens against this entry; without it the
    // token we just persisted is unusable
    let entry = AccountTokenEntry {
        id: token_id,
        issued_at: now.timestamp(),
        expires_at: exp_at,
    };
    write_account_token_entry(store.as_ref(), namespace, username, &entry).await?;

    let key = timer_key(namespace, username);
    if lifetime_secs > 0 && params.auto_renew {
        let fire_at = now + chrono::Duration::seconds(lifetime_secs);
        timers.arm(
            &key,
            fire_at,
            Arc::new(RenewalIssueTask {
                store: Arc::clone(store),
                cr: Arc::clone(cr),
                namespace: namespace.to_string(),
                username: username.to_string(),
                lifetime: params.lifetime.to_string(),
                lifetime_secs: params.lifetime_secs,
            }),
        );
    } else {
        // A previous configuration may have left a timer behind
        timers.disarm(&key);
    }

    tracing::info!(
        user = %username,
        namespace = %namespace,
        reason = params.reason.as_str(),
        expires_at = exp_at,
        "Issued API token"
    );
    metrics::increment_tokens_issued(params.reason.as_str());

    Ok(())
}

/// Timer task that re-issues a user's token when its lifetime elapses
///
/// Each successful issuance arms the next timer, forming the renewal
/// chain. Failures are logged and swallowed: the token stays expired until
/// the next reconcile pass corrects it.
pub struct RenewalIssueTask {
    pub store: Arc<dyn SecretStore>,
    pub cr: Arc<ClusterArgoCD>,
    pub namespace: String,
    pub username: String,
    pub lifetime: String,
    pub lifetime_secs: u64,
}

impl std::fmt::Debug for RenewalIssueTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalIssueTask")
            .field("namespace", &self.namespace)
            .field("username", &self.username)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RenewalTask for RenewalIssueTask {
    async fn run(&self, timers: &mut TimerGuard<'_>) {
        // The signing key is re-read at fire time so a rotated key signs
        // the renewed token
        let signing_key = match get_signing_key(self.store.as_ref(), &self.namespace).await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(
                    user = %self.username,
                    namespace = %self.namespace,
                    "Auto-renewal failed reading the signing key, retrying on next reconcile: {e:#}"
                );
                metrics::increment_renewal_failures();
                return;
            }
        };

        let params = IssueParams {
            username: &self.username,
            lifetime: &self.lifetime,
            lifetime_secs: self.lifetime_secs,
            auto_renew: true,
            reason: IssueReason::Renewal,
        };
        if let Err(e) = issue_token(
            &self.store,
            &self.cr,
            &self.namespace,
            timers,
            &params,
            &signing_key,
        )
        .await
        {
            tracing::warn!(
                user = %self.username,
                namespace = %self.namespace,
                "Auto-renewal failed, token stays expired until next reconcile: {e:#}"
            );
            metrics::increment_renewal_failures();
        }
    }
}
