//! # Local User Reconciliation
//!
//! Brings the declared `localUsers` list of a `ClusterArgoCD` in sync with
//! the cluster: one API token, one per-user Secret, and (for expiring
//! tokens with auto-renew) one renewal timer per user.
//!
//! ## Reconciliation Flow
//!
//! 1. Read the HMAC signing key from `argocd-secret` (fatal for the pass
//!    when missing)
//! 2. Take the timer registry mutex for the remainder of the pass
//! 3. For each declared user, derive an action from the spec and the
//!    persisted record, then execute it; a failure only aborts that user
//! 4. Sweep secrets whose users are no longer declared
//!
//! State is never cached between passes: the per-user Secret is the single
//! source of truth for what was issued, and the decision table re-derives
//! everything from it.

pub mod decision;
pub mod issue;
pub mod sweep;
pub mod user_secrets;

// Re-export public API
pub use decision::{decide, extra_config_accounts, DecisionInput, IssueReason, UserAction};
pub use issue::{issue_token, IssueParams, RenewalIssueTask};
pub use sweep::sweep_removed_users;
pub use user_secrets::{
    local_user_selector, secret_username, user_secret_name, UserSecretRecord,
};

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;

use crate::controller::reconciler::argocd_secret::{
    get_signing_key, read_account_token_entries, remove_account_token_entry,
    write_account_token_entry, AccountTokenEntry,
};
use crate::controller::reconciler::timers::{timer_key, RenewalTimerRegistry, TimerGuard};
use crate::controller::reconciler::validation::parse_token_lifetime;
use crate::crd::{ClusterArgoCD, LocalUserSpec};
use crate::observability::metrics;
use crate::store::SecretStore;
use crate::token;

/// Outcome counts of one local-user reconcile pass
#[derive(Debug, Clone, Copy, Default)]
pub struct PassSummary {
    /// Users processed without error
    pub reconciled: usize,
    /// Users that hit a per-user error and were skipped this pass
    pub failed: usize,
    /// Stale secrets removed by the sweep
    pub swept: usize,
}

impl PassSummary {
    pub fn degraded(&self) -> bool {
        self.failed > 0
    }
}

/// Reconciles local users against a [`SecretStore`]
///
/// Carries no Kubernetes client of its own, so tests can drive it against
/// an in-memory store.
#[derive(Clone)]
pub struct LocalUserContext {
    store: Arc<dyn SecretStore>,
    timers: RenewalTimerRegistry,
}

impl std::fmt::Debug for LocalUserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalUserContext")
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}

impl LocalUserContext {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            timers: RenewalTimerRegistry::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    pub fn timers(&self) -> &RenewalTimerRegistry {
        &self.timers
    }

    /// Run one full local-user pass for a ClusterArgoCD
    ///
    /// Holds the timer registry mutex from before the first user until
    /// after the sweep, so timer-fired renewals serialize against the
    /// whole pass.
    pub async fn reconcile_local_users(&self, cr: &Arc<ClusterArgoCD>) -> Result<PassSummary> {
        let namespace = cr
            .namespace()
            .ok_or_else(|| anyhow!("ClusterArgoCD {} has no namespace", cr.name_any()))?;

        let signing_key = get_signing_key(self.store.as_ref(), &namespace).await?;

        let mut timers = self.timers.lock().await;
        let externally_managed = extra_config_accounts(&cr.spec.extra_config);

        let mut summary = PassSummary::default();
        for user in &cr.spec.local_users {
            match self
                .process_user(cr, &namespace, user, &externally_managed, &mut timers, &signing_key)
                .await
            {
                Ok(()) => summary.reconciled += 1,
                Err(e) => {
                    tracing::error!(
                        user = %user.name,
                        namespace = %namespace,
                        "Failed to reconcile local user: {e:#}"
                    );
                    metrics::increment_user_errors();
                    summary.failed += 1;
                }
            }
        }

        summary.swept = sweep_removed_users(
            &self.store,
            cr,
            &namespace,
            &externally_managed,
            &mut timers,
        )
        .await?;

        metrics::set_armed_timers(timers.armed_count());
        Ok(summary)
    }

    /// Disarm every timer belonging to a namespace
    ///
    /// Called when the owning ClusterArgoCD is deleted; the per-user
    /// Secrets themselves are garbage-collected through owner references.
    pub async fn teardown_namespace(&self, namespace: &str) {
        let mut timers = self.timers.lock().await;
        timers.disarm_all(&format!("{namespace}/"));
        metrics::set_armed_timers(timers.armed_count());
    }

    async fn process_user(
        &self,
        cr: &Arc<ClusterArgoCD>,
        namespace: &str,
        user: &LocalUserSpec,
        externally_managed: &HashSet<String>,
        timers: &mut TimerGuard<'_>,
        signing_key: &[u8],
    ) -> Result<()> {
        let username = user.name.as_str();

        if externally_managed.contains(username) {
            tracing::debug!(
                user = %username,
                namespace = %namespace,
                "User is declared through extraConfig; skipping"
            );
            return Ok(());
        }

        let declared_lifetime = user.declared_lifetime();
        let lifetime_secs = parse_token_lifetime(declared_lifetime).with_context(|| {
            format!("User {username} has an invalid tokenLifetime '{declared_lifetime}'")
        })?;

        let secret = self
            .store
            .get(namespace, &user_secret_name(&cr.name_any(), username))
            .await?;
        let record = match &secret {
            Some(secret) => Some(UserSecretRecord::from_secret(secret)?),
            None => None,
        };

        let action = decide(&DecisionInput {
            externally_managed: externally_managed.contains(username),
            api_key_enabled: user.api_key_enabled(),
            declared_lifetime,
            lifetime_secs,
            auto_renew: user.auto_renew(),
            stored: record.as_ref(),
        });

        match action {
            UserAction::Skip | UserAction::Idle => Ok(()),
            UserAction::Revoke => {
                remove_user_state(&self.store, namespace, &cr.name_any(), username, true, timers)
                    .await?;
                tracing::info!(user = %username, namespace = %namespace, "Revoked API token");
                metrics::increment_tokens_revoked();
                Ok(())
            }
            UserAction::Issue(reason) => {
                let params = IssueParams {
                    username,
                    lifetime: declared_lifetime,
                    lifetime_secs,
                    auto_renew: user.auto_renew(),
                    reason,
                };
                issue_token(&self.store, cr, namespace, timers, &params, signing_key).await
            }
            UserAction::EnsureRenewal => {
                let Some(record) = record else {
                    bail!("User {username} has no stored record to schedule renewal from");
                };
                ensure_account_entry(&self.store, namespace, username, &record, signing_key)
                    .await?;
                self.ensure_renewal(cr, namespace, user, lifetime_secs, &record, timers)
            }
            UserAction::UpdateAutoRenew { enabled } => {
                let (Some(secret), Some(record)) = (secret, record) else {
                    bail!("User {username} has no stored record to update auto-renew on");
                };
                self.update_auto_renew(cr, namespace, user, enabled, secret, record, timers)
                    .await
            }
        }
    }

    /// Arm a renewal timer from the persisted expiry when one should exist
    /// but does not, which happens after a controller restart
    fn ensure_renewal(
        &self,
        cr: &Arc<ClusterArgoCD>,
        namespace: &str,
        user: &LocalUserSpec,
        lifetime_secs: u64,
        record: &UserSecretRecord,
        timers: &mut TimerGuard<'_>,
    ) -> Result<()> {
        if !user.auto_renew() || lifetime_secs == 0 {
            return Ok(());
        }

        let key = timer_key(namespace, &user.name);
        if timers.is_armed(&key) {
            return Ok(());
        }

        let fire_at = expiry_timestamp(record, &user.name)?;
        timers.arm(
            &key,
            fire_at,
            Arc::new(self.renewal_task(cr, namespace, user, lifetime_secs)),
        );
        tracing::info!(
            user = %user.name,
            namespace = %namespace,
            fire_at = %fire_at,
            "Armed renewal timer from persisted expiry"
        );
        Ok(())
    }

    /// Persist a changed autoRenewToken flag without re-issuing the token
    #[allow(clippy::too_many_arguments, reason = "per-user dispatch carries full context")]
    async fn update_auto_renew(
        &self,
        cr: &Arc<ClusterArgoCD>,
        namespace: &str,
        user: &LocalUserSpec,
        enabled: bool,
        mut secret: Secret,
        record: UserSecretRecord,
        timers: &mut TimerGuard<'_>,
    ) -> Result<()> {
        let key = timer_key(namespace, &user.name);

        if enabled {
            let fire_at = expiry_timestamp(&record, &user.name)?;
            let lifetime_secs = parse_token_lifetime(user.declared_lifetime())?;
            timers.arm(
                &key,
                fire_at,
                Arc::new(self.renewal_task(cr, namespace, user, lifetime_secs)),
            );
        } else {
            timers.disarm(&key);
        }

        let mut updated = record;
        updated.auto_renew = enabled;
        updated.write_into(&mut secret);
        self.store.update(namespace, &secret).await?;

        tracing::info!(
            user = %user.name,
            namespace = %namespace,
            auto_renew = enabled,
            "Updated auto-renew without re-issuing the token"
        );
        Ok(())
    }

    fn renewal_task(
        &self,
        cr: &Arc<ClusterArgoCD>,
        namespace: &str,
        user: &LocalUserSpec,
        lifetime_secs: u64,
    ) -> RenewalIssueTask {
        RenewalIssueTask {
            store: Arc::clone(&self.store),
            cr: Arc::clone(cr),
            namespace: namespace.to_string(),
            username: user.name.clone(),
            lifetime: user.declared_lifetime().to_string(),
            lifetime_secs,
        }
    }
}

/// Expiry of the stored token as a timestamp usable for timer arming
///
/// A zero or out-of-range `expAt` cannot schedule a renewal and is an
/// error for this user.
fn expiry_timestamp(record: &UserSecretRecord, username: &str) -> Result<DateTime<Utc>> {
    if record.exp_at == 0 {
        bail!("User {username} has an expiring lifetime but a stored expAt of 0");
    }
    DateTime::<Utc>::from_timestamp(record.exp_at, 0)
        .ok_or_else(|| anyhow!("User {username} has an out-of-range expAt {}", record.exp_at))
}

/// Re-create the account's token entry in `argocd-secret` when it no
/// longer matches the stored token
///
/// Covers a crash or write failure between persisting the user secret and
/// registering the token with the auth layer: the spec looks unchanged on
/// the next pass, but the token is unusable until the entry is restored.
/// The entry's identity is recovered by verifying the stored token with
/// the current signing key; a token the key rejects is an error for this
/// user, surfaced instead of silently re-issued.
async fn ensure_account_entry(
    store: &Arc<dyn SecretStore>,
    namespace: &str,
    username: &str,
    record: &UserSecretRecord,
    signing_key: &[u8],
) -> Result<()> {
    let claims = token::verify(&record.api_token, signing_key).with_context(|| {
        format!("User {username} has a stored token the current signing key rejects")
    })?;
    let expected = AccountTokenEntry {
        id: claims.jti,
        issued_at: claims.iat,
        expires_at: record.exp_at,
    };

    let entries = read_account_token_entries(store.as_ref(), namespace, username).await?;
    if entries.as_slice() != std::slice::from_ref(&expected) {
        write_account_token_entry(store.as_ref(), namespace, username, &expected).await?;
        tracing::warn!(
            user = %username,
            namespace = %namespace,
            token_id = %expected.id,
            "Restored the account token entry for an already-issued token"
        );
    }
    Ok(())
}

/// Remove every trace of one user: timer, Secret, and (optionally) the
/// account's token entry in `argocd-secret`
///
/// Used by revocation and by the sweep. All steps are idempotent.
pub(crate) async fn remove_user_state(
    store: &Arc<dyn SecretStore>,
    namespace: &str,
    cr_name: &str,
    username: &str,
    clear_account_entry: bool,
    timers: &mut TimerGuard<'_>,
) -> Result<()> {
    timers.disarm(&timer_key(namespace, username));
    store
        .delete(namespace, &user_secret_name(cr_name, username))
        .await?;
    if clear_account_entry {
        remove_account_token_entry(store.as_ref(), namespace, username).await?;
    }
    Ok(())
}
