//! # Local User Reconciliation Tests
//!
//! End-to-end tests for the local-user reconcile pass, driven against the
//! in-memory secret store. They cover first issuance, idempotency, drift
//! re-issuance, revocation, sweeping, and per-user fault isolation.

#[cfg(test)]
mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use argocd_local_user_controller::constants::ARGOCD_SECRET_NAME;
use argocd_local_user_controller::controller::reconciler::argocd_secret::{
    read_account_token_entries, remove_account_token_entry,
};
use argocd_local_user_controller::controller::reconciler::local_users::{
    user_secret_name, UserSecretRecord,
};
use argocd_local_user_controller::controller::reconciler::timers::timer_key;
use argocd_local_user_controller::controller::reconciler::LocalUserContext;
use argocd_local_user_controller::store::{MemorySecretStore, SecretStore};
use argocd_local_user_controller::token::{verify, ApiTokenClaims};

use common::{cluster_argocd, cluster_argocd_with_extra_config, seeded_store, user, SIGNING_KEY};

const NAMESPACE: &str = "argocd";

fn context(store: &MemorySecretStore) -> LocalUserContext {
    LocalUserContext::new(Arc::new(store.clone()))
}

async fn stored_record(store: &MemorySecretStore, username: &str) -> UserSecretRecord {
    let secret = store
        .get(NAMESPACE, &user_secret_name("argocd", username))
        .await
        .unwrap()
        .expect("user secret should exist");
    UserSecretRecord::from_secret(&secret).expect("user secret should parse")
}

fn decode_claims(token: &str) -> ApiTokenClaims {
    verify(token, SIGNING_KEY).expect("issued token should verify with the signing key")
}

#[tokio::test]
async fn test_first_pass_issues_token_secret_and_account_entry() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);
    let cr = cluster_argocd(NAMESPACE, vec![user("ci", "1h", true)]);

    let summary = ctx.reconcile_local_users(&cr).await.unwrap();
    assert_eq!(summary.reconciled, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.swept, 0);
    assert!(!summary.degraded());

    let record = stored_record(&store, "ci").await;
    assert_eq!(record.user, "ci");
    assert_eq!(record.token_lifetime, "1h");
    assert!(record.auto_renew);
    assert!(record.exp_at > 0);

    let claims = decode_claims(&record.api_token);
    assert_eq!(claims.sub, "ci:apiKey");
    assert_eq!(claims.exp, Some(record.exp_at));

    let entries = read_account_token_entries(&store, NAMESPACE, "ci")
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].expires_at, record.exp_at);
    assert_eq!(entries[0].id, claims.jti);

    let timers = ctx.timers().lock().await;
    assert!(timers.is_armed(&timer_key(NAMESPACE, "ci")));
}

#[tokio::test]
async fn test_unchanged_spec_does_not_reissue() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);
    let cr = cluster_argocd(NAMESPACE, vec![user("ci", "1h", true)]);

    ctx.reconcile_local_users(&cr).await.unwrap();
    let first = stored_record(&store, "ci").await;

    let summary = ctx.reconcile_local_users(&cr).await.unwrap();
    assert_eq!(summary.reconciled, 1);
    assert_eq!(stored_record(&store, "ci").await, first);
}

#[tokio::test]
async fn test_extra_config_account_is_left_untouched() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);
    let cr = cluster_argocd_with_extra_config(
        NAMESPACE,
        vec![user("ci", "1h", true)],
        BTreeMap::from([("accounts.ci".to_string(), "apiKey, login".to_string())]),
    );

    let summary = ctx.reconcile_local_users(&cr).await.unwrap();
    assert!(!summary.degraded());

    // Only the seeded argocd-secret exists; no user secret was created
    assert_eq!(store.secret_names(NAMESPACE), vec![ARGOCD_SECRET_NAME]);
    let timers = ctx.timers().lock().await;
    assert!(!timers.is_armed(&timer_key(NAMESPACE, "ci")));
}

#[tokio::test]
async fn test_lifetime_change_reissues_the_token() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);

    ctx.reconcile_local_users(&cluster_argocd(NAMESPACE, vec![user("ci", "1h", true)]))
        .await
        .unwrap();
    let before = stored_record(&store, "ci").await;

    ctx.reconcile_local_users(&cluster_argocd(NAMESPACE, vec![user("ci", "2h", true)]))
        .await
        .unwrap();
    let after = stored_record(&store, "ci").await;

    assert_ne!(after.api_token, before.api_token);
    assert_eq!(after.token_lifetime, "2h");

    let entries = read_account_token_entries(&store, NAMESPACE, "ci")
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].expires_at, after.exp_at);
}

#[tokio::test]
async fn test_api_key_false_revokes_issued_state() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);

    ctx.reconcile_local_users(&cluster_argocd(NAMESPACE, vec![user("ci", "1h", true)]))
        .await
        .unwrap();

    let mut revoked = user("ci", "1h", true);
    revoked.api_key = Some(false);
    let summary = ctx
        .reconcile_local_users(&cluster_argocd(NAMESPACE, vec![revoked]))
        .await
        .unwrap();
    assert_eq!(summary.reconciled, 1);
    assert_eq!(summary.swept, 0);

    let secret = store
        .get(NAMESPACE, &user_secret_name("argocd", "ci"))
        .await
        .unwrap();
    assert!(secret.is_none());

    let entries = read_account_token_entries(&store, NAMESPACE, "ci")
        .await
        .unwrap();
    assert!(entries.is_empty());

    let timers = ctx.timers().lock().await;
    assert!(!timers.is_armed(&timer_key(NAMESPACE, "ci")));
}

#[tokio::test]
async fn test_removed_user_is_swept() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);

    ctx.reconcile_local_users(&cluster_argocd(
        NAMESPACE,
        vec![user("ci", "1h", true), user("deploy", "1h", true)],
    ))
    .await
    .unwrap();

    let summary = ctx
        .reconcile_local_users(&cluster_argocd(NAMESPACE, vec![user("ci", "1h", true)]))
        .await
        .unwrap();
    assert_eq!(summary.swept, 1);

    let deploy_secret = store
        .get(NAMESPACE, &user_secret_name("argocd", "deploy"))
        .await
        .unwrap();
    assert!(deploy_secret.is_none());
    let deploy_entries = read_account_token_entries(&store, NAMESPACE, "deploy")
        .await
        .unwrap();
    assert!(deploy_entries.is_empty());

    // The surviving user keeps its state
    let ci = stored_record(&store, "ci").await;
    assert_eq!(ci.user, "ci");
}

#[tokio::test]
async fn test_missing_signing_secret_fails_the_whole_pass() {
    let store = MemorySecretStore::new();
    let ctx = context(&store);
    let cr = cluster_argocd(NAMESPACE, vec![user("ci", "1h", true)]);

    let err = ctx.reconcile_local_users(&cr).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_malformed_lifetime_degrades_only_that_user() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);
    let cr = cluster_argocd(
        NAMESPACE,
        vec![user("broken", "banana", true), user("ci", "1h", true)],
    );

    let summary = ctx.reconcile_local_users(&cr).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.reconciled, 1);
    assert!(summary.degraded());

    let broken = store
        .get(NAMESPACE, &user_secret_name("argocd", "broken"))
        .await
        .unwrap();
    assert!(broken.is_none());
    assert_eq!(stored_record(&store, "ci").await.user, "ci");
}

#[tokio::test]
async fn test_out_of_range_lifetime_degrades_only_that_user() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);
    let cr = cluster_argocd(
        NAMESPACE,
        vec![user("huge", "10000000000000000s", true), user("ci", "1h", true)],
    );

    let summary = ctx.reconcile_local_users(&cr).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.reconciled, 1);
    assert!(summary.degraded());

    let huge = store
        .get(NAMESPACE, &user_secret_name("argocd", "huge"))
        .await
        .unwrap();
    assert!(huge.is_none());
    assert_eq!(stored_record(&store, "ci").await.user, "ci");
}

#[tokio::test]
async fn test_missing_account_entry_is_restored_without_reissue() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);
    let cr = cluster_argocd(NAMESPACE, vec![user("ci", "1h", true)]);

    ctx.reconcile_local_users(&cr).await.unwrap();
    let before = stored_record(&store, "ci").await;

    // Simulate a write failure between the user-secret write and the
    // account entry write: the record persists but the auth layer never
    // learned about the token
    remove_account_token_entry(&store, NAMESPACE, "ci")
        .await
        .unwrap();

    let summary = ctx.reconcile_local_users(&cr).await.unwrap();
    assert!(!summary.degraded());

    let after = stored_record(&store, "ci").await;
    assert_eq!(after.api_token, before.api_token);

    let entries = read_account_token_entries(&store, NAMESPACE, "ci")
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, decode_claims(&after.api_token).jti);
    assert_eq!(entries[0].expires_at, after.exp_at);
}

#[tokio::test]
async fn test_disabling_auto_renew_keeps_the_token() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);

    ctx.reconcile_local_users(&cluster_argocd(NAMESPACE, vec![user("ci", "1h", true)]))
        .await
        .unwrap();
    let before = stored_record(&store, "ci").await;

    ctx.reconcile_local_users(&cluster_argocd(NAMESPACE, vec![user("ci", "1h", false)]))
        .await
        .unwrap();
    let after = stored_record(&store, "ci").await;

    assert_eq!(after.api_token, before.api_token);
    assert!(!after.auto_renew);

    let timers = ctx.timers().lock().await;
    assert!(!timers.is_armed(&timer_key(NAMESPACE, "ci")));
}

#[tokio::test]
async fn test_never_expiring_token_has_no_expiry_and_no_timer() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);

    ctx.reconcile_local_users(&cluster_argocd(NAMESPACE, vec![user("probe", "0", true)]))
        .await
        .unwrap();

    let record = stored_record(&store, "probe").await;
    assert_eq!(record.exp_at, 0);
    assert_eq!(decode_claims(&record.api_token).exp, None);

    let entries = read_account_token_entries(&store, NAMESPACE, "probe")
        .await
        .unwrap();
    assert_eq!(entries[0].expires_at, 0);

    let timers = ctx.timers().lock().await;
    assert!(!timers.is_armed(&timer_key(NAMESPACE, "probe")));
}

#[tokio::test]
async fn test_teardown_namespace_releases_all_timers() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);

    ctx.reconcile_local_users(&cluster_argocd(
        NAMESPACE,
        vec![user("ci", "1h", true), user("deploy", "2h", true)],
    ))
    .await
    .unwrap();
    assert_eq!(ctx.timers().lock().await.armed_count(), 2);

    ctx.teardown_namespace(NAMESPACE).await;
    assert_eq!(ctx.timers().lock().await.armed_count(), 0);
}
