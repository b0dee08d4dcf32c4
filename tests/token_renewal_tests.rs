//! # Token Renewal Tests
//!
//! Tests for the auto-renewal chain: a fired timer re-issues the token and
//! arms the next one, a failed renewal is contained until the next pass,
//! and a restarted controller re-arms timers from the persisted expiry.
//!
//! These tests use one-second token lifetimes and real sleeps, so they run
//! against the actual timer machinery rather than a mocked clock.

#[cfg(test)]
mod common;

use std::sync::Arc;
use std::time::Duration;

use argocd_local_user_controller::controller::reconciler::argocd_secret::read_account_token_entries;
use argocd_local_user_controller::controller::reconciler::local_users::{
    user_secret_name, UserSecretRecord,
};
use argocd_local_user_controller::controller::reconciler::timers::timer_key;
use argocd_local_user_controller::controller::reconciler::LocalUserContext;
use argocd_local_user_controller::store::{MemorySecretStore, SecretStore};
use argocd_local_user_controller::token::{verify, ApiTokenClaims};

use common::{cluster_argocd, seeded_store, user, SIGNING_KEY};

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
async fn test_fired_renewal_reissues_and_rearms() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);

    ctx.reconcile_local_users(&cluster_argocd(NAMESPACE, vec![user("ci", "1s", true)]))
        .await
        .unwrap();
    let first = stored_record(&store, "ci").await;

    tokio::time::sleep(Duration::from_secs(3)).await;

    // Holding the registry lock keeps any in-flight renewal from running,
    // so the store reads below see a consistent snapshot
    let timers = ctx.timers().lock().await;
    assert!(timers.is_armed(&timer_key(NAMESPACE, "ci")));

    let renewed = stored_record(&store, "ci").await;
    assert_ne!(renewed.api_token, first.api_token);
    assert!(renewed.exp_at > first.exp_at);

    let claims = decode_claims(&renewed.api_token);
    assert_eq!(claims.sub, "ci:apiKey");

    let entries = read_account_token_entries(&store, NAMESPACE, "ci")
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, claims.jti);
}

#[tokio::test]
async fn test_failed_renewal_is_contained_until_the_next_pass() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);
    let cr = cluster_argocd(NAMESPACE, vec![user("ci", "1s", true)]);

    ctx.reconcile_local_users(&cr).await.unwrap();
    let first = stored_record(&store, "ci").await;

    // Renewal fires into a store that rejects writes; the failure is
    // logged and swallowed, leaving the expired token in place
    store.set_fail_writes(true);
    tokio::time::sleep(Duration::from_secs(2)).await;

    {
        let timers = ctx.timers().lock().await;
        assert!(!timers.is_armed(&timer_key(NAMESPACE, "ci")));
    }
    assert_eq!(stored_record(&store, "ci").await.api_token, first.api_token);

    // The next pass arms a timer from the persisted, already-past expiry;
    // it fires immediately and repairs the token
    store.set_fail_writes(false);
    ctx.reconcile_local_users(&cr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let timers = ctx.timers().lock().await;
    assert!(timers.is_armed(&timer_key(NAMESPACE, "ci")));
    let repaired = stored_record(&store, "ci").await;
    assert_ne!(repaired.api_token, first.api_token);
}

#[tokio::test]
async fn test_restart_rearms_timer_from_persisted_expiry() {
    let store = seeded_store(NAMESPACE).await;
    let cr = cluster_argocd(NAMESPACE, vec![user("ci", "1h", true)]);

    context(&store).reconcile_local_users(&cr).await.unwrap();
    let before = stored_record(&store, "ci").await;

    // A fresh context simulates a restarted controller: same persisted
    // state, empty timer registry
    let restarted = context(&store);
    restarted.reconcile_local_users(&cr).await.unwrap();

    let after = stored_record(&store, "ci").await;
    assert_eq!(after.api_token, before.api_token);

    let timers = restarted.timers().lock().await;
    let key = timer_key(NAMESPACE, "ci");
    assert!(timers.is_armed(&key));
    assert_eq!(
        timers.fire_at(&key).map(|at| at.timestamp()),
        Some(before.exp_at)
    );
}

#[tokio::test]
async fn test_auto_renew_off_lets_the_token_expire() {
    let store = seeded_store(NAMESPACE).await;
    let ctx = context(&store);

    ctx.reconcile_local_users(&cluster_argocd(NAMESPACE, vec![user("ci", "1s", false)]))
        .await
        .unwrap();
    let first = stored_record(&store, "ci").await;
    assert_eq!(decode_claims(&first.api_token).exp, Some(first.exp_at));

    {
        let timers = ctx.timers().lock().await;
        assert!(!timers.is_armed(&timer_key(NAMESPACE, "ci")));
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(stored_record(&store, "ci").await, first);
}
