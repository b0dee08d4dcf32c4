//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::ClusterArgoCD;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource, so one ClusterArgoCD stuck on a
/// missing signing key never slows down reconciliation of the others.
pub fn handle_reconciliation_error(
    obj: Arc<ClusterArgoCD>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {:?}", name, error);
    observability::metrics::increment_reconciliation_errors();

    // Backoff lives here rather than in reconcile() so a failing resource
    // never holds state the watch/timer paths would have to wait on
    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(resource_key.clone())
                .or_insert_with(BackoffState::new);
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!(
                "Failed to lock backoff_states: {}, using default backoff",
                e
            );
            (60, 0) // 60 seconds default
        }
    };

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(60));

    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, trigger source: error-backoff)",
        backoff_seconds, error_count
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s, trigger source: error-backoff)",
        next_trigger_time.to_rfc3339(),
        backoff_seconds
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(std::time::Duration::from_secs(backoff_seconds))
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<std::sync::atomic::AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay_secs: u64,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    // IMPORTANT: Check 404 BEFORE 401, as 404 errors may contain "WatchFailed" in the error chain
    // A 404 response returned as plain text "404" causes a serde error that includes "WatchFailed"
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 =
        (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");
    let is_429 = error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests");

    if is_401 {
        error!(
            "❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired"
        );
        error!(
            "   Verify the ClusterRole and ClusterRoleBinding for 'argocd-local-user-controller' still exist and bind the pod's ServiceAccount"
        );
        warn!(
            "⏳ Waiting {}s before retrying watch (RBAC may need time to propagate)...",
            watch_restart_delay_secs
        );
        tokio::time::sleep(std::time::Duration::from_secs(watch_restart_delay_secs)).await;
        None // Filter out to allow restart
    } else if is_410 {
        // Resource version expired - this is normal during pod restarts
        warn!(
            "Watch resource version expired (410) - this is normal during pod restarts, watch will restart"
        );
        None // Filter out to allow restart
    } else if is_429 {
        // Storage reinitializing - back off and let it restart
        let current_backoff = backoff.load(std::sync::atomic::Ordering::Relaxed);
        warn!(
            "API server storage reinitializing (429), backing off for {}ms before restart...",
            current_backoff
        );
        tokio::time::sleep(std::time::Duration::from_millis(current_backoff)).await;
        let new_backoff = std::cmp::min(current_backoff * 2, max_backoff_ms);
        backoff.store(new_backoff, std::sync::atomic::Ordering::Relaxed);
        None // Filter out to allow restart
    } else if is_not_found {
        let resource_info = if error_string.contains("integer `404`") {
            // A 404 returned as plain text instead of JSON - likely CRD missing or resource deleted
            "CRD or resource may have been deleted (404 returned as plain text)"
        } else if error_string.contains("ClusterArgoCD") {
            "ClusterArgoCD resource"
        } else {
            "Resource"
        };
        warn!(
            "{} not found (404) - this may be normal if resource was deleted or CRD is missing. Error: {}",
            resource_info, error_string
        );
        Some(()) // Continue - this is expected
    } else {
        error!("Controller stream error: {}", error_string);
        tokio::time::sleep(std::time::Duration::from_secs(watch_restart_delay_secs)).await;
        None // Filter out to allow restart
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::handle_watch_stream_error;

    #[tokio::test]
    async fn not_found_watch_errors_keep_the_stream_alive() {
        let backoff = Arc::new(AtomicU64::new(100));
        let result = handle_watch_stream_error(
            "ErrorResponse: clusterargocds.argoproj.io not found (404)",
            &backoff,
            1_000,
            0,
        )
        .await;
        assert_eq!(result, Some(()));
    }

    #[tokio::test]
    async fn plain_text_404_is_not_treated_as_unauthorized() {
        // Serde surfaces a plain-text 404 body as an invalid-type error that
        // mentions WatchFailed, which must not be classified as a 401
        let backoff = Arc::new(AtomicU64::new(100));
        let result = handle_watch_stream_error(
            "WatchFailed: invalid type: integer `404`, expected struct WatchEvent",
            &backoff,
            1_000,
            0,
        )
        .await;
        assert_eq!(result, Some(()));
    }

    #[tokio::test]
    async fn storage_reinitializing_doubles_the_backoff() {
        let backoff = Arc::new(AtomicU64::new(100));
        let result =
            handle_watch_stream_error("429 TooManyRequests", &backoff, 1_000, 0).await;
        assert_eq!(result, None);
        assert_eq!(backoff.load(Ordering::Relaxed), 200);
    }

    #[tokio::test]
    async fn backoff_for_storage_errors_is_capped() {
        let backoff = Arc::new(AtomicU64::new(800));
        let _ = handle_watch_stream_error("429 TooManyRequests", &backoff, 1_000, 0).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 1_000);
    }

    #[tokio::test]
    async fn expired_resource_version_restarts_the_watch() {
        let backoff = Arc::new(AtomicU64::new(100));
        let result =
            handle_watch_stream_error("410 Gone: too old resource version", &backoff, 1_000, 0)
                .await;
        assert_eq!(result, None);
    }
}
