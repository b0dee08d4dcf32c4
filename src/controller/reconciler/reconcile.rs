//! # Reconciliation Logic
//!
//! Finalizer-driven entry points for the controller runtime: the apply path
//! that runs the local-user token pass, the cleanup path that releases
//! renewal timers on deletion, and the status patch recording the outcome.

use crate::constants::ERROR_REQUEUE_SECS;
use crate::constants::LOCAL_USERS_FINALIZER;
use crate::controller::reconciler::local_users::PassSummary;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{ClusterArgoCD, ClusterArgoCDStatus, Condition};
use crate::observability;
use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::runtime::finalizer;
use kube::{Api, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Entry point invoked by the controller runtime for every watch event
///
/// Wraps the real work in a finalizer so renewal timers are torn down
/// before the resource disappears from the API server.
pub async fn reconcile(
    cr: Arc<ClusterArgoCD>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let Some(namespace) = cr.namespace() else {
        return Err(ReconcilerError::ReconciliationFailed(anyhow::anyhow!(
            "ClusterArgoCD {} carries no namespace",
            cr.name_any()
        )));
    };
    let api: Api<ClusterArgoCD> = Api::namespaced(ctx.client.clone(), &namespace);

    Ok(finalizer(&api, LOCAL_USERS_FINALIZER, cr, |event| async {
        match event {
            finalizer::Event::Apply(cr) => apply(cr, &ctx).await,
            finalizer::Event::Cleanup(cr) => cleanup(cr, &ctx).await,
        }
    })
    .await?)
}

/// Run one reconcile pass and schedule the next one
async fn apply(cr: Arc<ClusterArgoCD>, ctx: &Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let name = cr.name_any();
    let namespace = cr.namespace().unwrap_or_else(|| "default".to_string());

    info!(
        "Reconciling ClusterArgoCD {}/{} ({} local users declared)",
        namespace,
        name,
        cr.spec.local_users.len()
    );
    observability::metrics::increment_reconciliations();

    // Per-user failures are contained inside the pass; only a pass-fatal
    // condition (missing signing key or secret) surfaces as Err here.
    let summary = ctx.users.reconcile_local_users(&cr).await?;

    if let Err(e) = update_status(ctx, &cr, &summary).await {
        error!("Failed to update status for ClusterArgoCD {namespace}/{name}: {e:#}");
        observability::metrics::increment_reconciliation_errors();
        return Err(ReconcilerError::ReconciliationFailed(e));
    }

    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    observability::metrics::set_local_users_managed(
        i64::try_from(summary.reconciled + summary.failed).unwrap_or(i64::MAX),
    );

    // Success - reset backoff state for this resource
    // Reaching this point means the pass-fatal condition (if any) cleared,
    // so the next failure should start the ladder from the bottom again
    let resource_key = format!("{namespace}/{name}");
    let was_in_backoff = if let Ok(mut states) = ctx.backoff_states.lock() {
        if let Some(state) = states.get_mut(&resource_key) {
            let had_errors = state.error_count > 0;
            state.reset();
            had_errors
        } else {
            false
        }
    } else {
        false
    };
    if was_in_backoff {
        info!(
            "🔄 Backoff reset: returning to the normal {}s schedule",
            ctx.reconcile_interval.as_secs()
        );
    }

    if summary.degraded() {
        warn!(
            "⚠️  Reconciliation degraded for ClusterArgoCD {namespace}/{name}: {} of {} users failed, retrying in {ERROR_REQUEUE_SECS}s",
            summary.failed,
            summary.reconciled + summary.failed
        );
        observability::metrics::increment_requeues_total("user-error");
        return Ok(Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS)));
    }

    info!(
        "✅ Reconciliation complete for ClusterArgoCD {namespace}/{name} ({} users, {} swept, duration: {:.2}s)",
        summary.reconciled,
        summary.swept,
        start.elapsed().as_secs_f64()
    );
    observability::metrics::increment_requeues_total("timer-based");
    Ok(Action::requeue(ctx.reconcile_interval))
}

/// Release per-namespace timer state when the resource is deleted
///
/// Managed user secrets carry an owner reference and are collected by the
/// API server; only the in-process timers need explicit teardown.
async fn cleanup(cr: Arc<ClusterArgoCD>, ctx: &Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let name = cr.name_any();
    let namespace = cr.namespace().unwrap_or_else(|| "default".to_string());

    info!("🗑️  ClusterArgoCD {namespace}/{name} deleted, releasing renewal timers");
    ctx.users.teardown_namespace(&namespace).await;

    Ok(Action::await_change())
}

/// Patch the resource status with the outcome of a pass
async fn update_status(
    ctx: &Arc<Reconciler>,
    cr: &ClusterArgoCD,
    summary: &PassSummary,
) -> Result<()> {
    let name = cr.name_any();
    let namespace = cr.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<ClusterArgoCD> = Api::namespaced(ctx.client.clone(), &namespace);
    let total = summary.reconciled + summary.failed;

    let (phase, status_flag, reason, description) = if summary.degraded() {
        (
            "Degraded",
            "False",
            "LocalUsersFailed",
            format!("{} of {total} local users reconciled", summary.reconciled),
        )
    } else {
        (
            "Ready",
            "True",
            "ReconciliationSucceeded",
            format!("{total} local users reconciled"),
        )
    };

    let now = chrono::Utc::now().to_rfc3339();
    let status = ClusterArgoCDStatus {
        phase: Some(phase.to_string()),
        description: Some(description.clone()),
        conditions: vec![Condition {
            r#type: "Ready".to_string(),
            status: status_flag.to_string(),
            last_transition_time: Some(now.clone()),
            reason: Some(reason.to_string()),
            message: Some(description),
        }],
        observed_generation: cr.metadata.generation,
        last_reconcile_time: Some(now),
        local_users: Some(i32::try_from(total).unwrap_or(i32::MAX)),
    };

    let patch = serde_json::json!({ "status": status });

    match api
        .patch_status(
            &name,
            &PatchParams::apply("argocd-local-user-controller"),
            &Patch::Merge(patch),
        )
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
            // Resource was deleted during reconciliation - this is expected and not an error
            debug!(
                "ClusterArgoCD {namespace}/{name} was deleted during reconciliation, skipping status update"
            );
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(
            "Failed to patch status for ClusterArgoCD {namespace}/{name}: {e}"
        )),
    }
}
