//! # ArgoCD Local User Controller
//!
//! A Kubernetes controller that manages API tokens for the local users declared
//! on `ClusterArgoCD` resources.
//!
//! ## Overview
//!
//! ArgoCD lets you declare local user accounts in its configuration, but leaves
//! token issuance to manual `argocd account generate-token` invocations. This
//! controller closes that gap:
//!
//! 1. **Watching ClusterArgoCD resources** - Reacts to spec changes, periodic requeues, and deletions
//! 2. **Issuing tokens** - Signs ArgoCD-compatible JWTs with the `server.secretkey` from `argocd-secret`
//! 3. **Persisting state** - Stores each token in a per-user Kubernetes Secret and mirrors its
//!    metadata into `accounts.<user>.tokens` so the ArgoCD API server accepts the token
//! 4. **Auto-renewal** - Arms one in-process timer per expiring token and re-issues the token
//!    when it fires
//! 5. **Revocation and sweeping** - Revokes tokens for accounts that lose the `apiKey`
//!    capability and deletes the secrets of users no longer declared
//!
//! ## Features
//!
//! - **Declarative tokens**: token lifetime and auto-renewal are part of the ClusterArgoCD spec
//! - **Restart-safe renewals**: timers are re-armed from persisted expiry timestamps on startup
//! - **Per-user fault isolation**: one broken user entry degrades the pass instead of failing it
//! - **Prometheus metrics**: issuance, revocation, renewal, and timer gauges on `/metrics`
//! - **Health probes**: HTTP endpoints for liveness and readiness checks
//!
//! See the [README.md](../README.md) for detailed usage instructions and examples.

use anyhow::{Context, Result};
use argocd_local_user_controller::cli::Args;
use argocd_local_user_controller::constants::{
    WATCH_BACKOFF_MAX_MS, WATCH_BACKOFF_START_MS, WATCH_RESTART_DELAY_AFTER_END_SECS,
    WATCH_RESTART_DELAY_SECS,
};
use argocd_local_user_controller::controller::reconciler::{
    handle_reconciliation_error, handle_watch_stream_error, reconcile, Reconciler,
};
use argocd_local_user_controller::crd::ClusterArgoCD;
use argocd_local_user_controller::observability::metrics::register_metrics;
use argocd_local_user_controller::server::{start_server, ServerState};
use clap::Parser;
use futures::StreamExt;
use kube::{api::Api, Client};
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Configure rustls crypto provider FIRST, before any other operations
    // Required for rustls 0.23+ when no default provider is set via features
    // We use ring as the crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .unwrap_or_else(|_| panic!("Failed to install rustls crypto provider"));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "argocd_local_user_controller=info".into()),
        )
        .init();

    let args = Args::parse();
    let reconcile_interval = args.reconcile_interval_duration()?;

    info!("Starting ArgoCD Local User Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    // Initialize metrics
    register_metrics()?;

    // Start HTTP server for metrics and probes
    let server_state = ServerState::new();
    let server_state_clone = Arc::clone(&server_state);
    let server_port = args.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    // Watch all namespaces by default so the ClusterArgoCD can live wherever ArgoCD
    // is installed; --watch-namespace narrows the scope on multi-tenant clusters
    let api: Api<ClusterArgoCD> = match args.watch_namespace.as_deref() {
        Some(namespace) => {
            info!("Watching ClusterArgoCD resources in namespace '{}'", namespace);
            Api::namespaced(client.clone(), namespace)
        }
        None => {
            info!("Watching ClusterArgoCD resources in all namespaces");
            Api::all(client.clone())
        }
    };

    // Create reconciler context
    let reconciler = Arc::new(Reconciler::new(client.clone(), reconcile_interval));
    info!(
        "Reconcile interval: {}s between successful passes",
        reconcile_interval.as_secs()
    );

    server_state.mark_ready();

    run_watch_loop(api, reconciler, server_state).await;

    info!("Controller stopped gracefully");
    Ok(())
}

/// Run the controller watch loop until a shutdown signal arrives.
///
/// Watch stream errors are classified by [`handle_watch_stream_error`]: transient
/// failures back off and keep the stream alive while fatal ones end the stream,
/// which this loop answers with a delayed restart.
async fn run_watch_loop(
    api: Api<ClusterArgoCD>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) {
    // Shared backoff state for watch stream errors, doubled on 429 responses
    let backoff_duration_ms = Arc::new(AtomicU64::new(WATCH_BACKOFF_START_MS));

    // Set up shutdown signal handler - mark server as not ready when SIGTERM/SIGINT received
    // so readiness probes fail while in-flight reconciliations drain
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.mark_not_ready();
    });

    // Run controller with automatic restart on stream end
    loop {
        // Check if we should shut down before starting/restarting the watch
        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        info!("Starting controller watch loop...");
        let backoff_clone = Arc::clone(&backoff_duration_ms);
        Controller::new(api.clone(), watcher::Config::default().any_semantic())
            .shutdown_on_signal()
            .run(
                reconcile,
                handle_reconciliation_error,
                Arc::clone(&reconciler),
            )
            .filter_map(move |event| {
                let backoff = Arc::clone(&backoff_clone);
                async move {
                    match &event {
                        Ok(_) => {
                            // Successful event, reset backoff
                            backoff.store(WATCH_BACKOFF_START_MS, Ordering::Relaxed);
                            debug!("watch.event.success");
                            Some(event)
                        }
                        Err(e) => {
                            // Convert the controller error to a string for classification
                            let error_string = format!("{e:?}");
                            match handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                WATCH_BACKOFF_MAX_MS,
                                WATCH_RESTART_DELAY_SECS,
                            )
                            .await
                            {
                                Some(_) => Some(event), // Continue with this event
                                None => None,           // Filter out to allow restart
                            }
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .await;

        // Check if shutdown was requested
        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        // Controller stream ended without a shutdown signal - restart the watch
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            WATCH_RESTART_DELAY_AFTER_END_SECS
        );
        tokio::time::sleep(std::time::Duration::from_secs(
            WATCH_RESTART_DELAY_AFTER_END_SECS,
        ))
        .await;
    }
}
