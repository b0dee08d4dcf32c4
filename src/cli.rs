//! # Command-Line Interface
//!
//! Flags for the controller binary. Every flag also reads from an
//! environment variable so deployments can configure the controller
//! through a ConfigMap with `envFrom`.

use crate::constants::{DEFAULT_METRICS_PORT, DEFAULT_RECONCILE_INTERVAL};
use crate::controller::reconciler::validation::parse_duration;
use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

/// ArgoCD local-user token controller
#[derive(Parser, Debug, Clone)]
#[command(
    name = "argocd-local-user-controller",
    version,
    about = "Kubernetes controller that manages ArgoCD local-user API tokens"
)]
pub struct Args {
    /// Port for the metrics and probe HTTP server
    #[arg(long, env = "METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Namespace to watch for ClusterArgoCD resources; watches all
    /// namespaces when unset
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Interval between periodic reconciliations of a healthy resource,
    /// as a Kubernetes duration string ("30s", "5m", "12h")
    #[arg(long, env = "RECONCILE_INTERVAL", default_value = DEFAULT_RECONCILE_INTERVAL)]
    pub reconcile_interval: String,
}

impl Args {
    /// Parse and validate the reconcile interval flag
    pub fn reconcile_interval_duration(&self) -> Result<Duration> {
        parse_duration(&self.reconcile_interval).with_context(|| {
            format!(
                "Invalid --reconcile-interval '{}'",
                self.reconcile_interval
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_no_flags_given() {
        let args = Args::parse_from(["argocd-local-user-controller"]);
        assert_eq!(args.metrics_port, DEFAULT_METRICS_PORT);
        assert_eq!(args.watch_namespace, None);
        assert_eq!(args.reconcile_interval, DEFAULT_RECONCILE_INTERVAL);
    }

    #[test]
    fn reconcile_interval_parses_to_duration() {
        let args = Args::parse_from([
            "argocd-local-user-controller",
            "--reconcile-interval",
            "2m",
        ]);
        let duration = args.reconcile_interval_duration();
        assert!(duration.is_ok());
        assert_eq!(duration.unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn malformed_reconcile_interval_is_rejected() {
        let args = Args::parse_from([
            "argocd-local-user-controller",
            "--reconcile-interval",
            "five minutes",
        ]);
        assert!(args.reconcile_interval_duration().is_err());
    }

    #[test]
    fn watch_namespace_flag_narrows_the_watch() {
        let args = Args::parse_from([
            "argocd-local-user-controller",
            "--watch-namespace",
            "argocd",
        ]);
        assert_eq!(args.watch_namespace.as_deref(), Some("argocd"));
    }
}
