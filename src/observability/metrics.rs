//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `argocd_local_user_reconciliations_total` - Total number of reconciliations
//! - `argocd_local_user_reconciliation_errors_total` - Total number of reconciliation errors
//! - `argocd_local_user_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `argocd_local_user_tokens_issued_total` - Tokens issued, labelled by reason
//! - `argocd_local_user_tokens_revoked_total` - Tokens revoked because apiKey was disabled
//! - `argocd_local_user_renewal_failures_total` - Timer-fired renewals that failed
//! - `argocd_local_user_user_errors_total` - Per-user reconcile failures
//! - `argocd_local_user_secrets_swept_total` - Stale user secrets removed by the sweep
//! - `argocd_local_user_armed_renewal_timers` - Renewal timers currently armed
//! - `argocd_local_user_users_managed` - Local users managed in the last pass
//! - `argocd_local_user_requeues_total` - Requeues, labelled by trigger source

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "argocd_local_user_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "argocd_local_user_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "argocd_local_user_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static TOKENS_ISSUED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "argocd_local_user_tokens_issued_total",
            "Total number of API tokens issued, by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create TOKENS_ISSUED_TOTAL metric - this should never happen")
});

static TOKENS_REVOKED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "argocd_local_user_tokens_revoked_total",
        "Total number of API tokens revoked",
    )
    .expect("Failed to create TOKENS_REVOKED_TOTAL metric - this should never happen")
});

static RENEWAL_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "argocd_local_user_renewal_failures_total",
        "Total number of timer-fired token renewals that failed",
    )
    .expect("Failed to create RENEWAL_FAILURES_TOTAL metric - this should never happen")
});

static USER_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "argocd_local_user_user_errors_total",
        "Total number of per-user reconcile failures",
    )
    .expect("Failed to create USER_ERRORS_TOTAL metric - this should never happen")
});

static SECRETS_SWEPT_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "argocd_local_user_secrets_swept_total",
        "Total number of stale user secrets removed by the sweep",
    )
    .expect("Failed to create SECRETS_SWEPT_TOTAL metric - this should never happen")
});

static ARMED_RENEWAL_TIMERS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "argocd_local_user_armed_renewal_timers",
        "Number of renewal timers currently armed",
    )
    .expect("Failed to create ARMED_RENEWAL_TIMERS metric - this should never happen")
});

static USERS_MANAGED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "argocd_local_user_users_managed",
        "Number of local users managed in the most recent pass",
    )
    .expect("Failed to create USERS_MANAGED metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "argocd_local_user_requeues_total",
            "Total number of requeues, by trigger source",
        ),
        &["trigger"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Registration only fails on duplicate metric names"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(TOKENS_ISSUED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TOKENS_REVOKED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RENEWAL_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(USER_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRETS_SWEPT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARMED_RENEWAL_TIMERS.clone()))?;
    REGISTRY.register(Box::new(USERS_MANAGED.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_tokens_issued(reason: &str) {
    TOKENS_ISSUED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_tokens_revoked() {
    TOKENS_REVOKED_TOTAL.inc();
}

pub fn increment_renewal_failures() {
    RENEWAL_FAILURES_TOTAL.inc();
}

pub fn increment_user_errors() {
    USER_ERRORS_TOTAL.inc();
}

pub fn increment_secrets_swept() {
    SECRETS_SWEPT_TOTAL.inc();
}

pub fn set_armed_timers(count: usize) {
    ARMED_RENEWAL_TIMERS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn set_local_users_managed(count: i64) {
    USERS_MANAGED.set(count);
}

pub fn increment_requeues_total(trigger: &str) {
    REQUEUES_TOTAL.with_label_values(&[trigger]).inc();
}
