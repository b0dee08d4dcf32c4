//! # Reconciler
//!
//! Core reconciliation logic for `ClusterArgoCD` resources.
//!
//! The reconciler:
//! - Watches `ClusterArgoCD` resources across namespaces
//! - Issues, renews, and revokes API tokens for declared local users
//! - Persists per-user token state in Secrets and registers the tokens
//!   in `argocd-secret` so the Argo CD API server accepts them
//! - Arms one in-process renewal timer per expiring auto-renew token
//! - Updates resource status with reconciliation results
//!
//! ## Reconciliation Flow
//!
//! 1. Read the HMAC signing key from `argocd-secret`
//! 2. Decide per declared user: skip, issue, renew, revoke, or leave alone
//! 3. Apply the decision (JWT signing, Secret writes, timer churn)
//! 4. Sweep token state for users no longer declared
//! 5. Update status and requeue

pub mod argocd_secret;
pub mod error_policy;
pub mod local_users;
pub mod reconcile;
pub mod timers;
pub mod types;
pub mod validation;

// Re-export public API
pub use error_policy::{handle_reconciliation_error, handle_watch_stream_error};
pub use local_users::{LocalUserContext, PassSummary};
pub use reconcile::reconcile;
pub use timers::{RenewalTask, RenewalTimerRegistry, TimerGuard};
pub use types::{BackoffState, Reconciler, ReconcilerError};
