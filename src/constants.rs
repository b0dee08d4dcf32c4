//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Secret and data-field names are wire contracts with the ArgoCD server's
//! authentication layer and must not change.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default requeue interval after a successful reconcile pass
pub const DEFAULT_RECONCILE_INTERVAL: &str = "5m";

/// Requeue interval when a pass completed but one or more users failed (seconds)
pub const ERROR_REQUEUE_SECS: u64 = 60;

/// Initial watch-stream retry backoff (milliseconds)
pub const WATCH_BACKOFF_START_MS: u64 = 1_000;

/// Upper bound for watch-stream retry backoff (milliseconds)
pub const WATCH_BACKOFF_MAX_MS: u64 = 30_000;

/// Delay before restarting the watch after an unclassified stream error (seconds)
pub const WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Delay before restarting the watch after the stream ends on its own (seconds)
pub const WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 5;

/// Finalizer added to `ClusterArgoCD` resources so renewal timers are
/// cancelled before the resource disappears
pub const LOCAL_USERS_FINALIZER: &str = "argoproj.io/local-users";

/// Name of the shared ArgoCD secret holding the signing key and the
/// per-account token metadata
pub const ARGOCD_SECRET_NAME: &str = "argocd-secret";

/// Data key of the HMAC signing key inside [`ARGOCD_SECRET_NAME`]
pub const SERVER_SECRET_KEY_FIELD: &str = "server.secretkey";

/// Issuer claim on every local-user API token
pub const TOKEN_ISSUER: &str = "argocd";

/// Capability suffix appended to the username in the token subject
pub const API_KEY_CAPABILITY: &str = "apiKey";

/// Label key identifying secrets managed by this controller
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

/// Label value for per-user token secrets, used by the sweep list query
pub const LOCAL_USER_COMPONENT: &str = "local-user";

/// Label key recording which `ClusterArgoCD` owns a user secret
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

// Per-user secret data fields. expAt is a decimal epoch-seconds string
// with "0" meaning the token never expires.
pub const USER_FIELD: &str = "user";
pub const API_TOKEN_FIELD: &str = "apiToken";
pub const EXP_AT_FIELD: &str = "expAt";
pub const TOKEN_LIFETIME_FIELD: &str = "tokenLifetime";
pub const AUTO_RENEW_FIELD: &str = "autoRenew";

/// Prefix of `extraConfig` keys that declare accounts outside this
/// controller's management
pub const EXTRA_CONFIG_ACCOUNT_PREFIX: &str = "accounts.";
