//! # Per-User Decision Logic
//!
//! Pure decision table mapping `(declared spec, stored record)` to the
//! action the reconciler takes for one user. State is never stored; it is
//! re-derived on every pass from the spec and the persisted secret.

use std::collections::{BTreeMap, HashSet};

use crate::constants::EXTRA_CONFIG_ACCOUNT_PREFIX;

use super::user_secrets::UserSecretRecord;

/// Usernames declared through `extraConfig` rather than `localUsers`
///
/// Only plain `accounts.<name>` keys count; keys with a further dot, such
/// as `accounts.<name>.enabled`, qualify an account declared elsewhere and
/// do not mark one on their own.
pub fn extra_config_accounts(extra_config: &BTreeMap<String, String>) -> HashSet<String> {
    extra_config
        .keys()
        .filter_map(|key| key.strip_prefix(EXTRA_CONFIG_ACCOUNT_PREFIX))
        .filter(|name| !name.is_empty() && !name.contains('.'))
        .map(String::from)
        .collect()
}

/// Why a token is being issued, carried into logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueReason {
    /// No record exists yet for this user
    NewUser,
    /// The declared tokenLifetime no longer matches the stored record
    LifetimeChanged,
    /// autoRenewToken changed in a way that requires a fresh token
    AutoRenewChanged,
    /// A renewal timer fired
    Renewal,
}

impl IssueReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueReason::NewUser => "initial token issuance",
            IssueReason::LifetimeChanged => "token lifetime changed",
            IssueReason::AutoRenewChanged => "auto-renew setting changed",
            IssueReason::Renewal => "scheduled token renewal",
        }
    }
}

/// Action the reconciler takes for one declared user this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Account is declared via extraConfig and managed outside this
    /// controller
    Skip,
    /// apiKey disabled and nothing is persisted; nothing to do
    Idle,
    /// apiKey disabled but a record exists; tear everything down
    Revoke,
    /// Mint a token and persist the record
    Issue(IssueReason),
    /// Record matches the spec; arm a renewal timer if one should exist
    /// but does not (covers controller restart, where in-memory timers
    /// were lost but the persisted expiry survives)
    EnsureRenewal,
    /// Only the autoRenew flag changed; persist it without re-issuing
    UpdateAutoRenew { enabled: bool },
}

/// Everything the decision table consumes for one user
#[derive(Debug)]
pub struct DecisionInput<'a> {
    /// Username appears under `accounts.` in extraConfig
    pub externally_managed: bool,
    pub api_key_enabled: bool,
    /// Raw declared lifetime string; drift is detected by string
    /// comparison against the stored record, so "60m" and "1h" differ
    pub declared_lifetime: &'a str,
    /// Declared lifetime parsed to seconds, 0 for never expires
    pub lifetime_secs: u64,
    pub auto_renew: bool,
    pub stored: Option<&'a UserSecretRecord>,
}

/// Decide what to do for one user
pub fn decide(input: &DecisionInput<'_>) -> UserAction {
    if input.externally_managed {
        return UserAction::Skip;
    }

    let Some(stored) = input.stored else {
        return if input.api_key_enabled {
            UserAction::Issue(IssueReason::NewUser)
        } else {
            UserAction::Idle
        };
    };

    if !input.api_key_enabled {
        return UserAction::Revoke;
    }

    let lifetime_changed = stored.token_lifetime != input.declared_lifetime;
    let auto_renew_changed = stored.auto_renew != input.auto_renew;

    if !lifetime_changed && !auto_renew_changed {
        return UserAction::EnsureRenewal;
    }

    if auto_renew_changed && !input.auto_renew {
        return if lifetime_changed {
            UserAction::Issue(IssueReason::LifetimeChanged)
        } else {
            UserAction::UpdateAutoRenew { enabled: false }
        };
    }

    // Re-enabling auto-renew on an unchanged, expiring lifetime only needs
    // a timer and a flag update, not a new token
    if auto_renew_changed && !lifetime_changed && input.lifetime_secs > 0 {
        return UserAction::UpdateAutoRenew { enabled: true };
    }

    UserAction::Issue(if lifetime_changed {
        IssueReason::LifetimeChanged
    } else {
        IssueReason::AutoRenewChanged
    })
}
