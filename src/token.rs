//! # API Token Codec
//!
//! Mints the signed JWTs that Argo CD accepts as local-user API tokens.
//!
//! The claim layout is a wire contract with the Argo CD server: issuer is
//! always `argocd`, the subject is `<username>:apiKey`, and the `exp` claim
//! is omitted entirely for non-expiring tokens.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::constants::{API_KEY_CAPABILITY, TOKEN_ISSUER};

/// Registered JWT claims carried by every issued API token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiTokenClaims {
    /// Issuer, fixed to `argocd`
    pub iss: String,
    /// Subject in the form `<username>:apiKey`
    pub sub: String,
    /// Unique token ID, a fresh UUID per issuance
    pub jti: String,
    /// Issued-at time as epoch seconds
    pub iat: i64,
    /// Not-before time, always equal to `iat`
    pub nbf: i64,
    /// Expiry as epoch seconds; omitted for non-expiring tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// The token subject claimed for a username
pub fn token_subject(username: &str) -> String {
    format!("{username}:{API_KEY_CAPABILITY}")
}

/// Sign a new API token with the given HMAC key
///
/// `lifetime_secs` of zero issues a token without an `exp` claim (never
/// expires). The issued-at and not-before claims are `issued_at` truncated
/// to whole seconds in UTC.
pub fn issue(
    username: &str,
    issued_at: DateTime<Utc>,
    lifetime_secs: i64,
    token_id: &str,
    key: &[u8],
) -> Result<String> {
    let iat = issued_at.timestamp();
    let exp = (lifetime_secs > 0).then(|| iat + lifetime_secs);

    let claims = ApiTokenClaims {
        iss: TOKEN_ISSUER.to_string(),
        sub: token_subject(username),
        jti: token_id.to_string(),
        iat,
        nbf: iat,
        exp,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(key))
        .with_context(|| format!("Failed to sign API token for account {username}"))
}

/// Verify a token against the signing key and return its claims
///
/// Checks the signature and issuer but not expiry: callers compare stored
/// state against a token this controller issued earlier, and an expired
/// token still identifies itself.
pub fn verify(token: &str, key: &[u8]) -> Result<ApiTokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.set_required_spec_claims(&["iss", "sub"]);
    validation.validate_exp = false;

    decode::<ApiTokenClaims>(token, &DecodingKey::from_secret(key), &validation)
        .map(|data| data.claims)
        .context("API token failed signature or claim verification")
}
