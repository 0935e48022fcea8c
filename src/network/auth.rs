//! Authentication Handshake
//!
//! Runs on the first envelope of a session. Reads the provider token from
//! `auth_info`, records the account identity and flips the session to
//! authenticated. The transition is one-way.
//!
//! Tokens are decoded, NOT verified: the signature is never checked here.
//! Whatever fronts this server must establish token authenticity before
//! envelopes reach it.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::ProviderPolicy;
use crate::network::protocol::AuthInfo;
use crate::network::session::{Player, PlayerUid};

/// The only provider whose tokens carry an identity.
pub const GOOGLE_PROVIDER: &str = "google";

/// Claims read from a google ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Account email.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether the provider verified the email.
    #[serde(default)]
    pub email_verified: bool,
    /// Subject.
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry timestamp (Unix seconds). Not enforced.
    #[serde(default)]
    pub exp: u64,
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token could not be decoded.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),
    /// Provider is not supported and the policy is strict.
    #[error("unsupported auth provider: {0:?}")]
    UnsupportedProvider(String),
}

/// Derive a deterministic identity from an email address.
///
/// Same email, same uid, on every call and every server.
pub fn derive_uid(email: &str) -> PlayerUid {
    let mut hasher = Sha256::new();
    hasher.update(b"pogo-envelope-player:");
    hasher.update(email.as_bytes());
    let hash = hasher.finalize();

    let mut id = [0u8; 16];
    id.copy_from_slice(&hash[..16]);
    PlayerUid::new(id)
}

/// Decode token claims without signature or expiry checks.
pub fn decode_unverified(token: &str) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    Ok(data.claims)
}

/// Run the handshake against `player`.
///
/// On success the player is authenticated. Identity fields are written
/// before the flag flips. On error the player is left untouched.
pub fn authenticate(
    player: &mut Player,
    auth_info: Option<&AuthInfo>,
    policy: ProviderPolicy,
) -> Result<(), AuthError> {
    let provider = auth_info.map(|info| info.provider.as_str()).unwrap_or("");

    if provider == GOOGLE_PROVIDER {
        let token = auth_info
            .and_then(|info| info.token.as_ref())
            .map(|jwt| jwt.contents.as_str())
            .ok_or(AuthError::MissingClaim("token"))?;

        let claims = decode_unverified(token)?;
        let email = claims.email.ok_or(AuthError::MissingClaim("email"))?;

        player.uid = Some(derive_uid(&email));
        player.email = Some(email);
        player.email_verified = claims.email_verified;
    } else if policy == ProviderPolicy::Strict {
        return Err(AuthError::UnsupportedProvider(provider.to_string()));
    }

    player.authenticated = true;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
