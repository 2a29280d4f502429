//! Participant JWT utilities shared across Talking Circle services.
//!
//! The circle service authenticates every API caller with a bearer JWT whose
//! `sub` claim is the participant UUID. Tokens are HS256-signed with a secret
//! shared with the identity provider that issues them.
//!
//! This module provides:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - The participant claims structure
//! - Validation (signature, expiry, iat) and signing helpers
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted; the algorithm in the header is never trusted
//! - Error messages are generic; details are logged at debug level
//! - The `sub` field is redacted in Debug output

use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::types::ParticipantId;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical participant tokens are 200-400 bytes. Anything larger is rejected
/// before base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during JWT validation.
///
/// All variants share one client-facing message to prevent information leakage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is structurally invalid or the signature does not verify.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token `exp` is in the past.
    #[error("The access token is invalid or expired")]
    Expired,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,

    /// Token `sub` is not a participant UUID.
    #[error("The access token is invalid or expired")]
    InvalidSubject,

    /// Token could not be signed (signing side only).
    #[error("Failed to sign token")]
    SigningFailed,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Participant token claims.
///
/// The `sub` field carries the participant UUID and is redacted in Debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct ParticipantClaims {
    /// Subject (participant UUID) - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Optional display name, forwarded to the media room on join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl fmt::Debug for ParticipantClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticipantClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("name", &self.name)
            .finish()
    }
}

impl ParticipantClaims {
    /// Parse the subject as a participant identifier.
    ///
    /// # Errors
    ///
    /// Returns `JwtValidationError::InvalidSubject` if `sub` is not a UUID.
    pub fn participant_id(&self) -> Result<ParticipantId, JwtValidationError> {
        let raw = self.sub.strip_prefix("user:").unwrap_or(&self.sub);
        ParticipantId::from_str(raw).map_err(|_| JwtValidationError::InvalidSubject)
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Validate a participant token and return its claims.
///
/// Checks, in order: size, HS256 signature, `exp`, `iat` against `clock_skew`,
/// and that `sub` parses as a participant UUID.
///
/// # Errors
///
/// Returns a `JwtValidationError` variant describing the first failed check.
pub fn validate_participant_token(
    token: &str,
    secret: &[u8],
    clock_skew: Duration,
) -> Result<ParticipantClaims, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation.leeway = 0;

    let data = decode::<ParticipantClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Token rejected during decode");
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtValidationError::Expired,
                _ => JwtValidationError::MalformedToken,
            }
        })?;

    validate_iat(data.claims.iat, clock_skew)?;
    data.claims.participant_id()?;

    Ok(data.claims)
}

/// Sign participant claims with HS256.
///
/// Used by the identity provider side and by test tooling.
///
/// # Errors
///
/// Returns `JwtValidationError::SigningFailed` if encoding fails.
pub fn sign_participant_token(
    claims: &ParticipantClaims,
    secret: &[u8],
) -> Result<String, JwtValidationError> {
    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".to_string());

    encode(&header, claims, &EncodingKey::from_secret(secret)).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to sign participant token");
        JwtValidationError::SigningFailed
    })
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // clock_skew is bounded to MAX_CLOCK_SKEW by config validation
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const SECRET: &[u8] = b"test-signing-secret-0123456789abcdef";

    fn claims_for(sub: &str, exp_offset: i64, iat_offset: i64) -> ParticipantClaims {
        let now = chrono::Utc::now().timestamp();
        ParticipantClaims {
            sub: sub.to_string(),
            exp: now + exp_offset,
            iat: now + iat_offset,
            name: None,
        }
    }

    #[test]
    fn test_default_clock_skew_is_5_minutes() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    #[test]
    fn test_sign_then_validate_returns_participant() {
        let participant = Uuid::new_v4();
        let token =
            sign_participant_token(&claims_for(&participant.to_string(), 600, 0), SECRET).unwrap();

        let claims = validate_participant_token(&token, SECRET, DEFAULT_CLOCK_SKEW).unwrap();
        assert_eq!(claims.participant_id().unwrap(), ParticipantId(participant));
    }

    #[test]
    fn test_user_prefixed_subject_is_accepted() {
        let participant = Uuid::new_v4();
        let claims = claims_for(&format!("user:{participant}"), 600, 0);
        assert_eq!(claims.participant_id().unwrap(), ParticipantId(participant));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token =
            sign_participant_token(&claims_for(&Uuid::new_v4().to_string(), 600, 0), SECRET)
                .unwrap();

        let result = validate_participant_token(&token, b"another-secret", DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), JwtValidationError::MalformedToken);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token =
            sign_participant_token(&claims_for(&Uuid::new_v4().to_string(), -120, -600), SECRET)
                .unwrap();

        let result = validate_participant_token(&token, SECRET, DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), JwtValidationError::Expired);
    }

    #[test]
    fn test_non_uuid_subject_is_rejected() {
        let token = sign_participant_token(&claims_for("alice", 600, 0), SECRET).unwrap();

        let result = validate_participant_token(&token, SECRET, DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), JwtValidationError::InvalidSubject);
    }

    #[test]
    fn test_oversized_token_is_rejected() {
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let result = validate_participant_token(&token, SECRET, DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), JwtValidationError::TokenTooLarge);
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let result = validate_participant_token("not.a.jwt", SECRET, DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), JwtValidationError::MalformedToken);
    }

    #[test]
    fn test_validate_iat_within_and_beyond_skew() {
        let now = 1_700_000_000;
        assert!(validate_iat_at(now + 300, DEFAULT_CLOCK_SKEW, now).is_ok());
        assert_eq!(
            validate_iat_at(now + 301, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        );
        assert!(validate_iat_at(now - 3600, DEFAULT_CLOCK_SKEW, now).is_ok());
    }

    #[test]
    fn test_claims_debug_redacts_sub() {
        let claims = claims_for("secret-participant-id", 600, 0);
        let debug_str = format!("{claims:?}");

        assert!(!debug_str.contains("secret-participant-id"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_claims_without_name_omits_field() {
        let claims = claims_for("user", 600, 0);
        let json = serde_json::to_string(&claims).unwrap();
        assert!(!json.contains("name"));
    }
}
