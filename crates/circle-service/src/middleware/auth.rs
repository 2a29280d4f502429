//! Authentication middleware for participant-facing routes.
//!
//! Extracts the Bearer token from the Authorization header, validates it as an
//! HS256 participant token, and injects `AuthenticatedParticipant` into the
//! request extensions for handlers to pick up.

use crate::errors::CircleError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use common::jwt::validate_participant_token;
use common::secret::{ExposeSecret, SecretString};
use common::types::ParticipantId;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_secret: SecretString,
    pub clock_skew: Duration,
}

/// The caller, as proven by a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedParticipant {
    pub participant_id: ParticipantId,

    /// Display name from the token, forwarded to the media room on join.
    pub name: Option<String>,
}

fn extract_bearer_token(req: &Request) -> Result<&str, CircleError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "circle.middleware.auth", "Missing Authorization header");
            CircleError::InvalidToken("Missing Authorization header".to_string())
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "circle.middleware.auth", "Invalid Authorization header format");
        CircleError::InvalidToken("Invalid Authorization header format".to_string())
    })
}

/// Require a valid participant token.
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing or invalid
/// - Otherwise continues with `AuthenticatedParticipant` in extensions
#[instrument(skip_all, name = "circle.middleware.auth")]
pub async fn require_participant(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, CircleError> {
    let token = extract_bearer_token(&req)?;

    let claims = validate_participant_token(
        token,
        state.jwt_secret.expose_secret().as_bytes(),
        state.clock_skew,
    )
    .map_err(|e| CircleError::InvalidToken(e.to_string()))?;

    let participant_id = claims
        .participant_id()
        .map_err(|e| CircleError::InvalidToken(e.to_string()))?;

    req.extensions_mut().insert(AuthenticatedParticipant {
        participant_id,
        name: claims.name,
    });

    Ok(next.run(req).await)
}
