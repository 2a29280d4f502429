//! Circle service error types.
//!
//! One enum covers the whole taxonomy: authorization, invalid transition,
//! validation, concurrency, transport, not-found, plus infrastructure failures.
//! Every variant maps to a stable machine-readable `code` and an HTTP status via
//! the `IntoResponse` impl. Rule violations never surface as a bare 500.
//!
//! Infrastructure errors (database, internal) return generic messages to the
//! client; the actual error is logged server-side.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// PostgreSQL SQLSTATE for `lock_not_available` (raised when `lock_timeout` fires).
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

/// Circle service error type.
///
/// Maps to HTTP status codes:
/// - NotInRoom, NotKeeper, NotCurrentSpeaker, NotNextSpeaker, NotJoinable: 403
/// - NotFound: 404
/// - StaleVersion: 409
/// - Transport: 500 (`LIVEKIT_ERROR`)
/// - InvalidTransition, RoomNotActive, RoomNotWaiting, RoomAlreadyEnded,
///   InvalidParticipantOrder, BadRequest: 400
/// - InvalidToken: 401
/// - RoomBusy: 503 (retryable)
/// - Database, Internal: 500
#[derive(Debug, Error)]
pub enum CircleError {
    #[error("Not in room: {0}")]
    NotInRoom(String),

    #[error("Only the keeper may perform this action")]
    NotKeeper,

    #[error("Only the current speaker or the keeper may pass the stick")]
    NotCurrentSpeaker,

    #[error("Only the next speaker may accept the stick")]
    NotNextSpeaker,

    #[error("Session is not joinable: {0}")]
    NotJoinable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stale version: client saw {last_seen}, room is at {current}")]
    StaleVersion { last_seen: i64, current: i64 },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Room is not active")]
    RoomNotActive,

    #[error("Room is not in the waiting room")]
    RoomNotWaiting,

    #[error("Room has already ended")]
    RoomAlreadyEnded,

    #[error("Invalid participant order: {0}")]
    InvalidParticipantOrder(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Room is busy, retry")]
    RoomBusy,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error")]
    Internal,
}

impl CircleError {
    /// Returns the stable error code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            CircleError::NotInRoom(_) => "NOT_IN_ROOM",
            CircleError::NotKeeper => "NOT_KEEPER",
            CircleError::NotCurrentSpeaker => "NOT_CURRENT_SPEAKER",
            CircleError::NotNextSpeaker => "NOT_NEXT_SPEAKER",
            CircleError::NotJoinable(_) => "NOT_JOINABLE",
            CircleError::NotFound(_) => "NOT_FOUND",
            CircleError::StaleVersion { .. } => "STALE_VERSION",
            CircleError::InvalidTransition(_) => "INVALID_TRANSITION",
            CircleError::RoomNotActive => "ROOM_NOT_ACTIVE",
            CircleError::RoomNotWaiting => "ROOM_NOT_WAITING",
            CircleError::RoomAlreadyEnded => "ROOM_ALREADY_ENDED",
            CircleError::InvalidParticipantOrder(_) => "INVALID_PARTICIPANT_ORDER",
            CircleError::Transport(_) => "LIVEKIT_ERROR",
            CircleError::RoomBusy => "ROOM_BUSY",
            CircleError::InvalidToken(_) => "INVALID_TOKEN",
            CircleError::BadRequest(_) => "BAD_REQUEST",
            CircleError::Database(_) => "DATABASE_ERROR",
            CircleError::Internal => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error (also used for metrics).
    pub fn status_code(&self) -> u16 {
        match self {
            CircleError::NotInRoom(_)
            | CircleError::NotKeeper
            | CircleError::NotCurrentSpeaker
            | CircleError::NotNextSpeaker
            | CircleError::NotJoinable(_) => 403,
            CircleError::NotFound(_) => 404,
            CircleError::StaleVersion { .. } => 409,
            CircleError::InvalidTransition(_)
            | CircleError::RoomNotActive
            | CircleError::RoomNotWaiting
            | CircleError::RoomAlreadyEnded
            | CircleError::InvalidParticipantOrder(_)
            | CircleError::BadRequest(_) => 400,
            CircleError::InvalidToken(_) => 401,
            CircleError::RoomBusy => 503,
            CircleError::Transport(_) | CircleError::Database(_) | CircleError::Internal => 500,
        }
    }

    /// Whether the client may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CircleError::RoomBusy)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for CircleError {
    fn into_response(self) -> Response {
        let message = match &self {
            CircleError::Database(err) => {
                tracing::error!(target: "circle.database", error = %err, "Database operation failed");
                "An internal database error occurred".to_string()
            }
            CircleError::Transport(err) => {
                tracing::error!(target: "circle.transport", error = %err, "Media transport call failed");
                "The media room is unavailable".to_string()
            }
            CircleError::Internal => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(value) = "Bearer realm=\"talking-circle\", error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }

        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, header::HeaderValue::from_static("1"));
        }

        response
    }
}

/// Convert sqlx errors to CircleError.
///
/// A lock wait that exceeded `lock_timeout` becomes the retryable `RoomBusy`.
impl From<sqlx::Error> for CircleError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(PG_LOCK_NOT_AVAILABLE) {
                return CircleError::RoomBusy;
            }
        }
        CircleError::Database(err.to_string())
    }
}
