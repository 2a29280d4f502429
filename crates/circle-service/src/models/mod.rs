//! Request and response bodies for the circle HTTP API.

use crate::repositories::RoomEventLogEntry;
use crate::room::{RoomEvent, RoomState};
use crate::services::JoinCredential;
use common::types::{ParticipantId, SessionId};
use serde::{Deserialize, Serialize};

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    /// Generic failure description; details are only logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /api/v1/sessions/:id/room/events`.
///
/// ```json
/// { "event": {"type": "pass_stick"}, "last_seen_version": 4 }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyEventRequest {
    pub event: RoomEvent,

    /// The version the client last read; a mismatch is rejected as stale.
    pub last_seen_version: i64,
}

/// Response of `POST /api/v1/sessions/:id/join`.
#[derive(Debug, Clone, Serialize)]
pub struct JoinResponse {
    pub session_id: SessionId,
    pub title: String,
    pub credential: JoinCredential,
    pub state: RoomState,
}

/// Body of the single-participant moderation endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ModerationRequest {
    pub participant_id: ParticipantId,
}

/// Response of `POST /api/v1/sessions/:id/room/mute-all`.
#[derive(Debug, Clone, Serialize)]
pub struct MuteAllResponse {
    pub muted: usize,
}

/// Response of `GET /api/v1/sessions/:id/room/history`.
#[derive(Debug, Clone, Serialize)]
pub struct RoomHistoryResponse {
    pub session_id: SessionId,
    pub entries: Vec<RoomEventLogEntry>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_event_request_parses() {
        let request: ApplyEventRequest = serde_json::from_str(
            r#"{"event":{"type":"end_room","reason":"done"},"last_seen_version":7}"#,
        )
        .unwrap();

        assert_eq!(request.last_seen_version, 7);
        assert_eq!(
            request.event,
            RoomEvent::EndRoom {
                reason: "done".to_string()
            }
        );
    }

    #[test]
    fn test_apply_event_request_requires_version() {
        let result =
            serde_json::from_str::<ApplyEventRequest>(r#"{"event":{"type":"pass_stick"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_readiness_response_omits_empty_fields() {
        let response = ReadinessResponse {
            status: "ready",
            database: Some("healthy"),
            error: None,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ready");
        assert!(json.get("error").is_none());
    }
}
