//! Room aggregate and its read-only snapshot.

use crate::errors::CircleError;
use common::types::{ParticipantId, SessionId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Created, keeper has not started the circle yet.
    WaitingRoom,

    /// Circle in progress; speaker pointers are set.
    Active,

    /// Terminal.
    Ended,
}

impl RoomStatus {
    /// Returns the string stored in the `rooms.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::WaitingRoom => "waiting_room",
            RoomStatus::Active => "active",
            RoomStatus::Ended => "ended",
        }
    }

    /// Parse the database representation.
    pub fn from_db(value: &str) -> Result<Self, CircleError> {
        match value {
            "waiting_room" => Ok(RoomStatus::WaitingRoom),
            "active" => Ok(RoomStatus::Active),
            "ended" => Ok(RoomStatus::Ended),
            other => Err(CircleError::Database(format!(
                "unknown room status '{other}'"
            ))),
        }
    }
}

/// Who holds the stick right now, and whether a handoff is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Speaking,
    /// The holder declared a pass; the next speaker has not accepted yet.
    Passing,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Speaking => "speaking",
            TurnState::Passing => "passing",
        }
    }

    pub fn from_db(value: &str) -> Result<Self, CircleError> {
        match value {
            "idle" => Ok(TurnState::Idle),
            "speaking" => Ok(TurnState::Speaking),
            "passing" => Ok(TurnState::Passing),
            other => Err(CircleError::Database(format!(
                "unknown turn state '{other}'"
            ))),
        }
    }
}

/// Status plus status-specific detail. Only `ended` carries data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusDetail {
    WaitingRoom,
    Active,
    Ended { reason: String },
}

/// The persisted room aggregate.
///
/// Mutated only by the transition handlers under the orchestrator's row lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub session_id: SessionId,
    pub status: RoomStatus,
    pub turn_state: TurnState,
    pub keeper: ParticipantId,
    pub current_speaker: Option<ParticipantId>,
    pub next_speaker: Option<ParticipantId>,
    pub talking_order: Vec<ParticipantId>,
    pub state_version: i64,
    pub ended_reason: Option<String>,
}

impl Room {
    /// A freshly created room: waiting, idle, nobody in the order, version 0.
    pub fn new_waiting(session_id: SessionId, keeper: ParticipantId) -> Self {
        Self {
            session_id,
            status: RoomStatus::WaitingRoom,
            turn_state: TurnState::Idle,
            keeper,
            current_speaker: None,
            next_speaker: None,
            talking_order: Vec::new(),
            state_version: 0,
            ended_reason: None,
        }
    }

    pub fn is_keeper(&self, participant: ParticipantId) -> bool {
        self.keeper == participant
    }

    /// Project the aggregate into its published/API form.
    pub fn snapshot(&self) -> RoomState {
        let status_detail = match self.status {
            RoomStatus::WaitingRoom => StatusDetail::WaitingRoom,
            RoomStatus::Active => StatusDetail::Active,
            RoomStatus::Ended => StatusDetail::Ended {
                reason: self.ended_reason.clone().unwrap_or_default(),
            },
        };

        RoomState {
            session_id: self.session_id,
            version: self.state_version,
            status: self.status,
            turn_state: self.turn_state,
            status_detail,
            current_speaker: self.current_speaker,
            next_speaker: self.next_speaker,
            talking_order: self.talking_order.clone(),
            keeper: self.keeper,
        }
    }
}

/// Read-only projection of a room at one version.
///
/// Returned by the API, published to the media room, and stored verbatim in
/// every event log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomState {
    pub session_id: SessionId,
    pub version: i64,
    pub status: RoomStatus,
    pub turn_state: TurnState,
    pub status_detail: StatusDetail,
    pub current_speaker: Option<ParticipantId>,
    pub next_speaker: Option<ParticipantId>,
    pub talking_order: Vec<ParticipantId>,
    pub keeper: ParticipantId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_room_is_waiting_at_version_zero() {
        let room = Room::new_waiting(SessionId::new(), ParticipantId::new());

        assert_eq!(room.status, RoomStatus::WaitingRoom);
        assert_eq!(room.turn_state, TurnState::Idle);
        assert_eq!(room.state_version, 0);
        assert!(room.talking_order.is_empty());
        assert!(room.current_speaker.is_none());
        assert!(room.next_speaker.is_none());
    }

    #[test]
    fn test_status_round_trips_through_db_strings() {
        for status in [RoomStatus::WaitingRoom, RoomStatus::Active, RoomStatus::Ended] {
            assert_eq!(RoomStatus::from_db(status.as_str()).unwrap(), status);
        }
        for turn in [TurnState::Idle, TurnState::Speaking, TurnState::Passing] {
            assert_eq!(TurnState::from_db(turn.as_str()).unwrap(), turn);
        }
        assert!(RoomStatus::from_db("paused").is_err());
    }

    #[test]
    fn test_ended_snapshot_carries_reason() {
        let mut room = Room::new_waiting(SessionId::new(), ParticipantId::new());
        room.status = RoomStatus::Ended;
        room.ended_reason = Some("keeper absent".to_string());

        let json = serde_json::to_value(room.snapshot()).unwrap();
        assert_eq!(json["status"], "ended");
        assert_eq!(json["status_detail"]["status"], "ended");
        assert_eq!(json["status_detail"]["reason"], "keeper absent");
    }

    #[test]
    fn test_waiting_snapshot_has_no_reason() {
        let room = Room::new_waiting(SessionId::new(), ParticipantId::new());

        let json = serde_json::to_value(room.snapshot()).unwrap();
        assert_eq!(json["status_detail"], serde_json::json!({"status": "waiting_room"}));
        assert_eq!(json["turn_state"], "idle");
        assert!(json["current_speaker"].is_null());
    }
}
