//! Events accepted by the talking-stick state machine.

use common::types::ParticipantId;
use serde::{Deserialize, Serialize};

/// Reason recorded when a keeper ends the circle without giving one.
pub const DEFAULT_END_REASON: &str = "ended by keeper";

/// Reason recorded when the keeper-absence task closes a room.
pub const KEEPER_ABSENT_REASON: &str = "keeper absent";

/// A requested transition, tagged by `type` on the wire.
///
/// ```json
/// {"type": "pass_stick"}
/// {"type": "reorder", "new_order": ["<uuid>", "<uuid>"]}
/// {"type": "end_room", "reason": "time is up"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    StartRoom,
    PassStick,
    AcceptStick,
    #[serde(alias = "skip_participant")]
    ForcePassStick,
    Reorder {
        new_order: Vec<ParticipantId>,
    },
    EndRoom {
        #[serde(default = "default_end_reason")]
        reason: String,
    },
}

fn default_end_reason() -> String {
    DEFAULT_END_REASON.to_string()
}

impl RoomEvent {
    /// Stable tag stored in `room_event_log.event_type` and used as a metric label.
    pub fn tag(&self) -> &'static str {
        match self {
            RoomEvent::StartRoom => "start_room",
            RoomEvent::PassStick => "pass_stick",
            RoomEvent::AcceptStick => "accept_stick",
            RoomEvent::ForcePassStick => "force_pass_stick",
            RoomEvent::Reorder { .. } => "reorder",
            RoomEvent::EndRoom { .. } => "end_room",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_events_parse_from_tag() {
        let event: RoomEvent = serde_json::from_str(r#"{"type":"accept_stick"}"#).unwrap();
        assert_eq!(event, RoomEvent::AcceptStick);
        assert_eq!(event.tag(), "accept_stick");
    }

    #[test]
    fn test_skip_participant_is_alias_of_force_pass() {
        let event: RoomEvent = serde_json::from_str(r#"{"type":"skip_participant"}"#).unwrap();
        assert_eq!(event, RoomEvent::ForcePassStick);
    }

    #[test]
    fn test_end_room_reason_defaults() {
        let event: RoomEvent = serde_json::from_str(r#"{"type":"end_room"}"#).unwrap();
        assert_eq!(
            event,
            RoomEvent::EndRoom {
                reason: DEFAULT_END_REASON.to_string()
            }
        );
    }

    #[test]
    fn test_reorder_carries_ids() {
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        let json = format!(r#"{{"type":"reorder","new_order":["{a}","{b}"]}}"#);

        let event: RoomEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, RoomEvent::Reorder { new_order: vec![a, b] });
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert!(serde_json::from_str::<RoomEvent>(r#"{"type":"grab_stick"}"#).is_err());
    }
}
