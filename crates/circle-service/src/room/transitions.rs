//! Guarded transition handlers.
//!
//! Each handler takes an already-reconciled room and returns the mutated room
//! or a typed rejection. None of them touch `state_version`; the orchestrator
//! bumps it once a handler succeeds.

use crate::errors::CircleError;
use crate::room::events::{RoomEvent, DEFAULT_END_REASON};
use crate::room::order::{next_in_order, ConnectedSet};
use crate::room::state::{Room, RoomStatus, TurnState};
use common::types::ParticipantId;

/// Dispatch `event` to its handler.
///
/// An ended room rejects every event with `RoomAlreadyEnded` before any
/// handler-specific guard runs.
pub fn apply(
    room: Room,
    actor: ParticipantId,
    event: &RoomEvent,
    connected: &ConnectedSet,
) -> Result<Room, CircleError> {
    if room.status == RoomStatus::Ended {
        return Err(CircleError::RoomAlreadyEnded);
    }

    match event {
        RoomEvent::StartRoom => start_room(room, actor, connected),
        RoomEvent::PassStick => pass_stick(room, actor),
        RoomEvent::AcceptStick => accept_stick(room, actor, connected),
        RoomEvent::ForcePassStick => force_pass_stick(room, actor, connected),
        RoomEvent::Reorder { new_order } => reorder(room, actor, new_order),
        RoomEvent::EndRoom { reason } => end_room(room, actor, reason),
    }
}

pub fn start_room(
    mut room: Room,
    actor: ParticipantId,
    connected: &ConnectedSet,
) -> Result<Room, CircleError> {
    if !room.is_keeper(actor) {
        return Err(CircleError::NotKeeper);
    }
    if room.status != RoomStatus::WaitingRoom {
        return Err(CircleError::RoomNotWaiting);
    }

    let keeper = room.keeper;
    room.status = RoomStatus::Active;
    room.turn_state = TurnState::Speaking;
    room.current_speaker = Some(keeper);
    room.next_speaker = next_in_order(&room.talking_order, keeper, connected).or(Some(keeper));

    Ok(room)
}

/// Declare intent to hand over. Pointers stay put until the next speaker accepts.
pub fn pass_stick(mut room: Room, actor: ParticipantId) -> Result<Room, CircleError> {
    if room.status != RoomStatus::Active {
        return Err(CircleError::RoomNotActive);
    }
    if room.current_speaker != Some(actor) && !room.is_keeper(actor) {
        return Err(CircleError::NotCurrentSpeaker);
    }

    room.turn_state = TurnState::Passing;
    Ok(room)
}

pub fn accept_stick(
    mut room: Room,
    actor: ParticipantId,
    connected: &ConnectedSet,
) -> Result<Room, CircleError> {
    if room.status != RoomStatus::Active {
        return Err(CircleError::RoomNotActive);
    }
    if room.turn_state != TurnState::Passing {
        return Err(CircleError::InvalidTransition(
            "no pass is in progress".to_string(),
        ));
    }
    if room.next_speaker != Some(actor) {
        return Err(CircleError::NotNextSpeaker);
    }

    room.current_speaker = Some(actor);
    room.next_speaker = next_in_order(&room.talking_order, actor, connected).or(Some(actor));
    room.turn_state = TurnState::Speaking;

    Ok(room)
}

/// Skip the pending next speaker; the pass stays open for whoever follows them.
pub fn force_pass_stick(
    mut room: Room,
    actor: ParticipantId,
    connected: &ConnectedSet,
) -> Result<Room, CircleError> {
    if room.status != RoomStatus::Active {
        return Err(CircleError::RoomNotActive);
    }
    if !room.is_keeper(actor) {
        return Err(CircleError::NotKeeper);
    }
    if room.turn_state != TurnState::Passing {
        return Err(CircleError::InvalidTransition(
            "no pass is in progress".to_string(),
        ));
    }

    let skipped = room.next_speaker.ok_or_else(|| {
        CircleError::InvalidTransition("no next speaker to skip".to_string())
    })?;

    let mut eligible = connected.clone();
    eligible.remove(&skipped);

    let replacement = next_in_order(&room.talking_order, skipped, &eligible).ok_or_else(|| {
        CircleError::InvalidTransition("no other participant can take the stick".to_string())
    })?;

    room.next_speaker = Some(replacement);
    Ok(room)
}

pub fn reorder(
    mut room: Room,
    actor: ParticipantId,
    new_order: &[ParticipantId],
) -> Result<Room, CircleError> {
    if !room.is_keeper(actor) {
        return Err(CircleError::NotKeeper);
    }

    let mut proposed = new_order.to_vec();
    let mut current = room.talking_order.clone();
    proposed.sort_unstable();
    current.sort_unstable();

    if proposed != current {
        return Err(CircleError::InvalidParticipantOrder(
            "proposed order must contain exactly the participants in the current order"
                .to_string(),
        ));
    }

    let keeper_listed = room.talking_order.contains(&room.keeper);
    if keeper_listed && new_order.first() != Some(&room.keeper) {
        return Err(CircleError::InvalidParticipantOrder(
            "the keeper must stay first in the order".to_string(),
        ));
    }

    room.talking_order = new_order.to_vec();
    Ok(room)
}

/// End the circle. Accepted from the waiting room as well as while active.
pub fn end_room(mut room: Room, actor: ParticipantId, reason: &str) -> Result<Room, CircleError> {
    if !room.is_keeper(actor) {
        return Err(CircleError::NotKeeper);
    }
    if room.status == RoomStatus::Ended {
        return Err(CircleError::RoomAlreadyEnded);
    }

    let reason = reason.trim();
    let reason = if reason.is_empty() {
        DEFAULT_END_REASON
    } else {
        reason
    };

    room.status = RoomStatus::Ended;
    room.turn_state = TurnState::Idle;
    room.current_speaker = None;
    room.next_speaker = None;
    room.ended_reason = Some(reason.to_string());

    Ok(room)
}
