//! Speaking succession and reconciliation against the connected set.
//!
//! Both functions are pure: the connected set is read fresh from the media
//! transport by the caller before every transition and passed in here.

use crate::room::state::{Room, RoomStatus, TurnState};
use common::types::ParticipantId;
use std::collections::BTreeSet;

/// Participants currently attached to the live media room.
///
/// Ordered so that newly connected participants are appended deterministically.
pub type ConnectedSet = BTreeSet<ParticipantId>;

/// Who speaks after `reference`.
///
/// Walks `order` circularly starting just after `reference` and returns the
/// first connected participant. The walk ends on `reference` itself, so a
/// reference that is the only connected participant is its own successor.
/// Returns `None` if `reference` is not in `order` or nobody in it is connected.
pub fn next_in_order(
    order: &[ParticipantId],
    reference: ParticipantId,
    connected: &ConnectedSet,
) -> Option<ParticipantId> {
    let position = order.iter().position(|id| *id == reference)?;
    let len = order.len();

    (1..=len)
        .filter_map(|step| order.get((position + step) % len))
        .find(|id| connected.contains(id))
        .copied()
}

/// Rebuild the talking order from the connected set.
///
/// Keeper first (if connected), then still-connected participants in their
/// previous relative order, then newcomers. Disconnected participants drop out.
pub fn reconciled_order(
    order: &[ParticipantId],
    keeper: ParticipantId,
    connected: &ConnectedSet,
) -> Vec<ParticipantId> {
    let mut seen = BTreeSet::new();
    let mut reconciled = Vec::with_capacity(connected.len());

    let keeper_first = connected.contains(&keeper).then_some(keeper);
    let previous = order.iter().copied().filter(|id| connected.contains(id));
    let newcomers = connected.iter().copied();

    for id in keeper_first.into_iter().chain(previous).chain(newcomers) {
        if seen.insert(id) {
            reconciled.push(id);
        }
    }

    reconciled
}

/// Bring a room in line with who is actually connected.
///
/// Runs before every handler. Besides rebuilding the order:
/// - a disconnected current speaker is replaced by the head of the new order,
///   abandoning any pass in flight;
/// - while speaking, the next speaker always follows the current one in the
///   (possibly reordered) order;
/// - while passing, the pass target is kept unless it disconnected.
///
/// When nobody is connected an active room keeps its pointers; they are
/// re-derived once someone reconnects.
pub fn reconcile(mut room: Room, connected: &ConnectedSet) -> Room {
    room.talking_order = reconciled_order(&room.talking_order, room.keeper, connected);

    if room.status != RoomStatus::Active {
        return room;
    }

    let current_connected = room
        .current_speaker
        .is_some_and(|id| connected.contains(&id));

    if !current_connected {
        let Some(head) = room.talking_order.first().copied() else {
            return room;
        };
        room.current_speaker = Some(head);
        if room.turn_state == TurnState::Passing {
            room.turn_state = TurnState::Speaking;
        }
    }

    let next_connected = room.next_speaker.is_some_and(|id| connected.contains(&id));
    let speaking = room.turn_state == TurnState::Speaking;

    if speaking || !next_connected {
        if let Some(current) = room.current_speaker {
            room.next_speaker =
                next_in_order(&room.talking_order, current, connected).or(Some(current));
        }
    }

    room
}
