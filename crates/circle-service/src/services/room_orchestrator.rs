//! The sole write path to a room.
//!
//! `apply_event` runs one transition inside a single transaction:
//!
//! 1. Lock the room row (`SELECT ... FOR UPDATE`, bounded by `lock_timeout`)
//! 2. Check the actor belongs to the session
//! 3. Compare the client's `last_seen_version` with the stored version
//! 4. Reconcile against the connected set
//! 5. Dispatch to the transition handler
//! 6. Bump the version, persist the room, append the log row, commit
//!
//! Any error drops the transaction, which rolls back: no mutation, no log row,
//! version unchanged. The connected set is supplied by the caller; this module
//! never talks to the media transport.

use crate::errors::CircleError;
use crate::observability::metrics;
use crate::repositories::{RoomEventLogRepository, RoomsRepository, Session, SessionsRepository};
use crate::room::{reconcile, transitions, ConnectedSet, Room, RoomEvent, RoomState};
use common::types::{ParticipantId, SessionId};
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Apply one event to a session's room and return the committed snapshot.
///
/// # Errors
///
/// - `NotFound` if the session has no room
/// - `NotInRoom` if `actor` is neither keeper nor attendee
/// - `StaleVersion` if `last_seen_version` is not the stored version
/// - `RoomBusy` if the row lock could not be taken within `lock_timeout`
/// - any rejection raised by the transition handler
#[instrument(
    skip_all,
    fields(session_id = %session_id, event = event.tag(), last_seen_version)
)]
pub async fn apply_event(
    pool: &PgPool,
    lock_timeout: Duration,
    session_id: SessionId,
    actor: ParticipantId,
    event: &RoomEvent,
    last_seen_version: i64,
    connected: &ConnectedSet,
) -> Result<RoomState, CircleError> {
    let start = Instant::now();

    let result = apply_in_transaction(
        pool,
        lock_timeout,
        session_id,
        actor,
        event,
        last_seen_version,
        connected,
    )
    .await;

    let outcome = match &result {
        Ok(_) => "accepted",
        Err(e) => e.code(),
    };
    metrics::record_room_transition(event.tag(), outcome, start.elapsed());

    match &result {
        Ok(state) => {
            info!(
                target: "circle.services.room_orchestrator",
                session_id = %session_id,
                event = event.tag(),
                version = state.version,
                status = state.status.as_str(),
                turn_state = state.turn_state.as_str(),
                "Room transition accepted"
            );
        }
        Err(e) if e.status_code() >= 500 => {
            warn!(
                target: "circle.services.room_orchestrator",
                session_id = %session_id,
                event = event.tag(),
                error = %e,
                "Room transition failed"
            );
        }
        Err(e) => {
            debug!(
                target: "circle.services.room_orchestrator",
                session_id = %session_id,
                event = event.tag(),
                code = e.code(),
                "Room transition rejected"
            );
        }
    }

    result
}

async fn apply_in_transaction(
    pool: &PgPool,
    lock_timeout: Duration,
    session_id: SessionId,
    actor: ParticipantId,
    event: &RoomEvent,
    last_seen_version: i64,
    connected: &ConnectedSet,
) -> Result<RoomState, CircleError> {
    let mut tx = pool.begin().await?;

    // SET does not take bind parameters; set_config(..., true) is the SET LOCAL equivalent
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", lock_timeout.as_millis()))
        .execute(&mut *tx)
        .await?;

    let room = RoomsRepository::lock_for_update(&mut tx, session_id)
        .await?
        .ok_or_else(|| CircleError::NotFound(format!("no room for session {session_id}")))?;

    if !room.is_keeper(actor) && !SessionsRepository::is_member(&mut *tx, session_id, actor).await?
    {
        return Err(CircleError::NotInRoom(
            "participant is not an attendee of this session".to_string(),
        ));
    }

    if last_seen_version != room.state_version {
        return Err(CircleError::StaleVersion {
            last_seen: last_seen_version,
            current: room.state_version,
        });
    }

    let reconciled = reconcile(room, connected);
    let mut next = transitions::apply(reconciled, actor, event, connected)?;
    next.state_version += 1;

    RoomsRepository::update(&mut tx, &next).await?;

    let snapshot = next.snapshot();
    RoomEventLogRepository::append(&mut tx, event.tag(), actor, &snapshot).await?;

    tx.commit().await?;

    Ok(snapshot)
}

/// Load a session's room on behalf of a member, creating it on first access.
///
/// # Errors
///
/// - `NotFound` if the session does not exist
/// - `NotInRoom` if `participant` is neither keeper nor attendee
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn load_room_for_member(
    pool: &PgPool,
    session_id: SessionId,
    participant: ParticipantId,
) -> Result<(Session, Room), CircleError> {
    let session = SessionsRepository::get(pool, session_id)
        .await?
        .ok_or_else(|| CircleError::NotFound(format!("session {session_id}")))?;

    if session.keeper != participant
        && !SessionsRepository::is_member(pool, session_id, participant).await?
    {
        return Err(CircleError::NotInRoom(
            "participant is not an attendee of this session".to_string(),
        ));
    }

    RoomsRepository::create_if_absent(pool, session_id, session.keeper).await?;

    let room = RoomsRepository::get(pool, session_id)
        .await?
        .ok_or_else(|| CircleError::NotFound(format!("no room for session {session_id}")))?;

    Ok((session, room))
}
