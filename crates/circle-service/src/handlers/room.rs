//! Room handlers.
//!
//! - `GET /api/v1/sessions/{id}/room` - Read room state
//! - `POST /api/v1/sessions/{id}/room/events` - Apply one event
//! - `GET /api/v1/sessions/{id}/room/history` - Accepted transitions in version order
//! - `POST /api/v1/sessions/{id}/join` - Join credential plus current state
//! - `POST /api/v1/sessions/{id}/room/mute` - Keeper mutes one participant
//! - `POST /api/v1/sessions/{id}/room/mute-all` - Keeper mutes everyone else
//! - `POST /api/v1/sessions/{id}/room/remove` - Keeper removes a participant
//!
//! All routes sit behind `require_participant`; the caller is taken from the
//! token, never from the body.

use crate::errors::CircleError;
use crate::middleware::AuthenticatedParticipant;
use crate::models::{
    ApplyEventRequest, JoinResponse, ModerationRequest, MuteAllResponse, RoomHistoryResponse,
};
use crate::repositories::{RoomEventLogRepository, SessionsRepository};
use crate::room::{Room, RoomState, RoomStatus};
use crate::routes::AppState;
use crate::services::{apply_event, load_room_for_member, spawn_publish};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::SessionId;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Deserialize a JSON body, answering 400 rather than axum's default 422.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, CircleError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "circle.handlers.room", error = %e, "Invalid request body");
        CircleError::BadRequest("Invalid request body".to_string())
    })
}

/// Handler for GET /api/v1/sessions/{id}/room
///
/// The room is created in the waiting room on first read.
#[instrument(skip_all, name = "circle.room.get", fields(session_id = %session_id))]
pub async fn get_room_state(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedParticipant>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<RoomState>, CircleError> {
    let (_, room) =
        load_room_for_member(&state.pool, SessionId(session_id), caller.participant_id).await?;

    Ok(Json(room.snapshot()))
}

/// Handler for POST /api/v1/sessions/{id}/room/events
///
/// # Response
///
/// - 200 OK: the committed `RoomState`
/// - 400/403/404/409: typed rejection, nothing persisted
/// - 500: transport could not list connected participants
/// - 503: room row lock not acquired in time
#[instrument(skip_all, name = "circle.room.apply_event", fields(session_id = %session_id))]
pub async fn apply_room_event(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedParticipant>,
    Path(session_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<RoomState>, CircleError> {
    let request: ApplyEventRequest = parse_body(&body)?;
    let session_id = SessionId(session_id);

    // Room creation is lazy; make sure a first write finds a row to lock
    load_room_for_member(&state.pool, session_id, caller.participant_id).await?;

    let connected = state
        .transport
        .get_connected_participants(session_id)
        .await?;

    let room_state = apply_event(
        &state.pool,
        Duration::from_millis(state.config.room_lock_timeout_ms),
        session_id,
        caller.participant_id,
        &request.event,
        request.last_seen_version,
        &connected,
    )
    .await?;

    spawn_publish(state.transport.clone(), room_state.clone());

    Ok(Json(room_state))
}

/// Handler for GET /api/v1/sessions/{id}/room/history
#[instrument(skip_all, name = "circle.room.history", fields(session_id = %session_id))]
pub async fn get_room_history(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedParticipant>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<RoomHistoryResponse>, CircleError> {
    let session_id = SessionId(session_id);
    load_room_for_member(&state.pool, session_id, caller.participant_id).await?;

    let entries = RoomEventLogRepository::list(&state.pool, session_id).await?;

    Ok(Json(RoomHistoryResponse {
        session_id,
        entries,
    }))
}

/// Handler for POST /api/v1/sessions/{id}/join
///
/// Records that the caller joined and issues their media credential.
///
/// # Response
///
/// - 200 OK: credential and current room state
/// - 403 Forbidden: not a member (`NOT_IN_ROOM`) or cancelled/ended (`NOT_JOINABLE`)
/// - 404 Not Found: unknown session
#[instrument(skip_all, name = "circle.room.join", fields(session_id = %session_id))]
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedParticipant>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<JoinResponse>, CircleError> {
    let session_id = SessionId(session_id);
    let (session, room) =
        load_room_for_member(&state.pool, session_id, caller.participant_id).await?;

    if let Some(reason) = session.unjoinable_reason() {
        return Err(CircleError::NotJoinable(reason.to_string()));
    }

    SessionsRepository::mark_joined(&state.pool, session_id, caller.participant_id).await?;

    let credential = state.transport.create_join_token(
        session_id,
        caller.participant_id,
        caller.name.as_deref(),
    )?;

    info!(
        target: "circle.handlers.room",
        session_id = %session_id,
        participant_id = %caller.participant_id,
        "Participant joined session"
    );

    Ok(Json(JoinResponse {
        session_id,
        title: session.title,
        credential,
        state: room.snapshot(),
    }))
}

/// Load the room and check the caller may moderate it.
async fn load_room_for_keeper(
    state: &AppState,
    session_id: SessionId,
    caller: &AuthenticatedParticipant,
) -> Result<Room, CircleError> {
    let (_, room) = load_room_for_member(&state.pool, session_id, caller.participant_id).await?;

    if !room.is_keeper(caller.participant_id) {
        return Err(CircleError::NotKeeper);
    }
    if room.status == RoomStatus::Ended {
        return Err(CircleError::RoomAlreadyEnded);
    }

    Ok(room)
}

/// Handler for POST /api/v1/sessions/{id}/room/mute
#[instrument(skip_all, name = "circle.room.mute", fields(session_id = %session_id))]
pub async fn mute_participant(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedParticipant>,
    Path(session_id): Path<Uuid>,
    body: Bytes,
) -> Result<StatusCode, CircleError> {
    let request: ModerationRequest = parse_body(&body)?;
    let session_id = SessionId(session_id);
    load_room_for_keeper(&state, session_id, &caller).await?;

    state
        .transport
        .mute_participant(session_id, request.participant_id)
        .await?;

    info!(
        target: "circle.handlers.room",
        session_id = %session_id,
        participant_id = %request.participant_id,
        "Keeper muted participant"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/v1/sessions/{id}/room/mute-all
///
/// Mutes everyone connected except the keeper.
#[instrument(skip_all, name = "circle.room.mute_all", fields(session_id = %session_id))]
pub async fn mute_all_participants(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedParticipant>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<MuteAllResponse>, CircleError> {
    let session_id = SessionId(session_id);
    load_room_for_keeper(&state, session_id, &caller).await?;

    let muted = state
        .transport
        .mute_all(session_id, caller.participant_id)
        .await?;

    info!(
        target: "circle.handlers.room",
        session_id = %session_id,
        muted,
        "Keeper muted all participants"
    );

    Ok(Json(MuteAllResponse { muted }))
}

/// Handler for POST /api/v1/sessions/{id}/room/remove
///
/// Only disconnects the participant from the media room; the next transition
/// reconciles them out of the talking order.
#[instrument(skip_all, name = "circle.room.remove", fields(session_id = %session_id))]
pub async fn remove_participant(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedParticipant>,
    Path(session_id): Path<Uuid>,
    body: Bytes,
) -> Result<StatusCode, CircleError> {
    let request: ModerationRequest = parse_body(&body)?;
    let session_id = SessionId(session_id);
    load_room_for_keeper(&state, session_id, &caller).await?;

    if request.participant_id == caller.participant_id {
        return Err(CircleError::BadRequest(
            "keeper cannot remove themselves".to_string(),
        ));
    }

    state
        .transport
        .remove_participant(session_id, request.participant_id)
        .await?;

    info!(
        target: "circle.handlers.room",
        session_id = %session_id,
        participant_id = %request.participant_id,
        "Keeper removed participant"
    );

    Ok(StatusCode::NO_CONTENT)
}
