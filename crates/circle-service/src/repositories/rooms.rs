//! Rooms repository.
//!
//! One row per session holding the mutable room aggregate. Writes happen only
//! inside the orchestrator's transaction, after `lock_for_update`.
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)

use crate::errors::CircleError;
use crate::observability::metrics;
use crate::room::{Room, RoomStatus, TurnState};
use common::types::{ParticipantId, SessionId};
use sqlx::{PgConnection, PgPool};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Repository for the `rooms` table.
pub struct RoomsRepository;

impl RoomsRepository {
    /// Create the room for a session in the waiting room, if it does not exist yet.
    ///
    /// Concurrent first reads race harmlessly on `ON CONFLICT DO NOTHING`.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn create_if_absent(
        pool: &PgPool,
        session_id: SessionId,
        keeper: ParticipantId,
    ) -> Result<(), CircleError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            INSERT INTO rooms (session_id, keeper_id)
            VALUES ($1, $2)
            ON CONFLICT (session_id) DO NOTHING
            "#,
        )
        .bind(session_id.0)
        .bind(keeper.0)
        .execute(pool)
        .await;

        record("create_room", &result, start);
        let result = result?;

        if result.rows_affected() > 0 {
            tracing::info!(
                target: "circle.repository.rooms",
                session_id = %session_id,
                "Room created in waiting room"
            );
        }

        Ok(())
    }

    /// Read the current room without locking.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn get(pool: &PgPool, session_id: SessionId) -> Result<Option<Room>, CircleError> {
        let start = Instant::now();

        let row: Result<Option<RoomRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT session_id, status, turn_state, keeper_id, current_speaker,
                   next_speaker, talking_order, state_version, ended_reason
            FROM rooms
            WHERE session_id = $1
            "#,
        )
        .bind(session_id.0)
        .fetch_optional(pool)
        .await;

        record("get_room", &row, start);
        row?.map(Room::try_from).transpose()
    }

    /// Read the room and hold an exclusive row lock until the transaction ends.
    ///
    /// Waits at most the transaction's `lock_timeout`; a timeout surfaces as
    /// `CircleError::RoomBusy` through the `sqlx::Error` conversion.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn lock_for_update(
        conn: &mut PgConnection,
        session_id: SessionId,
    ) -> Result<Option<Room>, CircleError> {
        let start = Instant::now();

        let row: Result<Option<RoomRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT session_id, status, turn_state, keeper_id, current_speaker,
                   next_speaker, talking_order, state_version, ended_reason
            FROM rooms
            WHERE session_id = $1
            FOR UPDATE
            "#,
        )
        .bind(session_id.0)
        .fetch_optional(&mut *conn)
        .await;

        record("lock_room", &row, start);
        row?.map(Room::try_from).transpose()
    }

    /// Persist every mutable column of the aggregate.
    #[instrument(skip_all, fields(session_id = %room.session_id, version = room.state_version))]
    pub async fn update(conn: &mut PgConnection, room: &Room) -> Result<(), CircleError> {
        let start = Instant::now();
        let talking_order: Vec<Uuid> = room.talking_order.iter().map(|id| id.0).collect();

        let result = sqlx::query(
            r#"
            UPDATE rooms
            SET status = $2,
                turn_state = $3,
                current_speaker = $4,
                next_speaker = $5,
                talking_order = $6,
                state_version = $7,
                ended_reason = $8,
                updated_at = NOW()
            WHERE session_id = $1
            "#,
        )
        .bind(room.session_id.0) // $1
        .bind(room.status.as_str()) // $2
        .bind(room.turn_state.as_str()) // $3
        .bind(room.current_speaker.map(|id| id.0)) // $4
        .bind(room.next_speaker.map(|id| id.0)) // $5
        .bind(&talking_order) // $6
        .bind(room.state_version) // $7
        .bind(room.ended_reason.as_deref()) // $8
        .execute(&mut *conn)
        .await;

        record("update_room", &result, start);

        if result?.rows_affected() == 0 {
            return Err(CircleError::NotFound(format!(
                "room for session {}",
                room.session_id
            )));
        }

        Ok(())
    }
}

fn record<T>(operation: &str, result: &Result<T, sqlx::Error>, start: Instant) {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_db_query(operation, status, start.elapsed());
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    session_id: Uuid,
    status: String,
    turn_state: String,
    keeper_id: Uuid,
    current_speaker: Option<Uuid>,
    next_speaker: Option<Uuid>,
    talking_order: Vec<Uuid>,
    state_version: i64,
    ended_reason: Option<String>,
}

impl TryFrom<RoomRow> for Room {
    type Error = CircleError;

    fn try_from(row: RoomRow) -> Result<Self, Self::Error> {
        Ok(Room {
            session_id: SessionId(row.session_id),
            status: RoomStatus::from_db(&row.status)?,
            turn_state: TurnState::from_db(&row.turn_state)?,
            keeper: ParticipantId(row.keeper_id),
            current_speaker: row.current_speaker.map(ParticipantId),
            next_speaker: row.next_speaker.map(ParticipantId),
            talking_order: row.talking_order.into_iter().map(ParticipantId).collect(),
            state_version: row.state_version,
            ended_reason: row.ended_reason,
        })
    }
}
