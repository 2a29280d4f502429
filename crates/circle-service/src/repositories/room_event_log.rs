//! Room event log repository.
//!
//! Append-only: one row per accepted transition, keyed by `(session_id, version)`,
//! each holding the full snapshot after that transition. The table rejects
//! UPDATE and DELETE at the database level.

use crate::errors::CircleError;
use crate::observability::metrics;
use crate::room::RoomState;
use chrono::{DateTime, Utc};
use common::types::{ParticipantId, SessionId};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// One accepted transition as recorded in the log.
#[derive(Debug, Clone, Serialize)]
pub struct RoomEventLogEntry {
    pub version: i64,
    pub event_type: String,
    pub actor: ParticipantId,
    pub snapshot: RoomState,
    pub created_at: DateTime<Utc>,
}

/// Repository for the `room_event_log` table.
pub struct RoomEventLogRepository;

impl RoomEventLogRepository {
    /// Append the snapshot produced by an accepted transition.
    ///
    /// Must run in the same transaction as the room update.
    #[instrument(skip_all, fields(session_id = %snapshot.session_id, version = snapshot.version))]
    pub async fn append(
        conn: &mut PgConnection,
        event_type: &str,
        actor: ParticipantId,
        snapshot: &RoomState,
    ) -> Result<(), CircleError> {
        let start = Instant::now();

        let snapshot_json = serde_json::to_value(snapshot).map_err(|e| {
            tracing::error!(
                target: "circle.repository.room_event_log",
                error = %e,
                "Failed to serialize room snapshot"
            );
            CircleError::Internal
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO room_event_log (session_id, version, event_type, actor_id, snapshot)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(snapshot.session_id.0)
        .bind(snapshot.version)
        .bind(event_type)
        .bind(actor.0)
        .bind(snapshot_json)
        .execute(&mut *conn)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("append_room_event", status, start.elapsed());
        result?;

        Ok(())
    }

    /// All entries for a session in version order.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn list(
        pool: &PgPool,
        session_id: SessionId,
    ) -> Result<Vec<RoomEventLogEntry>, CircleError> {
        let start = Instant::now();

        let rows: Result<Vec<EventLogRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT version, event_type, actor_id, snapshot, created_at
            FROM room_event_log
            WHERE session_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(session_id.0)
        .fetch_all(pool)
        .await;

        let status = if rows.is_ok() { "success" } else { "error" };
        metrics::record_db_query("list_room_events", status, start.elapsed());

        rows?
            .into_iter()
            .map(RoomEventLogEntry::try_from)
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct EventLogRow {
    version: i64,
    event_type: String,
    actor_id: Uuid,
    snapshot: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventLogRow> for RoomEventLogEntry {
    type Error = CircleError;

    fn try_from(row: EventLogRow) -> Result<Self, Self::Error> {
        let snapshot = serde_json::from_value(row.snapshot).map_err(|e| {
            CircleError::Database(format!(
                "room_event_log version {} has an unreadable snapshot: {}",
                row.version, e
            ))
        })?;

        Ok(RoomEventLogEntry {
            version: row.version,
            event_type: row.event_type,
            actor: ParticipantId(row.actor_id),
            snapshot,
            created_at: row.created_at,
        })
    }
}
