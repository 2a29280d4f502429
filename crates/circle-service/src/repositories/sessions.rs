//! Sessions repository.
//!
//! Read-only view onto the externally managed `sessions` and
//! `session_attendees` tables, plus the two markers this service owns:
//! `session_attendees.joined_at` and `sessions.ended_at`.

use crate::errors::CircleError;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::types::{ParticipantId, SessionId};
use sqlx::{PgExecutor, PgPool};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// A scheduled session.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub keeper: ParticipantId,
    pub title: String,
    pub scheduled_start_time: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Why the session cannot be joined, if it cannot.
    pub fn unjoinable_reason(&self) -> Option<&'static str> {
        if self.cancelled_at.is_some() {
            Some("session was cancelled")
        } else if self.ended_at.is_some() {
            Some("session has ended")
        } else {
            None
        }
    }
}

/// Repository for session and attendee records.
pub struct SessionsRepository;

impl SessionsRepository {
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn get(pool: &PgPool, session_id: SessionId) -> Result<Option<Session>, CircleError> {
        let start = Instant::now();

        let row: Result<Option<SessionRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT session_id, keeper_id, title, scheduled_start_time, cancelled_at, ended_at
            FROM sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id.0)
        .fetch_optional(pool)
        .await;

        record("get_session", &row, start);
        Ok(row?.map(Session::from))
    }

    /// Whether the participant is the session's keeper or a registered attendee.
    ///
    /// Generic over the executor so the orchestrator can check inside its transaction.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn is_member<'e>(
        executor: impl PgExecutor<'e>,
        session_id: SessionId,
        participant: ParticipantId,
    ) -> Result<bool, CircleError> {
        let start = Instant::now();

        let result: Result<bool, sqlx::Error> = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sessions
                WHERE session_id = $1 AND keeper_id = $2
            ) OR EXISTS (
                SELECT 1 FROM session_attendees
                WHERE session_id = $1 AND participant_id = $2
            )
            "#,
        )
        .bind(session_id.0)
        .bind(participant.0)
        .fetch_one(executor)
        .await;

        record("is_session_member", &result, start);
        Ok(result?)
    }

    /// Record the first time a member fetched a join credential.
    ///
    /// Later calls leave the original timestamp in place.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn mark_joined(
        pool: &PgPool,
        session_id: SessionId,
        participant: ParticipantId,
    ) -> Result<(), CircleError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            INSERT INTO session_attendees (session_id, participant_id, joined_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (session_id, participant_id)
            DO UPDATE SET joined_at = COALESCE(session_attendees.joined_at, EXCLUDED.joined_at)
            "#,
        )
        .bind(session_id.0)
        .bind(participant.0)
        .execute(pool)
        .await;

        record("mark_joined", &result, start);
        result?;

        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn has_joined(
        pool: &PgPool,
        session_id: SessionId,
        participant: ParticipantId,
    ) -> Result<bool, CircleError> {
        let start = Instant::now();

        let result: Result<bool, sqlx::Error> = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM session_attendees
                WHERE session_id = $1 AND participant_id = $2 AND joined_at IS NOT NULL
            )
            "#,
        )
        .bind(session_id.0)
        .bind(participant.0)
        .fetch_one(pool)
        .await;

        record("has_joined", &result, start);
        Ok(result?)
    }

    /// Sessions whose scheduled start lies between `window` and `grace` ago,
    /// and which are neither cancelled nor ended.
    #[instrument(skip_all, fields(grace_minutes = grace_minutes, window_minutes = window_minutes))]
    pub async fn find_keeper_absence_candidates(
        pool: &PgPool,
        grace_minutes: i64,
        window_minutes: i64,
    ) -> Result<Vec<Session>, CircleError> {
        let start = Instant::now();

        let rows: Result<Vec<SessionRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT session_id, keeper_id, title, scheduled_start_time, cancelled_at, ended_at
            FROM sessions
            WHERE scheduled_start_time <= NOW() - make_interval(mins => $1::int)
              AND scheduled_start_time >= NOW() - make_interval(mins => $2::int)
              AND cancelled_at IS NULL
              AND ended_at IS NULL
            ORDER BY scheduled_start_time ASC
            "#,
        )
        .bind(grace_minutes)
        .bind(window_minutes)
        .fetch_all(pool)
        .await;

        record("find_keeper_absence_candidates", &rows, start);
        Ok(rows?.into_iter().map(Session::from).collect())
    }

    /// Set the durable ended marker. Returns `false` if the session was already ended.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn mark_ended(pool: &PgPool, session_id: SessionId) -> Result<bool, CircleError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET ended_at = NOW()
            WHERE session_id = $1 AND ended_at IS NULL
            "#,
        )
        .bind(session_id.0)
        .execute(pool)
        .await;

        record("mark_session_ended", &result, start);
        Ok(result?.rows_affected() > 0)
    }
}

fn record<T>(operation: &str, result: &Result<T, sqlx::Error>, start: Instant) {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_db_query(operation, status, start.elapsed());
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    keeper_id: Uuid,
    title: String,
    scheduled_start_time: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            session_id: SessionId(row.session_id),
            keeper: ParticipantId(row.keeper_id),
            title: row.title,
            scheduled_start_time: row.scheduled_start_time,
            cancelled_at: row.cancelled_at,
            ended_at: row.ended_at,
        }
    }
}
