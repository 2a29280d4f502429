//! Database fixtures for sessions and attendees.
//!
//! The `sessions` tables are owned by the scheduling system in production;
//! tests insert rows directly.

use chrono::{DateTime, Duration, Utc};
use common::types::{ParticipantId, SessionId};
use sqlx::{PgPool, Postgres, Transaction};

/// Builder for a `sessions` row.
///
/// # Example
/// ```rust,ignore
/// let session = SessionFixture::new(TEST_KEEPER)
///     .started_minutes_ago(10)
///     .insert(&pool)
///     .await?;
/// ```
pub struct SessionFixture {
    session_id: SessionId,
    keeper: ParticipantId,
    title: String,
    scheduled_start_time: DateTime<Utc>,
    cancelled: bool,
    ended: bool,
}

impl SessionFixture {
    /// A session starting now with a fresh random ID.
    pub fn new(keeper: ParticipantId) -> Self {
        Self {
            session_id: SessionId::new(),
            keeper,
            title: "Test circle".to_string(),
            scheduled_start_time: Utc::now(),
            cancelled: false,
            ended: false,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Scheduled start `minutes` in the past
    pub fn started_minutes_ago(mut self, minutes: i64) -> Self {
        self.scheduled_start_time = Utc::now() - Duration::minutes(minutes);
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    pub fn ended(mut self) -> Self {
        self.ended = true;
        self
    }

    /// Insert the row and return its ID.
    pub async fn insert(self, pool: &PgPool) -> Result<SessionId, anyhow::Error> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, keeper_id, title, scheduled_start_time, cancelled_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(self.session_id.0)
        .bind(self.keeper.0)
        .bind(&self.title)
        .bind(self.scheduled_start_time)
        .bind(self.cancelled.then_some(now))
        .bind(self.ended.then_some(now))
        .execute(pool)
        .await?;

        Ok(self.session_id)
    }
}

/// Register `participant` as an attendee who has not joined yet.
pub async fn add_attendee(
    pool: &PgPool,
    session_id: SessionId,
    participant: ParticipantId,
) -> Result<(), anyhow::Error> {
    sqlx::query(
        r#"
        INSERT INTO session_attendees (session_id, participant_id)
        VALUES ($1, $2)
        "#,
    )
    .bind(session_id.0)
    .bind(participant.0)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a session with `keeper` and the given attendees.
pub async fn create_session_with_attendees(
    pool: &PgPool,
    keeper: ParticipantId,
    attendees: &[ParticipantId],
) -> Result<SessionId, anyhow::Error> {
    let session_id = SessionFixture::new(keeper).insert(pool).await?;
    for attendee in attendees {
        add_attendee(pool, session_id, *attendee).await?;
    }
    Ok(session_id)
}

/// Number of audit log rows for a session.
pub async fn count_log_rows(pool: &PgPool, session_id: SessionId) -> Result<i64, anyhow::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM room_event_log WHERE session_id = $1")
            .bind(session_id.0)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Hold the room row lock in a separate transaction until the returned
/// transaction is committed, rolled back, or dropped.
pub async fn lock_room_row(
    pool: &PgPool,
    session_id: SessionId,
) -> Result<Transaction<'static, Postgres>, anyhow::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT session_id FROM rooms WHERE session_id = $1 FOR UPDATE")
        .bind(session_id.0)
        .fetch_one(&mut *tx)
        .await?;
    Ok(tx)
}
