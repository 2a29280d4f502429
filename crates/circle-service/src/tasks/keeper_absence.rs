//! Keeper absence background task.
//!
//! Periodically ends sessions whose keeper never showed up:
//! 1. Find sessions that started between the grace period and the window ago,
//!    not cancelled, not ended
//! 2. Skip any whose keeper has joined or is connected right now
//! 3. Drive its room (if any) through `EndRoom` with reason "keeper absent"
//!    via the normal locked write path, publishing the snapshot best effort
//! 4. Only then mark the session ended
//!
//! A session whose room could not be ended stays a candidate for the next
//! run. A second run over ended sessions finds nothing to do.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is triggered, after finishing
//! the current iteration.

use crate::config::Config;
use crate::errors::CircleError;
use crate::observability::metrics;
use crate::repositories::{RoomsRepository, Session, SessionsRepository};
use crate::room::{ConnectedSet, RoomEvent, RoomStatus, KEEPER_ABSENT_REASON};
use crate::services::{apply_event, spawn_publish, RoomTransport};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default check interval in seconds.
const DEFAULT_CHECK_INTERVAL_SECONDS: u64 = 60;

/// Default minutes after the scheduled start before a keeper counts as absent.
const DEFAULT_GRACE_MINUTES: i64 = 5;

/// Default minutes after the scheduled start after which a session is no longer scanned.
const DEFAULT_WINDOW_MINUTES: i64 = 60;

/// Attempts at ending a room when concurrent writers keep bumping its version.
const MAX_END_ATTEMPTS: usize = 3;

/// Configuration for the keeper absence task.
#[derive(Debug, Clone)]
pub struct KeeperAbsenceConfig {
    pub check_interval_seconds: u64,
    pub grace_minutes: i64,
    pub window_minutes: i64,
    /// Row lock wait used when ending rooms.
    pub lock_timeout: Duration,
}

impl Default for KeeperAbsenceConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: DEFAULT_CHECK_INTERVAL_SECONDS,
            grace_minutes: DEFAULT_GRACE_MINUTES,
            window_minutes: DEFAULT_WINDOW_MINUTES,
            lock_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for KeeperAbsenceConfig {
    fn from(config: &Config) -> Self {
        Self {
            check_interval_seconds: config.keeper_absence_interval_seconds,
            grace_minutes: config.keeper_absence_grace_minutes,
            window_minutes: config.keeper_absence_window_minutes,
            lock_timeout: Duration::from_millis(config.room_lock_timeout_ms),
        }
    }
}

/// Start the keeper absence background task.
///
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "circle.task.keeper_absence")]
pub async fn start_keeper_absence_task(
    pool: PgPool,
    transport: Arc<dyn RoomTransport>,
    config: KeeperAbsenceConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "circle.task.keeper_absence",
        check_interval_seconds = config.check_interval_seconds,
        grace_minutes = config.grace_minutes,
        window_minutes = config.window_minutes,
        "Starting keeper absence task"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.check_interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_keeper_absence_check(&pool, &transport, &config).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "circle.task.keeper_absence",
                    "Keeper absence task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(
        target: "circle.task.keeper_absence",
        "Keeper absence task stopped"
    );
}

/// Run a single scan. Returns how many sessions were ended.
///
/// Errors for one session are logged and do not stop the others.
pub async fn run_keeper_absence_check(
    pool: &PgPool,
    transport: &Arc<dyn RoomTransport>,
    config: &KeeperAbsenceConfig,
) -> u64 {
    let candidates = match SessionsRepository::find_keeper_absence_candidates(
        pool,
        config.grace_minutes,
        config.window_minutes,
    )
    .await
    {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::error!(
                target: "circle.task.keeper_absence",
                error = %e,
                "Failed to load keeper absence candidates"
            );
            return 0;
        }
    };

    let mut ended = 0;
    for session in &candidates {
        match check_session(pool, transport, config, session).await {
            Ok(true) => ended += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(
                    target: "circle.task.keeper_absence",
                    session_id = %session.session_id,
                    error = %e,
                    "Keeper absence check failed for session"
                );
            }
        }
    }

    if ended > 0 {
        metrics::record_keeper_absence_ended(ended);
        info!(
            target: "circle.task.keeper_absence",
            ended_count = ended,
            "Ended sessions with absent keepers"
        );
    }

    ended
}

/// End one session if its keeper is absent. Returns whether it was ended.
async fn check_session(
    pool: &PgPool,
    transport: &Arc<dyn RoomTransport>,
    config: &KeeperAbsenceConfig,
    session: &Session,
) -> Result<bool, CircleError> {
    if SessionsRepository::has_joined(pool, session.session_id, session.keeper).await? {
        return Ok(false);
    }

    // Without a connected set we cannot tell, so leave the session alone this round
    let connected = transport
        .get_connected_participants(session.session_id)
        .await?;
    if connected.contains(&session.keeper) {
        return Ok(false);
    }

    end_room(pool, transport, config, session, &connected).await?;

    if !SessionsRepository::mark_ended(pool, session.session_id).await? {
        debug!(
            target: "circle.task.keeper_absence",
            session_id = %session.session_id,
            "Session already ended by another writer"
        );
        return Ok(false);
    }

    info!(
        target: "circle.task.keeper_absence",
        session_id = %session.session_id,
        keeper = %session.keeper,
        "Keeper absent, session ended"
    );

    Ok(true)
}

/// Drive the session's room, if it has one, to ended with "keeper absent".
///
/// The session stays a candidate until this succeeds.
async fn end_room(
    pool: &PgPool,
    transport: &Arc<dyn RoomTransport>,
    config: &KeeperAbsenceConfig,
    session: &Session,
    connected: &ConnectedSet,
) -> Result<(), CircleError> {
    let event = RoomEvent::EndRoom {
        reason: KEEPER_ABSENT_REASON.to_string(),
    };

    for attempt in 1..=MAX_END_ATTEMPTS {
        let Some(room) = RoomsRepository::get(pool, session.session_id).await? else {
            return Ok(());
        };
        if room.status == RoomStatus::Ended {
            return Ok(());
        }

        match apply_event(
            pool,
            config.lock_timeout,
            session.session_id,
            session.keeper,
            &event,
            room.state_version,
            connected,
        )
        .await
        {
            Ok(state) => {
                spawn_publish(transport.clone(), state);
                return Ok(());
            }
            Err(CircleError::StaleVersion { .. }) if attempt < MAX_END_ATTEMPTS => {
                debug!(
                    target: "circle.task.keeper_absence",
                    session_id = %session.session_id,
                    attempt,
                    "Room changed while ending, retrying"
                );
            }
            Err(CircleError::RoomAlreadyEnded) => return Ok(()),
            Err(e) => return Err(e),
        }
    }

    Ok(())
}
