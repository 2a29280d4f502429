//! Room orchestrator integration tests.
//!
//! Drives `apply_event` directly against PostgreSQL: versioning, rejection
//! without side effects, the audit log, and concurrent writers.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use circle_service::errors::CircleError;
use circle_service::repositories::{RoomEventLogRepository, RoomsRepository};
use circle_service::room::{ConnectedSet, RoomEvent, RoomStatus, TurnState};
use circle_service::services::{apply_event, load_room_for_member};
use circle_test_utils::*;
use common::types::{ParticipantId, SessionId};
use sqlx::PgPool;
use std::time::Duration;

const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

fn connected(ids: &[ParticipantId]) -> ConnectedSet {
    ids.iter().copied().collect()
}

/// Session with keeper + Alice + Bob, room created in the waiting room.
async fn setup(pool: &PgPool) -> Result<SessionId, anyhow::Error> {
    let session = create_session_with_attendees(pool, TEST_KEEPER, &[TEST_ALICE, TEST_BOB]).await?;
    load_room_for_member(pool, session, TEST_KEEPER).await?;
    Ok(session)
}

async fn apply(
    pool: &PgPool,
    session: SessionId,
    actor: ParticipantId,
    event: RoomEvent,
    last_seen_version: i64,
    connected: &ConnectedSet,
) -> Result<circle_service::room::RoomState, CircleError> {
    apply_event(
        pool,
        LOCK_TIMEOUT,
        session,
        actor,
        &event,
        last_seen_version,
        connected,
    )
    .await
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_room_is_created_lazily_in_waiting_room(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = create_session_with_attendees(&pool, TEST_KEEPER, &[TEST_ALICE]).await?;
    assert!(RoomsRepository::get(&pool, session).await?.is_none());

    let (_, room) = load_room_for_member(&pool, session, TEST_ALICE).await?;

    assert_eq!(room.status, RoomStatus::WaitingRoom);
    assert_eq!(room.turn_state, TurnState::Idle);
    assert_eq!(room.keeper, TEST_KEEPER);
    assert_eq!(room.state_version, 0);
    assert!(room.current_speaker.is_none());

    // Second load does not reset anything
    let (_, again) = load_room_for_member(&pool, session, TEST_KEEPER).await?;
    assert_eq!(again.state_version, 0);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_happy_path_pass_and_accept(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_ALICE, TEST_BOB]);

    let started = apply(&pool, session, TEST_KEEPER, RoomEvent::StartRoom, 0, &everyone).await?;
    assert_eq!(started.version, 1);
    assert_eq!(started.status, RoomStatus::Active);
    assert_eq!(started.turn_state, TurnState::Speaking);
    assert_eq!(started.current_speaker, Some(TEST_KEEPER));
    assert_eq!(started.next_speaker, Some(TEST_ALICE));
    assert_eq!(started.talking_order, vec![TEST_KEEPER, TEST_ALICE, TEST_BOB]);

    let passing = apply(&pool, session, TEST_KEEPER, RoomEvent::PassStick, 1, &everyone).await?;
    assert_eq!(passing.version, 2);
    assert_eq!(passing.turn_state, TurnState::Passing);
    assert_eq!(passing.current_speaker, Some(TEST_KEEPER));

    let accepted = apply(&pool, session, TEST_ALICE, RoomEvent::AcceptStick, 2, &everyone).await?;
    assert_eq!(accepted.version, 3);
    assert_eq!(accepted.turn_state, TurnState::Speaking);
    assert_eq!(accepted.current_speaker, Some(TEST_ALICE));
    assert_eq!(accepted.next_speaker, Some(TEST_BOB));

    let stored = RoomsRepository::get(&pool, session).await?.unwrap();
    assert_eq!(stored.snapshot(), accepted);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_version_is_rejected_without_mutation(
    pool: PgPool,
) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_ALICE, TEST_BOB]);

    apply(&pool, session, TEST_KEEPER, RoomEvent::StartRoom, 0, &everyone).await?;

    let result = apply(&pool, session, TEST_KEEPER, RoomEvent::PassStick, 0, &everyone).await;

    match result {
        Err(CircleError::StaleVersion { last_seen, current }) => {
            assert_eq!(last_seen, 0);
            assert_eq!(current, 1);
        }
        other => panic!("expected StaleVersion, got {:?}", other),
    }

    let stored = RoomsRepository::get(&pool, session).await?.unwrap();
    assert_eq!(stored.state_version, 1);
    assert_eq!(stored.turn_state, TurnState::Speaking);
    assert_eq!(count_log_rows(&pool, session).await?, 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rejected_transition_writes_no_log_row(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_ALICE, TEST_BOB]);

    let result = apply(&pool, session, TEST_ALICE, RoomEvent::StartRoom, 0, &everyone).await;
    assert!(matches!(result, Err(CircleError::NotKeeper)));

    let result = apply(&pool, session, TEST_KEEPER, RoomEvent::PassStick, 0, &everyone).await;
    assert!(matches!(result, Err(CircleError::RoomNotActive)));

    let stored = RoomsRepository::get(&pool, session).await?.unwrap();
    assert_eq!(stored.state_version, 0);
    assert_eq!(stored.status, RoomStatus::WaitingRoom);
    assert_eq!(count_log_rows(&pool, session).await?, 0);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_event_log_matches_each_accepted_version(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_ALICE, TEST_BOB]);

    let v1 = apply(&pool, session, TEST_KEEPER, RoomEvent::StartRoom, 0, &everyone).await?;
    let v2 = apply(&pool, session, TEST_KEEPER, RoomEvent::PassStick, 1, &everyone).await?;
    let v3 = apply(
        &pool,
        session,
        TEST_KEEPER,
        RoomEvent::EndRoom {
            reason: "closing".to_string(),
        },
        2,
        &everyone,
    )
    .await?;

    let entries = RoomEventLogRepository::list(&pool, session).await?;
    let versions: Vec<i64> = entries.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);

    let event_types: Vec<&str> = entries.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(event_types, vec!["start_room", "pass_stick", "end_room"]);

    assert_eq!(entries[0].snapshot, v1);
    assert_eq!(entries[1].snapshot, v2);
    assert_eq!(entries[2].snapshot, v3);
    assert!(entries.iter().all(|e| e.actor == TEST_KEEPER));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_event_log_rejects_updates(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER]);
    apply(&pool, session, TEST_KEEPER, RoomEvent::StartRoom, 0, &everyone).await?;

    let update = sqlx::query("UPDATE room_event_log SET event_type = 'x' WHERE session_id = $1")
        .bind(session.0)
        .execute(&pool)
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM room_event_log WHERE session_id = $1")
        .bind(session.0)
        .execute(&pool)
        .await;
    assert!(delete.is_err());

    assert_eq!(count_log_rows(&pool, session).await?, 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_ended_room_rejects_every_event(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_ALICE, TEST_BOB]);

    apply(&pool, session, TEST_KEEPER, RoomEvent::StartRoom, 0, &everyone).await?;
    let ended = apply(
        &pool,
        session,
        TEST_KEEPER,
        RoomEvent::EndRoom {
            reason: String::new(),
        },
        1,
        &everyone,
    )
    .await?;
    assert_eq!(ended.status, RoomStatus::Ended);
    assert!(ended.current_speaker.is_none());
    assert!(ended.next_speaker.is_none());

    let events = [
        RoomEvent::StartRoom,
        RoomEvent::PassStick,
        RoomEvent::AcceptStick,
        RoomEvent::ForcePassStick,
        RoomEvent::EndRoom {
            reason: "again".to_string(),
        },
    ];
    for event in events {
        let result = apply(&pool, session, TEST_KEEPER, event, 2, &everyone).await;
        assert!(matches!(result, Err(CircleError::RoomAlreadyEnded)));
    }

    let stored = RoomsRepository::get(&pool, session).await?.unwrap();
    assert_eq!(stored.state_version, 2);
    assert_eq!(stored.ended_reason.as_deref(), Some("ended by keeper"));
    assert_eq!(count_log_rows(&pool, session).await?, 2);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_writers_same_version(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_ALICE, TEST_BOB]);
    apply(&pool, session, TEST_KEEPER, RoomEvent::StartRoom, 0, &everyone).await?;

    let (first, second) = futures::join!(
        apply(&pool, session, TEST_KEEPER, RoomEvent::PassStick, 1, &everyone),
        apply(&pool, session, TEST_KEEPER, RoomEvent::PassStick, 1, &everyone),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    let stale = [&first, &second]
        .iter()
        .filter(|r| matches!(r, Err(CircleError::StaleVersion { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(stale, 1);

    let stored = RoomsRepository::get(&pool, session).await?.unwrap();
    assert_eq!(stored.state_version, 2);
    assert_eq!(count_log_rows(&pool, session).await?, 2);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_skip_recomputes_next_speaker(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = create_session_with_attendees(
        &pool,
        TEST_KEEPER,
        &[TEST_ALICE, TEST_BOB, TEST_CAROL],
    )
    .await?;
    load_room_for_member(&pool, session, TEST_KEEPER).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_ALICE, TEST_BOB, TEST_CAROL]);

    apply(&pool, session, TEST_KEEPER, RoomEvent::StartRoom, 0, &everyone).await?;
    let passing = apply(&pool, session, TEST_KEEPER, RoomEvent::PassStick, 1, &everyone).await?;
    assert_eq!(passing.next_speaker, Some(TEST_ALICE));

    let skipped = apply(
        &pool,
        session,
        TEST_KEEPER,
        RoomEvent::ForcePassStick,
        2,
        &everyone,
    )
    .await?;

    assert_eq!(skipped.turn_state, TurnState::Passing);
    assert_eq!(skipped.current_speaker, Some(TEST_KEEPER));
    assert_eq!(skipped.next_speaker, Some(TEST_BOB));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_disconnect_mid_pass_is_reconciled(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_ALICE, TEST_BOB]);

    // Order [K, A, B]; get A speaking and passing to B
    apply(&pool, session, TEST_KEEPER, RoomEvent::StartRoom, 0, &everyone).await?;
    apply(&pool, session, TEST_KEEPER, RoomEvent::PassStick, 1, &everyone).await?;
    apply(&pool, session, TEST_ALICE, RoomEvent::AcceptStick, 2, &everyone).await?;
    let passing = apply(&pool, session, TEST_ALICE, RoomEvent::PassStick, 3, &everyone).await?;
    assert_eq!(passing.next_speaker, Some(TEST_BOB));

    // Bob drops; the keeper reorders (same members) and reconciliation runs first
    let without_bob = connected(&[TEST_KEEPER, TEST_ALICE]);
    let reconciled = apply(
        &pool,
        session,
        TEST_KEEPER,
        RoomEvent::Reorder {
            new_order: vec![TEST_KEEPER, TEST_ALICE],
        },
        4,
        &without_bob,
    )
    .await?;

    assert_eq!(reconciled.talking_order, vec![TEST_KEEPER, TEST_ALICE]);
    assert_eq!(reconciled.current_speaker, Some(TEST_ALICE));
    assert_eq!(reconciled.next_speaker, Some(TEST_KEEPER));
    assert_eq!(reconciled.turn_state, TurnState::Passing);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_non_member_is_rejected(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_STRANGER]);

    let result = apply(&pool, session, TEST_STRANGER, RoomEvent::PassStick, 0, &everyone).await;
    assert!(matches!(result, Err(CircleError::NotInRoom(_))));

    let result = load_room_for_member(&pool, session, TEST_STRANGER).await;
    assert!(matches!(result, Err(CircleError::NotInRoom(_))));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unknown_session_is_not_found(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = SessionId::new();

    let result = apply(
        &pool,
        session,
        TEST_KEEPER,
        RoomEvent::StartRoom,
        0,
        &ConnectedSet::new(),
    )
    .await;
    assert!(matches!(result, Err(CircleError::NotFound(_))));

    let result = load_room_for_member(&pool, session, TEST_KEEPER).await;
    assert!(matches!(result, Err(CircleError::NotFound(_))));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_reorder_validation(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_ALICE, TEST_BOB]);
    apply(&pool, session, TEST_KEEPER, RoomEvent::StartRoom, 0, &everyone).await?;

    let missing = apply(
        &pool,
        session,
        TEST_KEEPER,
        RoomEvent::Reorder {
            new_order: vec![TEST_KEEPER, TEST_ALICE],
        },
        1,
        &everyone,
    )
    .await;
    assert!(matches!(
        missing,
        Err(CircleError::InvalidParticipantOrder(_))
    ));

    let reordered = apply(
        &pool,
        session,
        TEST_KEEPER,
        RoomEvent::Reorder {
            new_order: vec![TEST_KEEPER, TEST_BOB, TEST_ALICE],
        },
        1,
        &everyone,
    )
    .await?;
    assert_eq!(
        reordered.talking_order,
        vec![TEST_KEEPER, TEST_BOB, TEST_ALICE]
    );
    assert_eq!(reordered.version, 2);

    // The stick now travels along the new order
    let passing = apply(&pool, session, TEST_KEEPER, RoomEvent::PassStick, 2, &everyone).await?;
    assert_eq!(passing.next_speaker, Some(TEST_BOB));

    let accepted = apply(&pool, session, TEST_BOB, RoomEvent::AcceptStick, 3, &everyone).await?;
    assert_eq!(accepted.current_speaker, Some(TEST_BOB));
    assert_eq!(accepted.next_speaker, Some(TEST_ALICE));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_locked_room_times_out_as_busy(pool: PgPool) -> Result<(), anyhow::Error> {
    let session = setup(&pool).await?;
    let everyone = connected(&[TEST_KEEPER, TEST_ALICE, TEST_BOB]);

    let held = lock_room_row(&pool, session).await?;

    let result = apply_event(
        &pool,
        Duration::from_millis(100),
        session,
        TEST_KEEPER,
        &RoomEvent::StartRoom,
        0,
        &everyone,
    )
    .await;
    assert!(matches!(result, Err(CircleError::RoomBusy)));

    held.rollback().await?;

    let stored = RoomsRepository::get(&pool, session).await?.unwrap();
    assert_eq!(stored.state_version, 0);
    assert_eq!(stored.status, RoomStatus::WaitingRoom);
    assert_eq!(count_log_rows(&pool, session).await?, 0);

    // Once released the same write goes through
    let started = apply(&pool, session, TEST_KEEPER, RoomEvent::StartRoom, 0, &everyone).await?;
    assert_eq!(started.version, 1);

    Ok(())
}
