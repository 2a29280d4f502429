//! Fixed test IDs for deterministic tests

use common::types::ParticipantId;
use uuid::Uuid;

// Keepers (1-99)
pub const TEST_KEEPER: ParticipantId = ParticipantId(Uuid::from_u128(1));
pub const TEST_KEEPER_2: ParticipantId = ParticipantId(Uuid::from_u128(2));

// Attendees (100-199)
pub const TEST_ALICE: ParticipantId = ParticipantId(Uuid::from_u128(100));
pub const TEST_BOB: ParticipantId = ParticipantId(Uuid::from_u128(101));
pub const TEST_CAROL: ParticipantId = ParticipantId(Uuid::from_u128(102));

// Not attached to any session (900+)
pub const TEST_STRANGER: ParticipantId = ParticipantId(Uuid::from_u128(900));
