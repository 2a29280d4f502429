//! The talking-stick state machine.
//!
//! Pure domain code: no I/O, no clock. The orchestrator in
//! `services::room_orchestrator` supplies the persisted room and the connected
//! set, and persists whatever comes back.

pub mod events;
pub mod order;
pub mod state;
pub mod transitions;

pub use events::{RoomEvent, DEFAULT_END_REASON, KEEPER_ABSENT_REASON};
pub use order::{next_in_order, reconcile, ConnectedSet};
pub use state::{Room, RoomState, RoomStatus, StatusDetail, TurnState};
