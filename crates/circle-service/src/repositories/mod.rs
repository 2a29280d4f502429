//! Repository layer for the circle service.
//!
//! Handler -> Service -> Repository. Functions that must participate in the
//! orchestrator's transaction take a `&mut PgConnection`; the rest take the pool.

pub mod room_event_log;
pub mod rooms;
pub mod sessions;

pub use room_event_log::{RoomEventLogEntry, RoomEventLogRepository};
pub use rooms::RoomsRepository;
pub use sessions::{Session, SessionsRepository};
