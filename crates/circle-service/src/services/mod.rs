//! Service layer for the circle service.
//!
//! # Components
//!
//! - `room_orchestrator` - the locked, versioned write path to a room
//! - `transport` - the media transport boundary and its mock
//! - `livekit` - LiveKit implementation of the transport

pub mod livekit;
pub mod room_orchestrator;
pub mod transport;

pub use livekit::LiveKitClient;
pub use room_orchestrator::{apply_event, load_room_for_member};
pub use transport::{spawn_publish, JoinCredential, RoomTransport};
