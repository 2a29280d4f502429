//! HTTP request handlers for the circle service.

pub mod health;
pub mod metrics;
pub mod room;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use room::{
    apply_room_event, get_room_history, get_room_state, join_session, mute_all_participants,
    mute_participant, remove_participant,
};
