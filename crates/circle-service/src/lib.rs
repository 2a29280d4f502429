//! Talking Circle service library.
//!
//! Runs the talking-stick state machine for scheduled sessions:
//!
//! - Per-session room state (waiting room, active, ended) and turn state
//! - Versioned, row-locked transitions with an append-only audit log
//! - Reconciliation of the talking order against the live media room
//! - Join credentials and keeper moderation via LiveKit
//! - Auto-ending sessions whose keeper never arrived
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//!                                        |
//!                                     room/*.rs (pure state machine)
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Participant authentication and HTTP metrics
//! - `models` - Request and response bodies
//! - `observability` - Prometheus metrics
//! - `repositories` - PostgreSQL access
//! - `room` - Room aggregate, events, and transition rules
//! - `routes` - Axum router setup
//! - `services` - Orchestrator and media transport
//! - `tasks` - Background tasks

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod room;
pub mod routes;
pub mod services;
pub mod tasks;
