//! HTTP middleware for the circle service.
//!
//! - `auth` - bearer token validation for `/api/v1` routes
//! - `http_metrics` - request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_participant, AuthState, AuthenticatedParticipant};
pub use http_metrics::http_metrics_middleware;
