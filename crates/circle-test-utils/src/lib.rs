//! # Circle Test Utilities
//!
//! Shared test utilities for the circle service.
//!
//! This crate provides:
//! - Server test harness (`TestCircleServer` for E2E tests, backed by `MockTransport`)
//! - Session fixtures (`SessionFixture`, `add_attendee`)
//! - Participant token helpers
//! - Fixed IDs for deterministic tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use circle_test_utils::*;
//!
//! #[sqlx::test(migrations = "../../migrations")]
//! async fn test_example(pool: PgPool) -> Result<()> {
//!     let server = TestCircleServer::spawn(pool.clone()).await?;
//!     let session = SessionFixture::new(TEST_KEEPER).insert(&pool).await?;
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/v1/sessions/{}/room", server.url(), session))
//!         .bearer_auth(participant_token(TEST_KEEPER))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;
pub mod test_ids;
pub mod tokens;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
pub use test_ids::*;
pub use tokens::*;
