//! Participant token helpers.
//!
//! Tokens are signed with `TEST_JWT_SECRET`, the same secret the test server
//! is configured with.

use chrono::{Duration, Utc};
use common::jwt::{sign_participant_token, ParticipantClaims};
use common::types::ParticipantId;

/// HS256 secret shared by the test server and these helpers.
pub const TEST_JWT_SECRET: &str = "circle-test-jwt-secret-do-not-use-in-production";

/// A valid one-hour token for `participant`.
pub fn participant_token(participant: ParticipantId) -> String {
    TestTokenBuilder::new(participant).build()
}

/// Builder for participant tokens with non-default claims.
///
/// # Example
/// ```rust,ignore
/// let expired = TestTokenBuilder::new(TEST_ALICE).expires_in(-60).build();
/// ```
pub struct TestTokenBuilder {
    claims: ParticipantClaims,
    secret: Vec<u8>,
}

impl TestTokenBuilder {
    pub fn new(participant: ParticipantId) -> Self {
        let now = Utc::now();
        Self {
            claims: ParticipantClaims {
                sub: participant.to_string(),
                exp: (now + Duration::seconds(3600)).timestamp(),
                iat: now.timestamp(),
                name: None,
            },
            secret: TEST_JWT_SECRET.as_bytes().to_vec(),
        }
    }

    /// Set the display name claim
    pub fn with_name(mut self, name: &str) -> Self {
        self.claims.name = Some(name.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.claims.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Sign with a different secret
    pub fn signed_with(mut self, secret: &str) -> Self {
        self.secret = secret.as_bytes().to_vec();
        self
    }

    pub fn build(self) -> String {
        sign_participant_token(&self.claims, &self.secret).expect("signing test token")
    }
}
