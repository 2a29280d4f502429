//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use these types for
//! the JWT signing secret, the LiveKit API secret, and any bearer token held in
//! memory.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that derives
//! `Debug` while holding a secret gets safe logging behavior for free. Secrets are
//! zeroized when dropped.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct LiveKitCredentials {
//!     api_key: String,
//!     api_secret: SecretString,
//! }
//!
//! let creds = LiveKitCredentials {
//!     api_key: "APIkey".to_string(),
//!     api_secret: SecretString::from("livekit-secret"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("livekit-secret"));
//! assert_eq!(creds.api_secret.expose_secret(), "livekit-secret");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
