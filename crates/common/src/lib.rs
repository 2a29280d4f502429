//! Common utilities and types shared across Talking Circle components.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes (sessions, participants)
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for participant JWT utilities (claims, validation, signing)
pub mod jwt;
