//! Test utilities shared by unit and integration tests
//!
//! Fixtures for seeded stores and guilds, session-event helpers with
//! timeouts, and assertions over the guild invariants.

pub mod assertions;
pub mod async_helpers;
pub mod fixtures;

pub use assertions::*;
pub use async_helpers::*;
pub use fixtures::*;
