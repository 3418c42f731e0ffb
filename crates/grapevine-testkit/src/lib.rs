//! # Grapevine Testkit
//!
//! Fixtures and builders shared by unit and integration tests: deterministic
//! messages, members, and pre-seeded in-memory stores.

pub mod fixtures;

pub use fixtures::{member, post, reaction, MessageBuilder, TestSpace};
