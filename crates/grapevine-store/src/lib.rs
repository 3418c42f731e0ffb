//! # Grapevine Store
//!
//! Storage abstraction for the Grapevine sync core. The core owns no
//! persistent state: messages, members, and tombstones live behind the
//! [`Storage`] trait, which the host implements over its own database.
//!
//! ## Key Types
//!
//! - [`Storage`] - The async trait the sync core consumes
//! - [`MemoryStore`] - In-memory implementation for tests and small hosts
//! - [`MessageQuery`] / [`MessagePage`] - Cursor-based paged retrieval
//!
//! ## Design Notes
//!
//! - **Saves are upserts**: saving a message or member with an existing key
//!   replaces the stored record.
//! - **Deletes are idempotent**: deleting an absent message is not an error.
//! - **Paging is deterministic**: messages come back ordered by
//!   `(created_date, message_id)` with an opaque message-id cursor.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::{Direction, MessagePage, MessageQuery, Storage};
