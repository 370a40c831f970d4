//! Conversation persistence for Hearth.
//!
//! [`SqliteStore`] is the only backend: a single SQLite database file
//! holding conversations and their messages. Pass `":memory:"` for an
//! ephemeral database in tests.

pub mod sqlite;

pub use sqlite::SqliteStore;
