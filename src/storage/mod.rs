//! Persistence layer
//!
//! Embedded SQLite storage for knowledge documents, document chunks with
//! their embedding vectors, per-channel conversations, messages, and the
//! administratively managed bot configuration.

pub mod database;
pub mod schema;

pub use database::Database;
