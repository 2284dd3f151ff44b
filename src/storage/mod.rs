//! Storage layer: SQLite persistence for the follow-up engine.

pub mod database;
pub mod queries;
mod schema;
mod store;

pub use database::{Database, DatabaseError};
pub use store::SqliteStore;
