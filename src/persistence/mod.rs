//! Persistence layer modules.

pub mod db;
pub mod schema;
pub mod summary_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
