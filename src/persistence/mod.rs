//! Persistence layer modules.

pub mod db;
pub mod restart_repo;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
