//! `SQLite` schema bootstrap logic.
//!
//! Table definitions use `CREATE TABLE IF NOT EXISTS` and are safe to
//! re-run on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Persistence` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS restart (
    flag            INTEGER NOT NULL CHECK(flag IN (0, 1)),
    caller          TEXT NOT NULL UNIQUE
);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
