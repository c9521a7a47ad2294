//! Restart record repository for `SQLite` persistence.
//!
//! Requesters only ever upsert; the process owning a caller name reads and
//! clears its record with [`RestartRepo::take`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Result;

use super::db::Database;

/// Durable signal that the process named `caller` should restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestartRecord {
    /// Whether a restart is pending.
    pub flag: bool,
    /// Name of the process that has to restart; unique.
    pub caller: String,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct RestartRow {
    flag: i64,
    caller: String,
}

impl From<RestartRow> for RestartRecord {
    fn from(row: RestartRow) -> Self {
        Self {
            flag: row.flag != 0,
            caller: row.caller,
        }
    }
}

/// Repository for restart records.
#[derive(Clone)]
pub struct RestartRepo {
    db: Arc<Database>,
}

impl RestartRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace the restart record for `caller` with `flag = true`.
    ///
    /// Runs inside an explicit transaction so an interrupted write never
    /// leaves a partial row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Persistence` if the write or commit fails.
    pub async fn upsert(&self, caller: &str) -> Result<RestartRecord> {
        let mut tx = self.db.begin().await?;
        sqlx::query("INSERT OR REPLACE INTO restart (flag, caller) VALUES (?1, ?2)")
            .bind(1_i64)
            .bind(caller)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(RestartRecord {
            flag: true,
            caller: caller.to_owned(),
        })
    }

    /// Read and clear a pending record for `caller`.
    ///
    /// Returns `true` when a flagged record existed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Persistence` if the query or commit fails.
    pub async fn take(&self, caller: &str) -> Result<bool> {
        let mut tx = self.db.begin().await?;
        let row: Option<RestartRow> =
            sqlx::query_as("SELECT flag, caller FROM restart WHERE caller = ?1")
                .bind(caller)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("DELETE FROM restart WHERE caller = ?1")
            .bind(caller)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(row.flag != 0)
    }

    /// List every stored record ordered by caller.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Persistence` if the query fails.
    pub async fn list(&self) -> Result<Vec<RestartRecord>> {
        let rows: Vec<RestartRow> =
            sqlx::query_as("SELECT flag, caller FROM restart ORDER BY caller ASC")
                .fetch_all(self.db.as_ref())
                .await?;
        Ok(rows.into_iter().map(RestartRecord::from).collect())
    }
}
