//! SQLite-based entity store for accounts, storytellers, stories, and reflections.
//!
//! The database lives at `~/.sare/sare.db` and is the single source of truth
//! for collection state. Row scoping by `user_id` at every query is the
//! authorization boundary: no operation returns or mutates rows outside the
//! calling account's set, and storyteller-side operations reach rows only
//! through an invitation token.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod types;
pub use types::*;

pub struct SareDb {
    conn: Connection,
}

impl SareDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at `~/.sare/sare.db` and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Background tasks and tests use
    /// this so every component is handed its path instead of consulting
    /// process-global state.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        // Run schema migrations
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        // Enable FK constraint enforcement
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.sare/sare.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".sare").join("sare.db"))
    }
}

pub mod drafts;
pub mod profiles;
pub mod reflections;
pub mod reports;
pub mod stories;
pub mod storytellers;

// =============================================================================
// Shared test utilities
// =============================================================================


// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_open_creates_tables() {
        let db = test_db();

        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .expect("profiles table should exist");
        assert_eq!(count, 0);

        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM storytellers", [], |row| row.get(0))
            .expect("storytellers table should exist");
        assert_eq!(count, 0);

        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM story_drafts", [], |row| row.get(0))
            .expect("story_drafts table should exist");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = test_db();

        db.with_transaction(|tx| {
            tx.conn_ref()
                .execute(
                    "INSERT INTO profiles (user_id, email, created_at, updated_at)
                     VALUES ('u1', 'me@example.com', '2025-01-01', '2025-01-01')",
                    [],
                )
                .map_err(DbError::from)?;
            Ok(())
        })
        .expect("transaction should commit");

        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .expect("query");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let db = test_db();

        let result: Result<(), DbError> = db.with_transaction(|tx| {
            tx.conn_ref()
                .execute(
                    "INSERT INTO profiles (user_id, email, created_at, updated_at)
                     VALUES ('u1', 'me@example.com', '2025-01-01', '2025-01-01')",
                    [],
                )
                .map_err(DbError::from)?;
            Err(DbError::Migration("forced failure".to_string()))
        });
        assert!(result.is_err());

        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .expect("query");
        assert_eq!(count, 0, "insert should have been rolled back");
    }
}
