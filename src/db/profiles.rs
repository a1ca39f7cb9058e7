use chrono::Utc;
use rusqlite::params;

use super::*;

const PROFILE_COLUMNS: &str = "user_id, email, display_name, first_name, last_name,
        collection_goal, collection_status, reflection_completed, created_at, updated_at";

impl SareDb {
    // =========================================================================
    // Profiles (accounts)
    // =========================================================================

    /// Create a profile for a newly signed-up account.
    ///
    /// New accounts start in `preparing` with the default collection goal of
    /// ten stories.
    pub fn create_profile(
        &self,
        user_id: &str,
        email: &str,
        display_name: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<DbProfile, DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO profiles (
                user_id, email, display_name, first_name, last_name,
                collection_goal, collection_status, reflection_completed,
                created_at, updated_at
             ) VALUES (?1, LOWER(?2), ?3, ?4, ?5, 10, 'preparing', 0, ?6, ?6)",
            params![user_id, email, display_name, first_name, last_name, now],
        )?;
        self.get_profile(user_id)?
            .ok_or_else(|| DbError::ProfileNotFound(user_id.to_string()))
    }

    /// Look up a profile by account id.
    pub fn get_profile(&self, user_id: &str) -> Result<Option<DbProfile>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![user_id], map_profile_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Update display fields and/or the collection goal. `None` leaves the
    /// stored value untouched.
    pub fn update_profile(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
        collection_goal: Option<i64>,
    ) -> Result<DbProfile, DbError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE profiles SET
                display_name = COALESCE(?2, display_name),
                first_name = COALESCE(?3, first_name),
                last_name = COALESCE(?4, last_name),
                collection_goal = COALESCE(?5, collection_goal),
                updated_at = ?6
             WHERE user_id = ?1",
            params![user_id, display_name, first_name, last_name, collection_goal, now],
        )?;
        if changed == 0 {
            return Err(DbError::ProfileNotFound(user_id.to_string()));
        }
        self.get_profile(user_id)?
            .ok_or_else(|| DbError::ProfileNotFound(user_id.to_string()))
    }

    /// Advance the collection status. Forward-only: regressions and no-op
    /// transitions are rejected, so callers can't silently rewind an account.
    pub fn advance_collection_status(
        &self,
        user_id: &str,
        next: CollectionStatus,
    ) -> Result<DbProfile, DbError> {
        let profile = self
            .get_profile(user_id)?
            .ok_or_else(|| DbError::ProfileNotFound(user_id.to_string()))?;

        if !profile.collection_status.can_advance_to(next) {
            return Err(DbError::InvalidTransition {
                from: profile.collection_status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE profiles SET collection_status = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, next.as_str(), now],
        )?;
        log::info!(
            "Profiles: {} advanced {} -> {}",
            user_id,
            profile.collection_status.as_str(),
            next.as_str()
        );
        self.get_profile(user_id)?
            .ok_or_else(|| DbError::ProfileNotFound(user_id.to_string()))
    }
}
