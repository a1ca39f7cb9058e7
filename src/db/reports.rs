use chrono::{DateTime, Utc};
use rusqlite::params;

use super::*;

fn map_report_row(row: &rusqlite::Row) -> rusqlite::Result<DbReportMeta> {
    Ok(DbReportMeta {
        user_id: row.get(0)?,
        generated_at: row.get(1)?,
        is_locked: row.get::<_, i64>(2)? != 0,
        page_count: row.get(3)?,
        story_count: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl SareDb {
    // =========================================================================
    // Report metadata
    // =========================================================================

    /// Record a report generation. The PDF bytes themselves are never stored,
    /// only when it was built and from how much material.
    pub fn upsert_report_meta(
        &self,
        user_id: &str,
        generated_at: DateTime<Utc>,
        page_count: i64,
        story_count: i64,
    ) -> Result<DbReportMeta, DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO reports (
                user_id, generated_at, is_locked, page_count, story_count, created_at
             ) VALUES (?1, ?2, 0, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                generated_at = excluded.generated_at,
                page_count = excluded.page_count,
                story_count = excluded.story_count",
            params![user_id, generated_at.to_rfc3339(), page_count, story_count, now],
        )?;
        self.get_report_meta(user_id)?
            .ok_or_else(|| DbError::ProfileNotFound(user_id.to_string()))
    }

    /// Fetch report metadata for an account, if a report was ever generated.
    pub fn get_report_meta(&self, user_id: &str) -> Result<Option<DbReportMeta>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, generated_at, is_locked, page_count, story_count, created_at
             FROM reports WHERE user_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![user_id], map_report_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Lock the report. One-way: there is no unlock.
    pub fn lock_report(&self, user_id: &str) -> Result<DbReportMeta, DbError> {
        let changed = self.conn.execute(
            "UPDATE reports SET is_locked = 1 WHERE user_id = ?1",
            params![user_id],
        )?;
        if changed == 0 {
            return Err(DbError::ProfileNotFound(user_id.to_string()));
        }
        self.get_report_meta(user_id)?
            .ok_or_else(|| DbError::ProfileNotFound(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_upsert_and_regenerate() {
        let db = test_db();
        let first = Utc::now();

        let meta = db
            .upsert_report_meta("u1", first, 3, 5)
            .expect("insert");
        assert_eq!(meta.page_count, 3);
        assert_eq!(meta.story_count, 5);
        assert!(!meta.is_locked);

        let later = first + chrono::Duration::days(1);
        let meta = db
            .upsert_report_meta("u1", later, 4, 7)
            .expect("regenerate");
        assert_eq!(meta.generated_at, later.to_rfc3339());
        assert_eq!(meta.page_count, 4);
        assert_eq!(meta.story_count, 7);
    }

    #[test]
    fn test_lock_is_one_way_and_survives_regeneration() {
        let db = test_db();
        db.upsert_report_meta("u1", Utc::now(), 3, 5)
            .expect("insert");

        let meta = db.lock_report("u1").expect("lock");
        assert!(meta.is_locked);

        // Regenerating metadata does not clear the lock
        let meta = db
            .upsert_report_meta("u1", Utc::now(), 4, 6)
            .expect("regenerate");
        assert!(meta.is_locked);
    }

    #[test]
    fn test_lock_without_report_errors() {
        let db = test_db();
        assert!(db.lock_report("nobody").is_err());
    }
}
