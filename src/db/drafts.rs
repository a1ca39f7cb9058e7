use chrono::Utc;
use rusqlite::params;

use super::*;

fn map_draft_row(row: &rusqlite::Row) -> rusqlite::Result<DbStoryDraft> {
    Ok(DbStoryDraft {
        storyteller_id: row.get(0)?,
        story_one: row.get(1)?,
        story_two: row.get(2)?,
        story_three: row.get(3)?,
        notes: row.get(4)?,
        auto_saved_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl SareDb {
    // =========================================================================
    // Story drafts (autosave snapshots)
    // =========================================================================

    /// Write the latest draft snapshot for a storyteller.
    ///
    /// The draft is a full snapshot of the editor, so every field is
    /// overwritten, cleared fields included. `created_at` survives from the
    /// first save.
    pub fn upsert_draft(
        &self,
        storyteller_id: &str,
        story_one: Option<&str>,
        story_two: Option<&str>,
        story_three: Option<&str>,
        notes: Option<&str>,
    ) -> Result<DbStoryDraft, DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO story_drafts (
                storyteller_id, story_one, story_two, story_three, notes,
                auto_saved_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(storyteller_id) DO UPDATE SET
                story_one = excluded.story_one,
                story_two = excluded.story_two,
                story_three = excluded.story_three,
                notes = excluded.notes,
                auto_saved_at = excluded.auto_saved_at",
            params![storyteller_id, story_one, story_two, story_three, notes, now],
        )?;
        self.get_draft(storyteller_id)?
            .ok_or_else(|| DbError::StorytellerNotFound(storyteller_id.to_string()))
    }

    /// Fetch a storyteller's draft, if one exists.
    pub fn get_draft(&self, storyteller_id: &str) -> Result<Option<DbStoryDraft>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT storyteller_id, story_one, story_two, story_three, notes,
                    auto_saved_at, created_at
             FROM story_drafts WHERE storyteller_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![storyteller_id], map_draft_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Drop a storyteller's draft. Returns whether one existed.
    pub fn delete_draft(&self, storyteller_id: &str) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "DELETE FROM story_drafts WHERE storyteller_id = ?1",
            params![storyteller_id],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_upsert_overwrites_snapshot() {
        let db = test_db();

        let draft = db
            .upsert_draft("st-1", Some("first pass"), Some("second part"), None, None)
            .expect("insert");
        assert_eq!(draft.story_one.as_deref(), Some("first pass"));
        assert_eq!(draft.story_two.as_deref(), Some("second part"));
        let created = draft.created_at.clone();

        // A later snapshot replaces every field, including clearing one
        let draft = db
            .upsert_draft("st-1", Some("revised pass"), None, None, Some("remember the boat trip"))
            .expect("update");
        assert_eq!(draft.story_one.as_deref(), Some("revised pass"));
        assert!(draft.story_two.is_none());
        assert_eq!(draft.notes.as_deref(), Some("remember the boat trip"));
        assert_eq!(draft.created_at, created);
    }

    #[test]
    fn test_get_missing_draft() {
        let db = test_db();
        assert!(db.get_draft("nobody").expect("query").is_none());
    }

    #[test]
    fn test_delete_draft() {
        let db = test_db();
        db.upsert_draft("st-1", Some("text"), None, None, None)
            .expect("insert");

        assert!(db.delete_draft("st-1").expect("delete"));
        assert!(db.get_draft("st-1").expect("query").is_none());
        assert!(!db.delete_draft("st-1").expect("second delete"));
    }
}
