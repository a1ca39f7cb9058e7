use chrono::{DateTime, Utc};
use rusqlite::params;

use super::storytellers::STORYTELLER_COLUMNS;
use super::*;

const STORY_COLUMNS: &str = "id, user_id, storyteller_id, story_one, story_two,
        story_three, status, submitted_at, created_at";

fn map_story_row(row: &rusqlite::Row) -> rusqlite::Result<DbStory> {
    Ok(DbStory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        storyteller_id: row.get(2)?,
        story_one: row.get(3)?,
        story_two: row.get(4)?,
        story_three: row.get(5)?,
        status: row.get(6)?,
        submitted_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_story_with_teller_row(row: &rusqlite::Row) -> rusqlite::Result<DbStoryWithTeller> {
    Ok(DbStoryWithTeller {
        id: row.get(0)?,
        storyteller_id: row.get(1)?,
        storyteller_name: row.get(2)?,
        storyteller_email: row.get(3)?,
        story_one: row.get(4)?,
        story_two: row.get(5)?,
        story_three: row.get(6)?,
        submitted_at: row.get(7)?,
    })
}

impl SareDb {
    // =========================================================================
    // Stories
    // =========================================================================

    /// Submit a storyteller's story. One logical write:
    /// insert the story, mark the storyteller submitted, drop their draft.
    ///
    /// A storyteller submits exactly once. A second attempt (double click,
    /// stale tab) fails with [`DbError::StoryAlreadySubmitted`] and changes
    /// nothing.
    pub fn submit_story(
        &self,
        storyteller_id: &str,
        story_one: &str,
        story_two: Option<&str>,
        story_three: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DbStory, DbError> {
        let story_one = story_one.trim();
        if story_one.is_empty() {
            return Err(DbError::InvalidField {
                field: "story",
                message: "the first story part is required".to_string(),
            });
        }

        let story_id = uuid::Uuid::new_v4().to_string();
        let now_iso = now.to_rfc3339();
        self.with_transaction(|tx| {
            let owner: Option<(String, String)> = tx
                .conn
                .query_row(
                    "SELECT user_id, invitation_status FROM storytellers WHERE id = ?1",
                    params![storyteller_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(DbError::from(other)),
                })?;
            let (user_id, status) = owner
                .ok_or_else(|| DbError::StorytellerNotFound(storyteller_id.to_string()))?;
            if status == InvitationStatus::Submitted.as_str() {
                return Err(DbError::StoryAlreadySubmitted(storyteller_id.to_string()));
            }

            let inserted = tx.conn.execute(
                "INSERT INTO stories (
                    id, user_id, storyteller_id, story_one, story_two, story_three,
                    status, submitted_at, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'submitted', ?7, ?7)",
                params![story_id, user_id, storyteller_id, story_one, story_two, story_three, now_iso],
            );
            match inserted {
                Ok(_) => {}
                // The UNIQUE index on storyteller_id backstops the status check
                Err(e) if DbError::is_unique_violation(&e) => {
                    return Err(DbError::StoryAlreadySubmitted(storyteller_id.to_string()));
                }
                Err(e) => return Err(e.into()),
            }

            tx.conn.execute(
                "UPDATE storytellers SET invitation_status = 'submitted', updated_at = ?2
                 WHERE id = ?1",
                params![storyteller_id, now_iso],
            )?;
            tx.conn.execute(
                "DELETE FROM story_drafts WHERE storyteller_id = ?1",
                params![storyteller_id],
            )?;
            Ok(())
        })?;

        log::info!("Stories: storyteller {storyteller_id} submitted");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORY_COLUMNS} FROM stories WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![story_id], map_story_row)?;
        match rows.next() {
            Some(row) => Ok(row?),
            None => Err(DbError::StorytellerNotFound(storyteller_id.to_string())),
        }
    }

    /// The story a storyteller submitted, if any.
    pub fn story_for_storyteller(
        &self,
        storyteller_id: &str,
    ) -> Result<Option<DbStory>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORY_COLUMNS} FROM stories
             WHERE storyteller_id = ?1 AND status = 'submitted'"
        ))?;
        let mut rows = stmt.query_map(params![storyteller_id], map_story_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Submitted stories for an account, newest first, with author details.
    pub fn list_stories_with_tellers(
        &self,
        user_id: &str,
    ) -> Result<Vec<DbStoryWithTeller>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT st.id, st.storyteller_id, s.name, s.email,
                    st.story_one, st.story_two, st.story_three, st.submitted_at
             FROM stories st
             JOIN storytellers s ON s.id = st.storyteller_id
             WHERE st.user_id = ?1 AND st.status = 'submitted'
             ORDER BY st.submitted_at DESC, st.id",
        )?;
        let rows = stmt.query_map(params![user_id], map_story_with_teller_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// How many submitted stories the account has collected.
    pub fn count_submitted_stories(&self, user_id: &str) -> Result<i64, DbError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM stories WHERE user_id = ?1 AND status = 'submitted'",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Latest submissions and latest invitations, for the dashboard feed.
    pub fn recent_activity(&self, user_id: &str, limit: i64) -> Result<RecentActivity, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT st.id, st.storyteller_id, s.name, s.email,
                    st.story_one, st.story_two, st.story_three, st.submitted_at
             FROM stories st
             JOIN storytellers s ON s.id = st.storyteller_id
             WHERE st.user_id = ?1 AND st.status = 'submitted'
             ORDER BY st.submitted_at DESC, st.id
             LIMIT ?2",
        )?;
        let recent_stories = stmt
            .query_map(params![user_id, limit], map_story_with_teller_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORYTELLER_COLUMNS} FROM storytellers
             WHERE user_id = ?1 AND invited_at IS NOT NULL
             ORDER BY invited_at DESC, id
             LIMIT ?2"
        ))?;
        let recent_invites = stmt
            .query_map(params![user_id, limit], map_storyteller_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(RecentActivity {
            recent_stories,
            recent_invites,
        })
    }
}
