use chrono::{DateTime, Utc};
use rusqlite::params;

use super::*;

fn map_reflection_row(row: &rusqlite::Row) -> rusqlite::Result<DbSelfReflection> {
    Ok(DbSelfReflection {
        user_id: row.get(0)?,
        strengths_response: row.get(1)?,
        evidence_response: row.get(2)?,
        growth_themes_response: row.get(3)?,
        personal_narrative: row.get(4)?,
        completed_at: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl SareDb {
    // =========================================================================
    // Self-reflections
    // =========================================================================

    /// Write the latest reflection snapshot for an account.
    ///
    /// Like drafts, this is a full snapshot: every response field is
    /// overwritten. `completed_at` and `created_at` are never touched here.
    pub fn upsert_reflection(
        &self,
        user_id: &str,
        strengths: Option<&str>,
        evidence: Option<&str>,
        growth_themes: Option<&str>,
        narrative: Option<&str>,
    ) -> Result<DbSelfReflection, DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO self_reflections (
                user_id, strengths_response, evidence_response,
                growth_themes_response, personal_narrative,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                strengths_response = excluded.strengths_response,
                evidence_response = excluded.evidence_response,
                growth_themes_response = excluded.growth_themes_response,
                personal_narrative = excluded.personal_narrative,
                updated_at = excluded.updated_at",
            params![user_id, strengths, evidence, growth_themes, narrative, now],
        )?;
        self.get_reflection(user_id)?
            .ok_or_else(|| DbError::ProfileNotFound(user_id.to_string()))
    }

    /// Fetch an account's reflection, if started.
    pub fn get_reflection(&self, user_id: &str) -> Result<Option<DbSelfReflection>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, strengths_response, evidence_response,
                    growth_themes_response, personal_narrative,
                    completed_at, created_at, updated_at
             FROM self_reflections WHERE user_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![user_id], map_reflection_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Mark the reflection finished: stamp `completed_at`, flip the profile
    /// flag, and move the account to `completed`. One transaction.
    ///
    /// Requires all three response sections to be filled in. The narrative is
    /// optional and never gates completion.
    pub fn complete_reflection(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DbSelfReflection, DbError> {
        let reflection = self
            .get_reflection(user_id)?
            .ok_or_else(|| DbError::InvalidField {
                field: "reflection",
                message: "no reflection has been started".to_string(),
            })?;
        if !reflection.is_complete() {
            return Err(DbError::InvalidField {
                field: "reflection",
                message: "all three reflection responses are required".to_string(),
            });
        }

        let now_iso = now.to_rfc3339();
        self.with_transaction(|tx| {
            tx.conn.execute(
                "UPDATE self_reflections SET completed_at = ?2, updated_at = ?2
                 WHERE user_id = ?1",
                params![user_id, now_iso],
            )?;
            let changed = tx.conn.execute(
                "UPDATE profiles SET
                    reflection_completed = 1,
                    collection_status = 'completed',
                    updated_at = ?2
                 WHERE user_id = ?1",
                params![user_id, now_iso],
            )?;
            if changed == 0 {
                return Err(DbError::ProfileNotFound(user_id.to_string()));
            }
            Ok(())
        })?;

        log::info!("Reflections: {user_id} completed reflection");
        self.get_reflection(user_id)?
            .ok_or_else(|| DbError::ProfileNotFound(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_upsert_snapshot_preserves_completed_at() {
        let db = test_db();
        db.create_profile("u1", "me@example.com", None, None, None)
            .expect("profile");

        let r = db
            .upsert_reflection("u1", Some("calm under pressure"), None, None, None)
            .expect("insert");
        assert_eq!(r.strengths_response.as_deref(), Some("calm under pressure"));
        assert!(r.completed_at.is_none());

        db.upsert_reflection(
            "u1",
            Some("calm under pressure"),
            Some("the outage week"),
            Some("mentoring"),
            None,
        )
        .expect("update");
        db.complete_reflection("u1", Utc::now()).expect("complete");

        // A later edit keeps the completion stamp
        let r = db
            .upsert_reflection("u1", Some("calm, decisive"), Some("the outage week"), Some("mentoring"), None)
            .expect("edit after complete");
        assert!(r.completed_at.is_some());
        assert_eq!(r.strengths_response.as_deref(), Some("calm, decisive"));
    }

    #[test]
    fn test_complete_requires_all_three_responses() {
        let db = test_db();
        db.create_profile("u1", "me@example.com", None, None, None)
            .expect("profile");

        // Nothing started yet
        let result = db.complete_reflection("u1", Utc::now());
        assert!(matches!(result, Err(DbError::InvalidField { .. })));

        db.upsert_reflection("u1", Some("strengths"), Some("  "), Some("growth"), None)
            .expect("partial");
        let result = db.complete_reflection("u1", Utc::now());
        assert!(matches!(result, Err(DbError::InvalidField { .. })));

        // Narrative stays optional
        db.upsert_reflection("u1", Some("strengths"), Some("evidence"), Some("growth"), None)
            .expect("full");
        let now = Utc::now();
        let r = db.complete_reflection("u1", now).expect("complete");
        assert_eq!(r.completed_at.as_deref(), Some(now.to_rfc3339().as_str()));

        let profile = db.get_profile("u1").expect("get").expect("exists");
        assert!(profile.reflection_completed);
        assert_eq!(profile.collection_status, CollectionStatus::Completed);
    }
}
