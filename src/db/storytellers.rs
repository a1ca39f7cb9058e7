use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::params;
use unicode_normalization::UnicodeNormalization;

use super::*;

pub(crate) const STORYTELLER_COLUMNS: &str = "id, user_id, name, email, phone, notes,
        invitation_token, token_expires_at, invitation_status, access_method,
        auth_user_id, reminder_count, invited_at, magic_link_sent_at,
        first_access_at, last_access_at, last_contacted_at, created_at, updated_at";

fn email_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

/// Canonicalize an email for storage and comparison: trim, NFC-normalize,
/// lowercase. Rejects anything that doesn't look like `local@domain.tld`.
pub(crate) fn normalize_email(raw: &str) -> Result<String, DbError> {
    let email = raw.trim().nfc().collect::<String>().to_lowercase();
    if !email_shape().is_match(&email) {
        return Err(DbError::InvalidField {
            field: "email",
            message: "not a valid email address".to_string(),
        });
    }
    Ok(email)
}

impl SareDb {
    // =========================================================================
    // Storytellers (the invitation roster)
    // =========================================================================

    /// Add a storyteller to an account's roster.
    ///
    /// Emails are canonicalized before storage, and the per-account unique
    /// index surfaces as [`DbError::DuplicateStorytellerEmail`].
    pub fn add_storyteller(
        &self,
        user_id: &str,
        name: &str,
        email: &str,
        phone: Option<&str>,
        notes: Option<&str>,
    ) -> Result<DbStoryteller, DbError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbError::InvalidField {
                field: "name",
                message: "name is required".to_string(),
            });
        }
        let email = normalize_email(email)?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let result = self.conn.execute(
            "INSERT INTO storytellers (
                id, user_id, name, email, phone, notes,
                invitation_status, access_method, reminder_count,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 'pending', 0, ?7, ?7)",
            params![id, user_id, name, email, phone, notes, now],
        );
        match result {
            Ok(_) => {}
            Err(e) if DbError::is_unique_violation(&e) => {
                return Err(DbError::DuplicateStorytellerEmail);
            }
            Err(e) => return Err(e.into()),
        }

        self.get_storyteller(user_id, &id)?
            .ok_or_else(|| DbError::StorytellerNotFound(id))
    }

    /// List an account's storytellers, newest first.
    pub fn list_storytellers(&self, user_id: &str) -> Result<Vec<DbStoryteller>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORYTELLER_COLUMNS} FROM storytellers
             WHERE user_id = ?1 ORDER BY created_at DESC, id"
        ))?;
        let rows = stmt.query_map(params![user_id], map_storyteller_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Look up one storyteller within an account.
    pub fn get_storyteller(
        &self,
        user_id: &str,
        storyteller_id: &str,
    ) -> Result<Option<DbStoryteller>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORYTELLER_COLUMNS} FROM storytellers
             WHERE user_id = ?1 AND id = ?2"
        ))?;
        let mut rows = stmt.query_map(params![user_id, storyteller_id], map_storyteller_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Look up a storyteller by invitation token, across all accounts.
    ///
    /// The token itself is the authorization here, so there is no `user_id`
    /// scope. Expiry is NOT checked; callers decide what a stale token means.
    pub fn storyteller_by_token(&self, token: &str) -> Result<Option<DbStoryteller>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORYTELLER_COLUMNS} FROM storytellers
             WHERE invitation_token = ?1"
        ))?;
        let mut rows = stmt.query_map(params![token], map_storyteller_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Find a storyteller by email within an account, with submission and
    /// draft flags for routing returning visitors.
    pub fn storyteller_by_email(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<Option<StorytellerLookup>, DbError> {
        let email = normalize_email(email)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORYTELLER_COLUMNS},
                EXISTS(SELECT 1 FROM stories st
                       WHERE st.storyteller_id = storytellers.id
                         AND st.status = 'submitted'),
                EXISTS(SELECT 1 FROM story_drafts d
                       WHERE d.storyteller_id = storytellers.id)
             FROM storytellers
             WHERE user_id = ?1 AND email = ?2"
        ))?;
        let mut rows = stmt.query_map(params![user_id, email], |row| {
            let storyteller = map_storyteller_row(row)?;
            Ok(StorytellerLookup {
                storyteller,
                has_submitted: row.get::<_, i64>(19)? != 0,
                has_draft: row.get::<_, i64>(20)? != 0,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Update contact fields. `None` leaves the stored value untouched.
    pub fn update_storyteller(
        &self,
        user_id: &str,
        storyteller_id: &str,
        name: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
        notes: Option<&str>,
    ) -> Result<DbStoryteller, DbError> {
        let email = match email {
            Some(raw) => Some(normalize_email(raw)?),
            None => None,
        };
        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(DbError::InvalidField {
                    field: "name",
                    message: "name is required".to_string(),
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        let result = self.conn.execute(
            "UPDATE storytellers SET
                name = COALESCE(?3, name),
                email = COALESCE(?4, email),
                phone = COALESCE(?5, phone),
                notes = COALESCE(?6, notes),
                updated_at = ?7
             WHERE user_id = ?1 AND id = ?2",
            params![
                user_id,
                storyteller_id,
                name.map(str::trim),
                email,
                phone,
                notes,
                now
            ],
        );
        let changed = match result {
            Ok(n) => n,
            Err(e) if DbError::is_unique_violation(&e) => {
                return Err(DbError::DuplicateStorytellerEmail);
            }
            Err(e) => return Err(e.into()),
        };
        if changed == 0 {
            return Err(DbError::StorytellerNotFound(storyteller_id.to_string()));
        }
        self.get_storyteller(user_id, storyteller_id)?
            .ok_or_else(|| DbError::StorytellerNotFound(storyteller_id.to_string()))
    }

    /// Remove a storyteller and everything hanging off them (draft, story).
    pub fn delete_storyteller(&self, user_id: &str, storyteller_id: &str) -> Result<(), DbError> {
        self.with_transaction(|tx| {
            let owned: Option<String> = tx
                .conn
                .query_row(
                    "SELECT id FROM storytellers WHERE user_id = ?1 AND id = ?2",
                    params![user_id, storyteller_id],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(DbError::from(other)),
                })?;
            if owned.is_none() {
                return Err(DbError::StorytellerNotFound(storyteller_id.to_string()));
            }

            tx.conn.execute(
                "DELETE FROM story_drafts WHERE storyteller_id = ?1",
                params![storyteller_id],
            )?;
            tx.conn.execute(
                "DELETE FROM stories WHERE storyteller_id = ?1",
                params![storyteller_id],
            )?;
            tx.conn.execute(
                "DELETE FROM storytellers WHERE id = ?1",
                params![storyteller_id],
            )?;
            Ok(())
        })
    }

    // =========================================================================
    // Invitation lifecycle stamps
    // =========================================================================

    /// Store a freshly issued invitation token and mark the invitation sent.
    ///
    /// Issuing always resets: a new token replaces any previous one and the
    /// status returns to `sent` from any non-terminal state. Submitted
    /// storytellers can no longer be re-invited.
    pub fn set_invitation_token(
        &self,
        user_id: &str,
        storyteller_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DbStoryteller, DbError> {
        let current = self
            .get_storyteller(user_id, storyteller_id)?
            .ok_or_else(|| DbError::StorytellerNotFound(storyteller_id.to_string()))?;
        if current.invitation_status == InvitationStatus::Submitted {
            return Err(DbError::InvalidTransition {
                from: InvitationStatus::Submitted.as_str().to_string(),
                to: InvitationStatus::Sent.as_str().to_string(),
            });
        }

        let now_iso = now.to_rfc3339();
        self.conn.execute(
            "UPDATE storytellers SET
                invitation_token = ?3,
                token_expires_at = ?4,
                invitation_status = 'sent',
                access_method = 'magic_link',
                invited_at = ?5,
                magic_link_sent_at = ?5,
                updated_at = ?5
             WHERE user_id = ?1 AND id = ?2",
            params![
                user_id,
                storyteller_id,
                token,
                expires_at.to_rfc3339(),
                now_iso
            ],
        )?;
        self.get_storyteller(user_id, storyteller_id)?
            .ok_or_else(|| DbError::StorytellerNotFound(storyteller_id.to_string()))
    }

    /// Flip a `sent` invitation to `opened` and stamp the first access.
    ///
    /// Conditional on the current status so a reload, a reminder follow-up, or
    /// a post-submission visit never rewrites history. Returns whether the row
    /// actually changed.
    pub fn mark_invitation_opened(
        &self,
        storyteller_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let now_iso = now.to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE storytellers SET
                invitation_status = 'opened',
                first_access_at = COALESCE(first_access_at, ?2),
                updated_at = ?2
             WHERE id = ?1 AND invitation_status = 'sent'",
            params![storyteller_id, now_iso],
        )?;
        Ok(changed > 0)
    }

    /// Record a visit from a storyteller: first access is stamped at most
    /// once, last access every time, and the linked auth identity only when
    /// none is set yet.
    ///
    /// Missing rows are a silent no-op. This is telemetry on someone else's
    /// click, never worth failing their page for.
    pub fn record_access(
        &self,
        storyteller_id: &str,
        method: AccessMethod,
        auth_user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let now_iso = now.to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE storytellers SET
                first_access_at = COALESCE(first_access_at, ?2),
                last_access_at = ?2,
                access_method = ?3,
                auth_user_id = COALESCE(auth_user_id, ?4),
                updated_at = ?2
             WHERE id = ?1",
            params![storyteller_id, now_iso, method.as_str(), auth_user_id],
        )?;
        if changed == 0 {
            log::debug!("Storytellers: access recorded for unknown id {storyteller_id}");
        }
        Ok(())
    }

    /// Stamp a reminder: bump the count, note the contact time, move the
    /// status to `reminded`. The token is left alone, so the original link
    /// keeps working.
    pub fn increment_reminder_count(
        &self,
        user_id: &str,
        storyteller_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DbStoryteller, DbError> {
        let current = self
            .get_storyteller(user_id, storyteller_id)?
            .ok_or_else(|| DbError::StorytellerNotFound(storyteller_id.to_string()))?;
        if !current
            .invitation_status
            .can_transition_to(InvitationStatus::Reminded)
        {
            return Err(DbError::InvalidTransition {
                from: current.invitation_status.as_str().to_string(),
                to: InvitationStatus::Reminded.as_str().to_string(),
            });
        }

        let now_iso = now.to_rfc3339();
        self.conn.execute(
            "UPDATE storytellers SET
                reminder_count = reminder_count + 1,
                last_contacted_at = ?3,
                invitation_status = 'reminded',
                updated_at = ?3
             WHERE user_id = ?1 AND id = ?2",
            params![user_id, storyteller_id, now_iso],
        )?;
        self.get_storyteller(user_id, storyteller_id)?
            .ok_or_else(|| DbError::StorytellerNotFound(storyteller_id.to_string()))
    }

    /// Null out tokens whose expiry has passed, skipping submitted rows.
    ///
    /// The invitation status is left as-is: an expired `opened` stays
    /// `opened`, the dead link just stops resolving. Returns how many rows
    /// were swept.
    pub fn clear_expired_tokens(&self, now: DateTime<Utc>) -> Result<usize, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, token_expires_at FROM storytellers
             WHERE invitation_token IS NOT NULL
               AND invitation_status != 'submitted'",
        )?;
        let candidates = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut swept = 0;
        let now_iso = now.to_rfc3339();
        for (id, expires_at) in candidates {
            let expired = match expires_at.as_deref().and_then(parse_rfc3339) {
                Some(expiry) => expiry < now,
                // A token with no (or unreadable) expiry is treated as dead.
                None => true,
            };
            if expired {
                self.conn.execute(
                    "UPDATE storytellers SET
                        invitation_token = NULL,
                        token_expires_at = NULL,
                        updated_at = ?2
                     WHERE id = ?1",
                    params![id, now_iso],
                )?;
                swept += 1;
            }
        }
        Ok(swept)
    }

    // =========================================================================
    // Counts for progress evaluation
    // =========================================================================

    /// Total storytellers on an account's roster.
    pub fn count_storytellers(&self, user_id: &str) -> Result<i64, DbError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM storytellers WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Storytellers added to the roster but never sent an invitation.
    pub fn count_pending_invitations(&self, user_id: &str) -> Result<i64, DbError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM storytellers
             WHERE user_id = ?1 AND invitation_status = 'pending'",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::super::test_utils::test_db;
    use super::*;

    fn seed_account(db: &SareDb, user_id: &str) {
        db.create_profile(user_id, &format!("{user_id}@example.com"), None, None, None)
            .expect("profile");
    }

    #[test]
    fn test_add_storyteller_normalizes_email() {
        let db = test_db();
        seed_account(&db, "u1");

        let teller = db
            .add_storyteller("u1", "  Maya Chen ", "  Maya.Chen@Example.COM ", None, None)
            .expect("add");
        assert_eq!(teller.name, "Maya Chen");
        assert_eq!(teller.email, "maya.chen@example.com");
        assert_eq!(teller.invitation_status, InvitationStatus::Pending);
        assert_eq!(teller.access_method, AccessMethod::Pending);
        assert_eq!(teller.reminder_count, 0);
        assert!(teller.invitation_token.is_none());
    }

    #[test]
    fn test_add_rejects_bad_input() {
        let db = test_db();
        seed_account(&db, "u1");

        let result = db.add_storyteller("u1", "   ", "x@example.com", None, None);
        assert!(matches!(
            result,
            Err(DbError::InvalidField { field: "name", .. })
        ));

        let result = db.add_storyteller("u1", "Maya", "not-an-email", None, None);
        assert!(matches!(
            result,
            Err(DbError::InvalidField { field: "email", .. })
        ));
    }

    #[test]
    fn test_duplicate_email_same_account_rejected() {
        let db = test_db();
        seed_account(&db, "u1");
        seed_account(&db, "u2");

        db.add_storyteller("u1", "Maya", "maya@example.com", None, None)
            .expect("first add");
        let result = db.add_storyteller("u1", "Other Maya", "MAYA@example.com", None, None);
        assert!(matches!(result, Err(DbError::DuplicateStorytellerEmail)));

        // Same email under a different account is fine
        db.add_storyteller("u2", "Maya", "maya@example.com", None, None)
            .expect("cross-account add");
    }

    #[test]
    fn test_issue_token_resets_and_reissues() {
        let db = test_db();
        seed_account(&db, "u1");
        let teller = db
            .add_storyteller("u1", "Maya", "maya@example.com", None, None)
            .expect("add");

        let now = Utc::now();
        let updated = db
            .set_invitation_token("u1", &teller.id, "tok-1", now + Duration::days(7), now)
            .expect("issue");
        assert_eq!(updated.invitation_status, InvitationStatus::Sent);
        assert_eq!(updated.access_method, AccessMethod::MagicLink);
        assert_eq!(updated.invitation_token.as_deref(), Some("tok-1"));
        assert!(updated.invited_at.is_some());

        // Re-issue replaces the token and the old one stops resolving
        let later = now + Duration::days(1);
        db.set_invitation_token("u1", &teller.id, "tok-2", later + Duration::days(7), later)
            .expect("reissue");
        assert!(db.storyteller_by_token("tok-1").expect("query").is_none());
        let found = db
            .storyteller_by_token("tok-2")
            .expect("query")
            .expect("resolves");
        assert_eq!(found.id, teller.id);
    }

    #[test]
    fn test_mark_opened_is_conditional() {
        let db = test_db();
        seed_account(&db, "u1");
        let teller = db
            .add_storyteller("u1", "Maya", "maya@example.com", None, None)
            .expect("add");
        let now = Utc::now();

        // Not sent yet: nothing to mark
        assert!(!db.mark_invitation_opened(&teller.id, now).expect("mark"));

        db.set_invitation_token("u1", &teller.id, "tok", now + Duration::days(7), now)
            .expect("issue");
        assert!(db.mark_invitation_opened(&teller.id, now).expect("mark"));

        let opened = db
            .get_storyteller("u1", &teller.id)
            .expect("get")
            .expect("exists");
        assert_eq!(opened.invitation_status, InvitationStatus::Opened);
        let first_access = opened.first_access_at.clone().expect("stamped");

        // Second open is a no-op and the first-access stamp survives
        assert!(!db.mark_invitation_opened(&teller.id, now).expect("mark"));
        let again = db
            .get_storyteller("u1", &teller.id)
            .expect("get")
            .expect("exists");
        assert_eq!(again.first_access_at.as_deref(), Some(first_access.as_str()));
    }

    #[test]
    fn test_record_access_stamps_once_and_always() {
        let db = test_db();
        seed_account(&db, "u1");
        let teller = db
            .add_storyteller("u1", "Maya", "maya@example.com", None, None)
            .expect("add");

        let first = Utc::now();
        db.record_access(&teller.id, AccessMethod::MagicLink, Some("auth-1"), first)
            .expect("first access");
        let later = first + Duration::hours(3);
        db.record_access(&teller.id, AccessMethod::ReturnUser, Some("auth-2"), later)
            .expect("second access");

        let row = db
            .get_storyteller("u1", &teller.id)
            .expect("get")
            .expect("exists");
        assert_eq!(row.first_access_at.as_deref(), Some(first.to_rfc3339().as_str()));
        assert_eq!(row.last_access_at.as_deref(), Some(later.to_rfc3339().as_str()));
        assert_eq!(row.access_method, AccessMethod::ReturnUser);
        // Auth identity links at most once
        assert_eq!(row.auth_user_id.as_deref(), Some("auth-1"));

        // Unknown id is a silent no-op
        db.record_access("ghost", AccessMethod::DirectAccess, None, later)
            .expect("no-op");
    }

    #[test]
    fn test_reminders_keep_token_and_count() {
        let db = test_db();
        seed_account(&db, "u1");
        let teller = db
            .add_storyteller("u1", "Maya", "maya@example.com", None, None)
            .expect("add");
        let now = Utc::now();

        // Reminding before any invitation is invalid
        let result = db.increment_reminder_count("u1", &teller.id, now);
        assert!(matches!(result, Err(DbError::InvalidTransition { .. })));

        db.set_invitation_token("u1", &teller.id, "tok", now + Duration::days(7), now)
            .expect("issue");
        let reminded = db
            .increment_reminder_count("u1", &teller.id, now)
            .expect("remind");
        assert_eq!(reminded.reminder_count, 1);
        assert_eq!(reminded.invitation_status, InvitationStatus::Reminded);
        assert_eq!(reminded.invitation_token.as_deref(), Some("tok"));

        let reminded = db
            .increment_reminder_count("u1", &teller.id, now)
            .expect("remind again");
        assert_eq!(reminded.reminder_count, 2);
    }

    #[test]
    fn test_clear_expired_tokens_sweep() {
        let db = test_db();
        seed_account(&db, "u1");
        let now = Utc::now();

        let fresh = db
            .add_storyteller("u1", "Fresh", "fresh@example.com", None, None)
            .expect("add");
        db.set_invitation_token("u1", &fresh.id, "tok-fresh", now + Duration::days(7), now)
            .expect("issue");

        let stale = db
            .add_storyteller("u1", "Stale", "stale@example.com", None, None)
            .expect("add");
        db.set_invitation_token("u1", &stale.id, "tok-stale", now - Duration::days(1), now)
            .expect("issue");

        let swept = db.clear_expired_tokens(now).expect("sweep");
        assert_eq!(swept, 1);
        assert!(db.storyteller_by_token("tok-stale").expect("query").is_none());
        assert!(db.storyteller_by_token("tok-fresh").expect("query").is_some());

        let stale_row = db
            .get_storyteller("u1", &stale.id)
            .expect("get")
            .expect("exists");
        assert!(stale_row.invitation_token.is_none());
        assert!(stale_row.token_expires_at.is_none());
        // Status history survives the sweep
        assert_eq!(stale_row.invitation_status, InvitationStatus::Sent);
    }

    #[test]
    fn test_delete_storyteller_removes_dependents() {
        let db = test_db();
        seed_account(&db, "u1");
        let teller = db
            .add_storyteller("u1", "Maya", "maya@example.com", None, None)
            .expect("add");
        db.upsert_draft(&teller.id, Some("half a story"), None, None, None)
            .expect("draft");

        db.delete_storyteller("u1", &teller.id).expect("delete");
        assert!(db
            .get_storyteller("u1", &teller.id)
            .expect("get")
            .is_none());
        assert!(db.get_draft(&teller.id).expect("draft query").is_none());

        // Wrong account can't delete
        let other = db
            .add_storyteller("u1", "Keep", "keep@example.com", None, None)
            .expect("add");
        let result = db.delete_storyteller("u2", &other.id);
        assert!(matches!(result, Err(DbError::StorytellerNotFound(_))));
    }

    #[test]
    fn test_lookup_by_email_reports_submission_state() {
        let db = test_db();
        seed_account(&db, "u1");
        let teller = db
            .add_storyteller("u1", "Maya", "maya@example.com", None, None)
            .expect("add");

        let lookup = db
            .storyteller_by_email("u1", "MAYA@example.com")
            .expect("query")
            .expect("found");
        assert_eq!(lookup.storyteller.id, teller.id);
        assert!(!lookup.has_submitted);
        assert!(!lookup.has_draft);

        db.upsert_draft(&teller.id, Some("draft text"), None, None, None)
            .expect("draft");
        let lookup = db
            .storyteller_by_email("u1", "maya@example.com")
            .expect("query")
            .expect("found");
        assert!(lookup.has_draft);

        assert!(db
            .storyteller_by_email("u1", "nobody@example.com")
            .expect("query")
            .is_none());
    }

    #[test]
    fn test_counts() {
        let db = test_db();
        seed_account(&db, "u1");
        let now = Utc::now();

        let a = db
            .add_storyteller("u1", "A", "a@example.com", None, None)
            .expect("add");
        db.add_storyteller("u1", "B", "b@example.com", None, None)
            .expect("add");
        assert_eq!(db.count_storytellers("u1").expect("count"), 2);
        assert_eq!(db.count_pending_invitations("u1").expect("count"), 2);

        db.set_invitation_token("u1", &a.id, "tok", now + Duration::days(7), now)
            .expect("issue");
        assert_eq!(db.count_pending_invitations("u1").expect("count"), 1);
    }
}
