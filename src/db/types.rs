//! Shared type definitions for the database layer.
//!
//! Every row that crosses the store boundary is parsed into one of these
//! structs, and every enum column is validated on read. Callers above the
//! store never see raw TEXT for status fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("A storyteller with this email address already exists in your list.")]
    DuplicateStorytellerEmail,

    #[error("Storyteller not found: {0}")]
    StorytellerNotFound(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Story already submitted for storyteller {0}")]
    StoryAlreadySubmitted(String),

    #[error("Invalid {column} value in row: {value}")]
    InvalidEnum { column: &'static str, value: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

impl DbError {
    /// True when the underlying SQLite error is a UNIQUE constraint violation.
    pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

// ---------------------------------------------------------------------------
// Enum columns
// ---------------------------------------------------------------------------

/// Where an account is in the collect → reflect → report journey.
///
/// Stored as TEXT. Advances forward only, and only on explicit actor action;
/// no code path regresses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Preparing,
    Collecting,
    Reflecting,
    Completed,
}

impl CollectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionStatus::Preparing => "preparing",
            CollectionStatus::Collecting => "collecting",
            CollectionStatus::Reflecting => "reflecting",
            CollectionStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DbError> {
        match value {
            "preparing" => Ok(CollectionStatus::Preparing),
            "collecting" => Ok(CollectionStatus::Collecting),
            "reflecting" => Ok(CollectionStatus::Reflecting),
            "completed" => Ok(CollectionStatus::Completed),
            _ => Err(DbError::InvalidEnum {
                column: "collection_status",
                value: value.to_string(),
            }),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            CollectionStatus::Preparing => 0,
            CollectionStatus::Collecting => 1,
            CollectionStatus::Reflecting => 2,
            CollectionStatus::Completed => 3,
        }
    }

    /// Forward-only: a transition is legal when it strictly advances.
    /// Skipping a stage is allowed (collecting → completed happens when a
    /// reflection is finished without an explicit begin-reflection step).
    pub fn can_advance_to(&self, next: CollectionStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// Invitation lifecycle for a storyteller.
///
/// `pending → sent → opened ⇄ reminded → submitted`. `submitted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Sent,
    Opened,
    Reminded,
    Submitted,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Sent => "sent",
            InvitationStatus::Opened => "opened",
            InvitationStatus::Reminded => "reminded",
            InvitationStatus::Submitted => "submitted",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DbError> {
        match value {
            "pending" => Ok(InvitationStatus::Pending),
            "sent" => Ok(InvitationStatus::Sent),
            "opened" => Ok(InvitationStatus::Opened),
            "reminded" => Ok(InvitationStatus::Reminded),
            "submitted" => Ok(InvitationStatus::Submitted),
            _ => Err(DbError::InvalidEnum {
                column: "invitation_status",
                value: value.to_string(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvitationStatus::Submitted)
    }

    /// Legal transitions in the lifecycle graph. Token re-issue uses its
    /// own reset rule (any non-terminal state back to `sent`) and does not
    /// consult this table.
    pub fn can_transition_to(&self, next: InvitationStatus) -> bool {
        use InvitationStatus::*;
        match (self, next) {
            (Pending, Sent) => true,
            (Sent, Opened) | (Sent, Reminded) | (Sent, Submitted) => true,
            (Opened, Reminded) | (Opened, Submitted) => true,
            (Reminded, Opened) | (Reminded, Reminded) | (Reminded, Submitted) => true,
            _ => false,
        }
    }
}

/// How a storyteller reached their writing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    Pending,
    MagicLink,
    ReturnUser,
    DirectAccess,
}

impl AccessMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMethod::Pending => "pending",
            AccessMethod::MagicLink => "magic_link",
            AccessMethod::ReturnUser => "return_user",
            AccessMethod::DirectAccess => "direct_access",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DbError> {
        match value {
            "pending" => Ok(AccessMethod::Pending),
            "magic_link" => Ok(AccessMethod::MagicLink),
            "return_user" => Ok(AccessMethod::ReturnUser),
            "direct_access" => Ok(AccessMethod::DirectAccess),
            _ => Err(DbError::InvalidEnum {
                column: "access_method",
                value: value.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A row from the `profiles` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbProfile {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub collection_goal: i64,
    pub collection_status: CollectionStatus,
    pub reflection_completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl DbProfile {
    /// Name shown to invited storytellers: display name, else first+last,
    /// else the neutral fallback the invitation copy uses.
    pub fn inviter_name(&self) -> String {
        if let Some(name) = self.display_name.as_deref() {
            if !name.trim().is_empty() {
                return name.trim().to_string();
            }
        }
        let joined = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let joined = joined.trim();
        if joined.is_empty() {
            "Someone".to_string()
        } else {
            joined.to_string()
        }
    }
}

/// A row from the `storytellers` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStoryteller {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub invitation_token: Option<String>,
    pub token_expires_at: Option<String>,
    pub invitation_status: InvitationStatus,
    pub access_method: AccessMethod,
    pub auth_user_id: Option<String>,
    pub reminder_count: i64,
    pub invited_at: Option<String>,
    pub magic_link_sent_at: Option<String>,
    pub first_access_at: Option<String>,
    pub last_access_at: Option<String>,
    pub last_contacted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A submitted (or drafted) story row from the `stories` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStory {
    pub id: String,
    pub user_id: String,
    pub storyteller_id: String,
    pub story_one: String,
    pub story_two: Option<String>,
    pub story_three: Option<String>,
    pub status: String,
    pub submitted_at: Option<String>,
    pub created_at: String,
}

/// A story joined with its author's name and email, for activity feeds
/// and report assembly.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStoryWithTeller {
    pub id: String,
    pub storyteller_id: String,
    pub storyteller_name: String,
    pub storyteller_email: String,
    pub story_one: String,
    pub story_two: Option<String>,
    pub story_three: Option<String>,
    pub submitted_at: Option<String>,
}

/// A row from the `story_drafts` table. One per storyteller at most.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStoryDraft {
    pub storyteller_id: String,
    pub story_one: Option<String>,
    pub story_two: Option<String>,
    pub story_three: Option<String>,
    pub notes: Option<String>,
    pub auto_saved_at: String,
    pub created_at: String,
}

/// A row from the `self_reflections` table. One per account at most.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSelfReflection {
    pub user_id: String,
    pub strengths_response: Option<String>,
    pub evidence_response: Option<String>,
    pub growth_themes_response: Option<String>,
    pub personal_narrative: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DbSelfReflection {
    /// Complete means all three required answers are non-blank.
    /// The narrative is optional and does not gate completion.
    pub fn is_complete(&self) -> bool {
        let filled = |v: &Option<String>| {
            v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
        };
        filled(&self.strengths_response)
            && filled(&self.evidence_response)
            && filled(&self.growth_themes_response)
    }
}

/// Report generation metadata from the `reports` table.
///
/// Only metadata is cached; the document bytes are recomputed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbReportMeta {
    pub user_id: String,
    pub generated_at: String,
    pub is_locked: bool,
    pub page_count: i64,
    pub story_count: i64,
    pub created_at: String,
}

/// Lookup result for a storyteller found by email, with flags the caller
/// uses to route returning visitors.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorytellerLookup {
    pub storyteller: DbStoryteller,
    pub has_submitted: bool,
    pub has_draft: bool,
}

/// Latest submissions and invitations for the dashboard activity feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub recent_stories: Vec<DbStoryWithTeller>,
    pub recent_invites: Vec<DbStoryteller>,
}

// ---------------------------------------------------------------------------
// Row mappers and time helpers
// ---------------------------------------------------------------------------

/// Row mapper for storyteller SELECTs (19 columns, schema order).
pub(crate) fn map_storyteller_row(row: &rusqlite::Row) -> rusqlite::Result<DbStoryteller> {
    let status_raw: String = row.get(8)?;
    let access_raw: String = row.get(9)?;
    Ok(DbStoryteller {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        notes: row.get(5)?,
        invitation_token: row.get(6)?,
        token_expires_at: row.get(7)?,
        invitation_status: InvitationStatus::parse(&status_raw)
            .map_err(|_| invalid_text_error(8, &status_raw))?,
        access_method: AccessMethod::parse(&access_raw)
            .map_err(|_| invalid_text_error(9, &access_raw))?,
        auth_user_id: row.get(10)?,
        reminder_count: row.get(11)?,
        invited_at: row.get(12)?,
        magic_link_sent_at: row.get(13)?,
        first_access_at: row.get(14)?,
        last_access_at: row.get(15)?,
        last_contacted_at: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

/// Row mapper for profile SELECTs (10 columns, schema order).
pub(crate) fn map_profile_row(row: &rusqlite::Row) -> rusqlite::Result<DbProfile> {
    let status_raw: String = row.get(6)?;
    Ok(DbProfile {
        user_id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        collection_goal: row.get(5)?,
        collection_status: CollectionStatus::parse(&status_raw)
            .map_err(|_| invalid_text_error(6, &status_raw))?,
        reflection_completed: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Surface an enum-validation failure through rusqlite's error type so row
/// mappers can stay `rusqlite::Result`.
fn invalid_text_error(index: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        format!("unrecognized enum value: {value}").into(),
    )
}

/// Parse an RFC 3339 timestamp, tolerating a missing timezone suffix.
pub fn parse_rfc3339(iso: &str) -> Option<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(iso)
        .or_else(|_| {
            chrono::DateTime::parse_from_rfc3339(&format!("{}+00:00", iso.trim_end_matches('Z')))
        })
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
