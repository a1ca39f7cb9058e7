//! Collection progress: how far along an account is and what to do next.
//!
//! The evaluation itself is a pure function over counts and flags, so the
//! rules are testable without a store. `evaluate_for_account` gathers the
//! real numbers and never substitutes defaults: if a count can't be read,
//! the whole evaluation fails rather than quietly reporting zero.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{CollectionStatus, DbProfile, DbSelfReflection, SareDb};
use crate::error::SareError;
use crate::session::Session;

/// What the account holder should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NextStep {
    LearnPrepare,
    InviteStorytellers,
    SendInvitations,
    FollowUp,
    CompleteReflection,
    ViewReport,
}

impl NextStep {
    /// The dashboard label for this step.
    pub fn description(&self) -> &'static str {
        match self {
            NextStep::LearnPrepare => "Learn how SARE works and set your goal",
            NextStep::InviteStorytellers => "Add people who have seen you at your best",
            NextStep::SendInvitations => "Send your invitations",
            NextStep::FollowUp => "Follow up with storytellers who haven't written yet",
            NextStep::CompleteReflection => "Complete your self-reflection",
            NextStep::ViewReport => "View your strengths report",
        }
    }
}

/// Raw inputs for a progress evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ProgressInputs {
    pub collection_status: CollectionStatus,
    pub collection_goal: i64,
    pub reflection_completed: bool,
    pub story_count: i64,
    pub storyteller_count: i64,
    pub pending_invitations: i64,
}

/// Evaluated progress for an account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub collection_status: CollectionStatus,
    pub collection_goal: i64,
    pub reflection_completed: bool,
    pub story_count: i64,
    pub storyteller_count: i64,
    pub pending_invitations: i64,
    pub goal_met: bool,
    pub can_start_reflection: bool,
    pub can_view_report: bool,
    pub next_step: NextStep,
}

/// Evaluate progress from raw counts. Pure.
///
/// The report gate is deliberately looser than the reflection gate: starting
/// the reflection needs the full goal, but once the reflection is done a
/// single story is enough to view the report.
pub fn evaluate(inputs: ProgressInputs) -> Progress {
    let goal_met = inputs.story_count >= inputs.collection_goal;
    let can_start_reflection =
        goal_met && inputs.collection_status == CollectionStatus::Collecting;
    let can_view_report = inputs.reflection_completed && inputs.story_count >= 1;

    let next_step = if inputs.collection_status == CollectionStatus::Preparing {
        NextStep::LearnPrepare
    } else if inputs.storyteller_count == 0 {
        NextStep::InviteStorytellers
    } else if inputs.pending_invitations > 0 {
        NextStep::SendInvitations
    } else if inputs.story_count < inputs.collection_goal {
        NextStep::FollowUp
    } else if !inputs.reflection_completed {
        NextStep::CompleteReflection
    } else {
        NextStep::ViewReport
    };

    Progress {
        collection_status: inputs.collection_status,
        collection_goal: inputs.collection_goal,
        reflection_completed: inputs.reflection_completed,
        story_count: inputs.story_count,
        storyteller_count: inputs.storyteller_count,
        pending_invitations: inputs.pending_invitations,
        goal_met,
        can_start_reflection,
        can_view_report,
        next_step,
    }
}

/// Evaluate progress for the signed-in account from live counts.
pub fn evaluate_for_account(db: &SareDb, session: &Session) -> Result<Progress, SareError> {
    let account = session.require_account()?;
    let profile = db
        .get_profile(&account.user_id)?
        .ok_or_else(|| SareError::NotFound(format!("Profile not found: {}", account.user_id)))?;

    let story_count = db.count_submitted_stories(&account.user_id)?;
    let storyteller_count = db.count_storytellers(&account.user_id)?;
    let pending_invitations = db.count_pending_invitations(&account.user_id)?;

    Ok(evaluate(ProgressInputs {
        collection_status: profile.collection_status,
        collection_goal: profile.collection_goal,
        reflection_completed: profile.reflection_completed,
        story_count,
        storyteller_count,
        pending_invitations,
    }))
}

/// Done preparing: move the account from `preparing` to `collecting`.
pub fn finish_preparation(db: &SareDb, session: &Session) -> Result<DbProfile, SareError> {
    let account = session.require_account()?;
    let profile = db.advance_collection_status(&account.user_id, CollectionStatus::Collecting)?;
    Ok(profile)
}

/// Start the self-reflection. Only valid once the collection goal is met.
pub fn begin_reflection(db: &SareDb, session: &Session) -> Result<DbProfile, SareError> {
    let progress = evaluate_for_account(db, session)?;
    if !progress.can_start_reflection {
        return Err(SareError::InvalidTransition {
            from: progress.collection_status.as_str().to_string(),
            to: CollectionStatus::Reflecting.as_str().to_string(),
        });
    }
    let account = session.require_account()?;
    let profile = db.advance_collection_status(&account.user_id, CollectionStatus::Reflecting)?;
    Ok(profile)
}

/// Save the reflection responses for the signed-in account.
pub fn save_reflection(
    db: &SareDb,
    session: &Session,
    strengths: Option<&str>,
    evidence: Option<&str>,
    growth_themes: Option<&str>,
    narrative: Option<&str>,
) -> Result<DbSelfReflection, SareError> {
    let account = session.require_account()?;
    let reflection =
        db.upsert_reflection(&account.user_id, strengths, evidence, growth_themes, narrative)?;
    Ok(reflection)
}

/// Finish the reflection: stamps completion and moves the account to
/// `completed` in one store transaction.
pub fn complete_reflection(
    db: &SareDb,
    session: &Session,
    now: DateTime<Utc>,
) -> Result<DbSelfReflection, SareError> {
    let account = session.require_account()?;
    let reflection = db.complete_reflection(&account.user_id, now)?;
    Ok(reflection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;

    fn inputs() -> ProgressInputs {
        ProgressInputs {
            collection_status: CollectionStatus::Collecting,
            collection_goal: 10,
            reflection_completed: false,
            story_count: 0,
            storyteller_count: 0,
            pending_invitations: 0,
        }
    }

    #[test]
    fn test_next_step_chain() {
        let p = evaluate(ProgressInputs {
            collection_status: CollectionStatus::Preparing,
            ..inputs()
        });
        assert_eq!(p.next_step, NextStep::LearnPrepare);

        let p = evaluate(inputs());
        assert_eq!(p.next_step, NextStep::InviteStorytellers);

        let p = evaluate(ProgressInputs {
            storyteller_count: 3,
            pending_invitations: 2,
            ..inputs()
        });
        assert_eq!(p.next_step, NextStep::SendInvitations);

        let p = evaluate(ProgressInputs {
            storyteller_count: 3,
            story_count: 4,
            ..inputs()
        });
        assert_eq!(p.next_step, NextStep::FollowUp);

        let p = evaluate(ProgressInputs {
            storyteller_count: 10,
            story_count: 10,
            ..inputs()
        });
        assert_eq!(p.next_step, NextStep::CompleteReflection);

        let p = evaluate(ProgressInputs {
            storyteller_count: 10,
            story_count: 10,
            reflection_completed: true,
            ..inputs()
        });
        assert_eq!(p.next_step, NextStep::ViewReport);
    }

    #[test]
    fn test_reflection_gate_needs_goal_and_collecting() {
        let p = evaluate(ProgressInputs {
            story_count: 10,
            storyteller_count: 10,
            ..inputs()
        });
        assert!(p.goal_met);
        assert!(p.can_start_reflection);

        // Goal met but still preparing: not yet
        let p = evaluate(ProgressInputs {
            collection_status: CollectionStatus::Preparing,
            story_count: 10,
            storyteller_count: 10,
            ..inputs()
        });
        assert!(!p.can_start_reflection);

        // One short of the goal
        let p = evaluate(ProgressInputs {
            story_count: 9,
            storyteller_count: 10,
            ..inputs()
        });
        assert!(!p.goal_met);
        assert!(!p.can_start_reflection);
    }

    #[test]
    fn test_report_gate_is_looser_than_reflection_gate() {
        // Reflection done with a single story: report is viewable even though
        // the goal was never met.
        let p = evaluate(ProgressInputs {
            collection_status: CollectionStatus::Completed,
            story_count: 1,
            storyteller_count: 1,
            reflection_completed: true,
            ..inputs()
        });
        assert!(!p.goal_met);
        assert!(p.can_view_report);

        // Reflection done but zero stories: nothing to report on
        let p = evaluate(ProgressInputs {
            collection_status: CollectionStatus::Completed,
            reflection_completed: true,
            ..inputs()
        });
        assert!(!p.can_view_report);
    }

    #[test]
    fn test_evaluate_for_account_uses_live_counts() {
        let db = test_db();
        db.create_profile("u1", "me@example.com", None, None, None)
            .expect("profile");
        db.update_profile("u1", None, None, None, Some(2))
            .expect("set goal");
        let session = Session::account("u1", "me@example.com");

        let p = evaluate_for_account(&db, &session).expect("evaluate");
        assert_eq!(p.next_step, NextStep::LearnPrepare);
        assert_eq!(p.collection_goal, 2);

        finish_preparation(&db, &session).expect("finish prep");
        let teller = db
            .add_storyteller("u1", "Maya", "maya@example.com", None, None)
            .expect("add");
        let p = evaluate_for_account(&db, &session).expect("evaluate");
        assert_eq!(p.next_step, NextStep::SendInvitations);
        assert_eq!(p.pending_invitations, 1);

        let now = Utc::now();
        db.set_invitation_token("u1", &teller.id, "tok", now + chrono::Duration::days(7), now)
            .expect("issue");
        db.submit_story(&teller.id, "one story", None, None, now)
            .expect("submit");
        let p = evaluate_for_account(&db, &session).expect("evaluate");
        assert_eq!(p.story_count, 1);
        assert_eq!(p.next_step, NextStep::FollowUp);

        let missing = evaluate_for_account(&db, &Session::account("ghost", "g@example.com"));
        assert!(matches!(missing, Err(SareError::NotFound(_))));
    }

    #[test]
    fn test_begin_reflection_gated() {
        let db = test_db();
        db.create_profile("u1", "me@example.com", None, None, None)
            .expect("profile");
        db.update_profile("u1", None, None, None, Some(1))
            .expect("set goal");
        let session = Session::account("u1", "me@example.com");

        // Still preparing
        let result = begin_reflection(&db, &session);
        assert!(matches!(result, Err(SareError::InvalidTransition { .. })));

        finish_preparation(&db, &session).expect("finish prep");
        let result = begin_reflection(&db, &session);
        assert!(matches!(result, Err(SareError::InvalidTransition { .. })));

        let teller = db
            .add_storyteller("u1", "Maya", "maya@example.com", None, None)
            .expect("add");
        let now = Utc::now();
        db.set_invitation_token("u1", &teller.id, "tok", now + chrono::Duration::days(7), now)
            .expect("issue");
        db.submit_story(&teller.id, "the story", None, None, now)
            .expect("submit");

        let profile = begin_reflection(&db, &session).expect("begin");
        assert_eq!(profile.collection_status, CollectionStatus::Reflecting);
    }

    #[test]
    fn test_complete_reflection_wrapper() {
        let db = test_db();
        db.create_profile("u1", "me@example.com", None, None, None)
            .expect("profile");
        let session = Session::account("u1", "me@example.com");

        save_reflection(
            &db,
            &session,
            Some("steady hands"),
            Some("the launch week"),
            Some("listening"),
            None,
        )
        .expect("save");
        let reflection = complete_reflection(&db, &session, Utc::now()).expect("complete");
        assert!(reflection.completed_at.is_some());

        let p = evaluate_for_account(&db, &session).expect("evaluate");
        assert!(p.reflection_completed);
        assert_eq!(p.collection_status, CollectionStatus::Completed);
    }
}
