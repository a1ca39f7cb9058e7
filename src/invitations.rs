//! Invitation tokens and magic links.
//!
//! A storyteller is invited with a single-use-style link carrying an opaque
//! token. The token is the storyteller's entire identity: resolving it finds
//! their row, and nothing else about them is reachable without it. Tokens are
//! random 32-byte values, carry a hard expiry, and re-issuing always replaces
//! the old one. Raw tokens never appear in logs, only short digests.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::SareConfig;
use crate::db::{parse_rfc3339, AccessMethod, DbStoryteller, SareDb};
use crate::error::SareError;
use crate::session::Session;

/// Generate a fresh invitation token: 32 random bytes, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Short digest of a token, safe to write to logs.
pub(crate) fn token_digest(token: &str) -> String {
    let hash = Sha256::digest(token.as_bytes());
    hex::encode(&hash[..4])
}

/// Why a link was sent: the first invitation or a follow-up nudge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationContext {
    StoryRequest,
    StoryReminder,
}

/// Context embedded in a magic link so the landing page can greet the
/// storyteller before any store round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationMetadata {
    /// Always `storyteller`; distinguishes these links from account flows.
    pub role: String,
    pub storyteller_id: String,
    pub storyteller_name: String,
    pub storyteller_email: String,
    pub inviter_name: String,
    pub user_id: String,
    pub invitation_context: InvitationContext,
}

impl InvitationMetadata {
    fn for_storyteller(
        storyteller: &DbStoryteller,
        inviter_name: String,
        user_id: &str,
        context: InvitationContext,
    ) -> Self {
        InvitationMetadata {
            role: "storyteller".to_string(),
            storyteller_id: storyteller.id.clone(),
            storyteller_name: storyteller.name.clone(),
            storyteller_email: storyteller.email.clone(),
            inviter_name,
            user_id: user_id.to_string(),
            invitation_context: context,
        }
    }
}

/// Result of issuing an invitation or a reminder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedInvitation {
    pub storyteller: DbStoryteller,
    pub magic_link: String,
    pub expires_at: String,
}

/// Where a visiting storyteller should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VisitDestination {
    /// Fresh invitation: show the welcome page.
    Welcome,
    /// A draft exists: resume writing.
    Write,
    /// Story already submitted: straight to the thank-you page.
    ThankYou,
}

/// Outcome of a storyteller following their invitation link.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationVisit {
    pub storyteller: DbStoryteller,
    pub first_open: bool,
    pub destination: VisitDestination,
}

/// Issue (or re-issue) an invitation for a storyteller.
///
/// Always mints a fresh token: any previously sent link stops resolving the
/// moment this returns. The invitation moves to `sent` regardless of whether
/// it was pending, opened, or reminded before.
pub fn issue_invitation(
    db: &SareDb,
    session: &Session,
    config: &SareConfig,
    storyteller_id: &str,
    now: DateTime<Utc>,
) -> Result<IssuedInvitation, SareError> {
    let account = session.require_account()?;
    let profile = db
        .get_profile(&account.user_id)?
        .ok_or_else(|| SareError::NotFound(format!("Profile not found: {}", account.user_id)))?;

    let token = generate_token();
    let expires_at = now + Duration::days(config.token_ttl_days);
    let storyteller =
        db.set_invitation_token(&account.user_id, storyteller_id, &token, expires_at, now)?;

    let metadata = InvitationMetadata::for_storyteller(
        &storyteller,
        profile.inviter_name(),
        &account.user_id,
        InvitationContext::StoryRequest,
    );
    let magic_link = magic_link_url(config, &token, &metadata)?;

    log::info!(
        "Invitations: issued token {} for storyteller {} (expires {})",
        token_digest(&token),
        storyteller.id,
        expires_at.to_rfc3339()
    );
    Ok(IssuedInvitation {
        storyteller,
        magic_link: magic_link.to_string(),
        expires_at: expires_at.to_rfc3339(),
    })
}

/// Send a follow-up nudge for an invitation that hasn't produced a story yet.
///
/// Reminders reuse the existing token, so the link in the original email
/// keeps working. The reminder count and last-contacted stamp move, and the
/// status becomes `reminded`.
pub fn send_reminder(
    db: &SareDb,
    session: &Session,
    config: &SareConfig,
    storyteller_id: &str,
    now: DateTime<Utc>,
) -> Result<IssuedInvitation, SareError> {
    let account = session.require_account()?;
    let profile = db
        .get_profile(&account.user_id)?
        .ok_or_else(|| SareError::NotFound(format!("Profile not found: {}", account.user_id)))?;
    let current = db
        .get_storyteller(&account.user_id, storyteller_id)?
        .ok_or_else(|| SareError::NotFound(format!("Storyteller not found: {storyteller_id}")))?;
    let token = current
        .invitation_token
        .clone()
        .ok_or_else(|| SareError::Validation {
            field: "invitation",
            message: "no invitation has been sent yet".to_string(),
        })?;

    let storyteller = db.increment_reminder_count(&account.user_id, storyteller_id, now)?;

    let metadata = InvitationMetadata::for_storyteller(
        &storyteller,
        profile.inviter_name(),
        &account.user_id,
        InvitationContext::StoryReminder,
    );
    let magic_link = magic_link_url(config, &token, &metadata)?;
    let expires_at = storyteller.token_expires_at.clone().unwrap_or_default();

    log::info!(
        "Invitations: reminder #{} for storyteller {} (token {})",
        storyteller.reminder_count,
        storyteller.id,
        token_digest(&token)
    );
    Ok(IssuedInvitation {
        storyteller,
        magic_link: magic_link.to_string(),
        expires_at,
    })
}

/// Resolve a token to its storyteller. Read-only: nothing is stamped.
///
/// Unknown or swept tokens are [`SareError::TokenInvalid`]; a known token
/// past its expiry is [`SareError::TokenExpired`].
pub fn resolve_token(
    db: &SareDb,
    token: &str,
    now: DateTime<Utc>,
) -> Result<DbStoryteller, SareError> {
    let storyteller = db
        .storyteller_by_token(token)?
        .ok_or(SareError::TokenInvalid)?;

    let expires_at = storyteller
        .token_expires_at
        .as_deref()
        .ok_or(SareError::TokenInvalid)?;
    let expiry = parse_rfc3339(expires_at).ok_or(SareError::TokenInvalid)?;
    if expiry < now {
        log::info!(
            "Invitations: token {} expired at {}",
            token_digest(token),
            expires_at
        );
        return Err(SareError::TokenExpired);
    }

    Ok(storyteller)
}

/// A storyteller followed their link. Resolve it, record the visit, and say
/// where they should land.
///
/// The `sent` -> `opened` flip happens at most once, on the first open of a
/// sent invitation. Access stamps are telemetry: if they fail, the visit
/// still succeeds.
pub fn open_invitation(
    db: &SareDb,
    token: &str,
    now: DateTime<Utc>,
) -> Result<InvitationVisit, SareError> {
    let storyteller = resolve_token(db, token, now)?;

    let first_open = db.mark_invitation_opened(&storyteller.id, now)?;
    if let Err(e) = db.record_access(&storyteller.id, AccessMethod::MagicLink, None, now) {
        log::warn!(
            "Invitations: failed to record access for {}: {e}",
            storyteller.id
        );
    }

    let destination = visit_destination(db, &storyteller.id)?;
    // Re-read so the caller sees the stamped row
    let storyteller = db
        .storyteller_by_token(token)?
        .ok_or(SareError::TokenInvalid)?;

    if first_open {
        log::info!(
            "Invitations: first open of token {} by storyteller {}",
            token_digest(token),
            storyteller.id
        );
    }
    Ok(InvitationVisit {
        storyteller,
        first_open,
        destination,
    })
}

/// Where a storyteller should land, given what they've already done.
pub fn visit_destination(
    db: &SareDb,
    storyteller_id: &str,
) -> Result<VisitDestination, SareError> {
    if db.story_for_storyteller(storyteller_id)?.is_some() {
        return Ok(VisitDestination::ThankYou);
    }
    if db.get_draft(storyteller_id)?.is_some() {
        return Ok(VisitDestination::Write);
    }
    Ok(VisitDestination::Welcome)
}

/// Null out expired tokens. Returns how many were swept.
pub fn cleanup_expired_tokens(db: &SareDb, now: DateTime<Utc>) -> Result<usize, SareError> {
    let swept = db.clear_expired_tokens(now)?;
    if swept > 0 {
        log::info!("Invitations: swept {swept} expired token(s)");
    }
    Ok(swept)
}

/// Build the magic link for a token: `{site}/storyteller/welcome` with the
/// token and a base64url context blob in the query string.
pub fn magic_link_url(
    config: &SareConfig,
    token: &str,
    metadata: &InvitationMetadata,
) -> Result<Url, SareError> {
    let base = Url::parse(&config.site_url)
        .map_err(|e| SareError::Config(format!("Invalid siteUrl: {e}")))?;
    let mut url = base
        .join("/storyteller/welcome")
        .map_err(|e| SareError::Config(format!("Invalid siteUrl: {e}")))?;

    let ctx_json = serde_json::to_vec(metadata)
        .map_err(|e| SareError::Config(format!("Failed to encode link context: {e}")))?;
    let ctx = URL_SAFE_NO_PAD.encode(ctx_json);
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("ctx", &ctx);
    Ok(url)
}

/// A magic link taken apart again.
#[derive(Debug, Clone)]
pub struct ParsedLink {
    pub token: String,
    pub metadata: Option<InvitationMetadata>,
}

/// Extract the token (and context, when intact) from a magic link.
///
/// The context blob is best-effort: a missing or garbled `ctx` still yields
/// the token, since the store is the source of truth anyway.
pub fn parse_magic_link(link: &str) -> Result<ParsedLink, SareError> {
    let url = Url::parse(link).map_err(|_| SareError::TokenInvalid)?;

    let mut token = None;
    let mut ctx = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "token" => token = Some(value.into_owned()),
            "ctx" => ctx = Some(value.into_owned()),
            _ => {}
        }
    }
    let token = token.filter(|t| !t.is_empty()).ok_or(SareError::TokenInvalid)?;

    let metadata = ctx.and_then(|raw| {
        let bytes = URL_SAFE_NO_PAD.decode(raw.as_bytes()).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Some(meta),
            Err(e) => {
                log::debug!("Invitations: unreadable link context: {e}");
                None
            }
        }
    });

    Ok(ParsedLink { token, metadata })
}
