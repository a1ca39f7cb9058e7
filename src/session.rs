//! Caller identity, passed explicitly into every operation that needs one.
//!
//! There is no ambient "current user". Account operations take a [`Session`]
//! and fail with [`SareError::NotAuthenticated`] unless it carries a signed-in
//! account. Storytellers never get a session at all; their invitation token
//! is their whole identity.

use serde::Serialize;

use crate::error::SareError;

/// A signed-in account holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSession {
    pub user_id: String,
    pub email: String,
}

/// Who is making this call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    /// A signed-in account owner (the person collecting stories).
    Account(AccountSession),
    /// Nobody. Token-bearing storyteller flows run under this.
    Anonymous,
}

impl Session {
    pub fn account(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Session::Account(AccountSession {
            user_id: user_id.into(),
            email: email.into(),
        })
    }

    /// The signed-in account, or [`SareError::NotAuthenticated`].
    pub fn require_account(&self) -> Result<&AccountSession, SareError> {
        match self {
            Session::Account(account) => Ok(account),
            Session::Anonymous => Err(SareError::NotAuthenticated),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Account(_))
    }
}
