//! # SARE
//!
//! See Yourself at Your Best: collect stories from people who know you
//! well, reflect on them, and render a personal strengths report.
//!
//! The crate is the whole engine, backed by SQLite: storyteller roster and
//! magic-link invitations, draft autosave, story submission, self-reflection,
//! progress gating, and the PDF renderer. Account identity is passed per call
//! as a [`session::Session`]; storytellers are identified by their invitation
//! token alone. An embedding application wires [`state::AppState`] and the
//! [`maintenance`] loop around it.

pub mod autosave;
pub mod config;
pub mod db;
mod error;
pub mod invitations;
pub mod maintenance;
mod migrations;
pub mod progress;
pub mod report;
pub mod session;
pub mod state;

pub use error::{ApiError, ErrorType, SareError};

/// Initialize env_logger for binaries and tests that want it.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
