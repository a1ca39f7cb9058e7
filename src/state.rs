//! Shared application state for an embedding application.
//!
//! There is no ambient current user here: account identity travels in a
//! [`Session`](crate::session::Session) passed per call, and storyteller
//! identity travels in the invitation token. `AppState` only carries the
//! pieces every call site needs anyway.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::autosave::AutosaveRegistry;
use crate::config::{self, SareConfig};
use crate::db::SareDb;
use crate::error::SareError;

/// State shared across the embedding application.
pub struct AppState {
    pub config: Mutex<SareConfig>,
    pub db: Mutex<Option<SareDb>>,
    pub autosaves: AutosaveRegistry,
}

impl AppState {
    /// Load config and open the store, degrading (with a warning) rather
    /// than failing when either is unavailable.
    pub fn new() -> Self {
        let config = match config::load_config() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config: {e}. Using defaults.");
                SareConfig::default()
            }
        };

        let db = match open_store(&config) {
            Ok(db) => Some(db),
            Err(e) => {
                log::warn!("Failed to open database: {e}. Store features disabled.");
                None
            }
        };

        Self {
            config: Mutex::new(config),
            db: Mutex::new(db),
            autosaves: AutosaveRegistry::default(),
        }
    }

    /// Run a closure against the store.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&SareDb) -> Result<T, SareError>,
    ) -> Result<T, SareError> {
        let guard = self
            .db
            .lock()
            .map_err(|_| SareError::Config("State lock poisoned".to_string()))?;
        match guard.as_ref() {
            Some(db) => f(db),
            None => Err(SareError::Config("Database is not available".to_string())),
        }
    }

    /// A snapshot of the current config.
    pub fn config_snapshot(&self) -> SareConfig {
        self.config
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// The store path the current config resolves to.
    pub fn db_path(&self) -> Result<PathBuf, SareError> {
        resolve_db_path(&self.config_snapshot())
    }

    /// Stop every autosave controller, cancelling pending timers.
    pub async fn shutdown(&self) {
        self.autosaves.shutdown_all().await;
        log::info!("State: shut down");
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the store path: explicit override, or the default under `~/.sare`.
pub fn resolve_db_path(config: &SareConfig) -> Result<PathBuf, SareError> {
    match config.database_path.as_deref() {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(SareDb::default_path()?),
    }
}

fn open_store(config: &SareConfig) -> Result<SareDb, SareError> {
    let path = resolve_db_path(config)?;
    Ok(SareDb::open_at(path)?)
}

/// Apply a mutation to the config, persist it, and update in-memory state.
///
/// Out-of-range values are clamped on the way through, so a bad edit never
/// sticks.
pub fn create_or_update_config(
    state: &AppState,
    mutator: impl FnOnce(&mut SareConfig),
) -> Result<SareConfig, SareError> {
    let mut guard = state
        .config
        .lock()
        .map_err(|_| SareError::Config("State lock poisoned".to_string()))?;

    let mut config = guard.clone();
    mutator(&mut config);
    let config = config.normalized();

    config::save_config(&config)?;
    *guard = config.clone();

    Ok(config)
}

/// Reload configuration from disk.
pub fn reload_config(state: &AppState) -> Result<SareConfig, SareError> {
    let config = config::load_config()?;
    let mut guard = state
        .config
        .lock()
        .map_err(|_| SareError::Config("State lock poisoned".to_string()))?;
    *guard = config.clone();
    Ok(config)
}
