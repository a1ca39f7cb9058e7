//! Configuration loaded from `~/.sare/config.json`.
//!
//! Every field has a serde default, so a missing or partial file always
//! yields a usable config. Timing knobs are clamped into sane ranges on load
//! rather than rejected.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::SareError;

const DEBOUNCE_MS_RANGE: (u64, u64) = (2_000, 10_000);
const STATUS_DISPLAY_MS_RANGE: (u64, u64) = (2_000, 3_000);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SareConfig {
    /// Base URL used when building invitation links.
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Override for the database location. `None` means `~/.sare/sare.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// How long an invitation link stays valid.
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
    #[serde(default)]
    pub autosave: AutosaveConfig,
    /// Cron expression for the expired-token sweep (6-field, seconds first).
    #[serde(default = "default_maintenance_schedule")]
    pub maintenance_schedule: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before a draft save fires.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// How long "Saved" stays visible before reverting to idle.
    #[serde(default = "default_status_display_ms")]
    pub status_display_ms: u64,
}

fn default_site_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_token_ttl_days() -> i64 {
    7
}

fn default_maintenance_schedule() -> String {
    // 03:00 UTC daily
    "0 0 3 * * *".to_string()
}

fn default_debounce_ms() -> u64 {
    10_000
}

fn default_status_display_ms() -> u64 {
    2_500
}

impl Default for SareConfig {
    fn default() -> Self {
        SareConfig {
            site_url: default_site_url(),
            database_path: None,
            token_ttl_days: default_token_ttl_days(),
            autosave: AutosaveConfig::default(),
            maintenance_schedule: default_maintenance_schedule(),
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        AutosaveConfig {
            debounce_ms: default_debounce_ms(),
            status_display_ms: default_status_display_ms(),
        }
    }
}

impl SareConfig {
    /// Clamp timing knobs into their supported ranges.
    pub fn normalized(mut self) -> Self {
        let (lo, hi) = DEBOUNCE_MS_RANGE;
        if self.autosave.debounce_ms < lo || self.autosave.debounce_ms > hi {
            log::warn!(
                "Config: autosave.debounceMs {} out of range, clamping",
                self.autosave.debounce_ms
            );
            self.autosave.debounce_ms = self.autosave.debounce_ms.clamp(lo, hi);
        }
        let (lo, hi) = STATUS_DISPLAY_MS_RANGE;
        if self.autosave.status_display_ms < lo || self.autosave.status_display_ms > hi {
            log::warn!(
                "Config: autosave.statusDisplayMs {} out of range, clamping",
                self.autosave.status_display_ms
            );
            self.autosave.status_display_ms = self.autosave.status_display_ms.clamp(lo, hi);
        }
        if self.token_ttl_days < 1 {
            log::warn!(
                "Config: tokenTtlDays {} out of range, using default",
                self.token_ttl_days
            );
            self.token_ttl_days = default_token_ttl_days();
        }
        self
    }
}

/// Get the canonical config file path (~/.sare/config.json)
pub fn config_path() -> Result<PathBuf, SareError> {
    let home = dirs::home_dir()
        .ok_or_else(|| SareError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(".sare").join("config.json"))
}

/// Get the state directory (~/.sare), creating it if needed
pub fn state_dir() -> Result<PathBuf, SareError> {
    let home = dirs::home_dir()
        .ok_or_else(|| SareError::Config("Could not find home directory".to_string()))?;
    let state_dir = home.join(".sare");

    if !state_dir.exists() {
        fs::create_dir_all(&state_dir)
            .map_err(|e| SareError::Config(format!("Failed to create state dir: {}", e)))?;
    }

    Ok(state_dir)
}

/// Load configuration from ~/.sare/config.json
///
/// A missing file is not an error: first runs get the defaults.
pub fn load_config() -> Result<SareConfig, SareError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(SareConfig::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| SareError::Config(format!("Failed to read config: {}", e)))?;
    let config: SareConfig = serde_json::from_str(&content)
        .map_err(|e| SareError::Config(format!("Failed to parse config: {}", e)))?;

    Ok(config.normalized())
}

/// Write configuration to ~/.sare/config.json
pub fn save_config(config: &SareConfig) -> Result<(), SareError> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| SareError::Config(format!("Failed to create config dir: {}", e)))?;
        }
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| SareError::Config(format!("Failed to serialize config: {}", e)))?;
    fs::write(&path, content)
        .map_err(|e| SareError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_gets_defaults() {
        let config: SareConfig =
            serde_json::from_str(r#"{"siteUrl": "https://sare.example"}"#).expect("parse");
        assert_eq!(config.site_url, "https://sare.example");
        assert_eq!(config.token_ttl_days, 7);
        assert_eq!(config.autosave.debounce_ms, 10_000);
        assert_eq!(config.autosave.status_display_ms, 2_500);
        assert_eq!(config.maintenance_schedule, "0 0 3 * * *");
    }

    #[test]
    fn test_normalized_clamps_timing() {
        let config: SareConfig = serde_json::from_str(
            r#"{"autosave": {"debounceMs": 100, "statusDisplayMs": 60000}, "tokenTtlDays": 0}"#,
        )
        .expect("parse");
        let config = config.normalized();
        assert_eq!(config.autosave.debounce_ms, 2_000);
        assert_eq!(config.autosave.status_display_ms, 3_000);
        assert_eq!(config.token_ttl_days, 7);
    }
}
