//! Runtime configuration
//!
//! Loaded from a YAML file. Every field has a default, so an absent file or a
//! partial file is fine; a file that does not parse is an error.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Storage key the directory lives under
pub const DEFAULT_STORAGE_KEY: &str = "fulltags";
/// Max tag length in characters
pub const TAG_LIMIT: usize = 64;
/// Max platform name length in characters
pub const PLATFORM_LIMIT: usize = 20;
/// How long a new-platform prompt waits for the requester
pub const CONFIRM_TIMEOUT_SECS: u64 = 7;
/// Longest confirmation window accepted from config
pub const MAX_CONFIRM_TIMEOUT_SECS: u64 = 15 * 60;
/// Longest scheduler tick accepted from config; the hour gate needs at least one tick a day
pub const MAX_CLEAN_TICK_SECS: u64 = 24 * 60 * 60;
/// 02:00 at UTC+11
pub const CLEAN_HOUR_UTC: u32 = 13;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TagsConfig {
    pub storage_key: String,
    pub confirm_timeout_secs: u64,
    /// Hour of day (UTC) the daily cleanup runs at
    pub clean_hour_utc: u32,
    pub clean_tick_secs: u64,
    pub tag_limit: usize,
    pub platform_limit: usize,
    /// Channel new-platform prompts go to when the caller has none
    pub prompt_channel: String,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            confirm_timeout_secs: CONFIRM_TIMEOUT_SECS,
            clean_hour_utc: CLEAN_HOUR_UTC,
            clean_tick_secs: 3600,
            tag_limit: TAG_LIMIT,
            platform_limit: PLATFORM_LIMIT,
            prompt_channel: "general".to_string(),
        }
    }
}

impl TagsConfig {
    /// Load configuration from a YAML file, falling back to defaults if it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = ?path, "No tagsd config found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: TagsConfig = serde_yaml::from_str(&content)?;
        info!(path = ?path, "tagsd config loaded");
        Ok(config.sanitized())
    }

    /// Clamp values that would make the service misbehave
    fn sanitized(mut self) -> Self {
        self.clean_hour_utc %= 24;
        self.confirm_timeout_secs = self.confirm_timeout_secs.min(MAX_CONFIRM_TIMEOUT_SECS);
        self.clean_tick_secs = self.clean_tick_secs.clamp(1, MAX_CLEAN_TICK_SECS);
        self
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs.min(MAX_CONFIRM_TIMEOUT_SECS))
    }

    pub fn clean_tick(&self) -> Duration {
        Duration::from_secs(self.clean_tick_secs.clamp(1, MAX_CLEAN_TICK_SECS))
    }
}
