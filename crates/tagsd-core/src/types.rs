//! Core types for tagsd
//!
//! The persisted shape is `Directory` → `Platform` → `TagEntry`. Everything else in
//! this module is ephemeral (confirmation sessions, reaction events, listing rows).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============ Directory ============

/// A user's tag on one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEntry {
    pub owner_id: String,
    /// Cached name, advisory only. Always refreshed from the identity resolver before display.
    pub display_name: String,
    pub tag: String,
    /// Back-reference to the owning platform's name
    pub platform: String,
    pub ping_me: bool,
}

impl TagEntry {
    /// New entry, opted in to pings
    pub fn new(owner_id: &str, display_name: &str, platform: &str, tag: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            display_name: display_name.to_string(),
            tag: tag.to_string(),
            platform: platform.to_string(),
            ping_me: true,
        }
    }
}

/// Handle to a role in the chat service, created lazily and never required to exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub id: String,
    pub name: String,
}

/// A named context (game, service) under which users register tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleRef>,
    /// owner id → entry
    #[serde(default)]
    pub users: BTreeMap<String, TagEntry>,
}

impl Platform {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: None,
            users: BTreeMap::new(),
        }
    }
}

/// The whole tag table. Loaded and saved as one value under one storage key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    #[serde(default)]
    pub platforms: BTreeMap<String, Platform>,
}

/// Result of removing a user's tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedTag {
    pub entry: TagEntry,
    /// The platform emptied out and was removed with the tag
    pub platform_removed: bool,
    /// Role left behind by a removed platform, to be deleted best-effort
    pub orphaned_role: Option<RoleRef>,
}

/// One row of a platform listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedTag {
    #[serde(flatten)]
    pub entry: TagEntry,
    /// False when the owner could not be resolved; such rows sort last
    pub resolved: bool,
}

/// Platform name plus tag count, for the platforms overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSummary {
    pub name: String,
    pub tag_count: usize,
}

/// Outcome of a successful add
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedTag {
    pub entry: TagEntry,
    pub created_platform: bool,
}

/// What a reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed_platforms: Vec<String>,
    /// (platform, owner id)
    pub removed_tags: Vec<(String, String)>,
    pub refreshed_names: usize,
    /// Distinct owners looked up; bounded by the number of distinct owners, not entries
    pub resolver_calls: usize,
    #[serde(skip)]
    pub orphaned_roles: Vec<RoleRef>,
}

// ============ Chat events ============

/// A message posted through the chat transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

/// A reaction added to some message by some user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionEvent {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
}

// ============ Confirmation ============

/// Confirmation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Pending,
    Confirmed,
    Denied,
    TimedOut,
}

impl ConfirmationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationOutcome::Pending => "pending",
            ConfirmationOutcome::Confirmed => "confirmed",
            ConfirmationOutcome::Denied => "denied",
            ConfirmationOutcome::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationOutcome::Pending)
    }
}

impl std::fmt::Display for ConfirmationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One platform-creation confirmation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationSession {
    pub prompt: MessageRef,
    pub requester_id: String,
    /// epoch millis
    pub created_at: i64,
    pub outcome: ConfirmationOutcome,
}
