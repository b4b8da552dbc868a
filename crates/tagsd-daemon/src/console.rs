//! Console collaborators: a chat transport that speaks JSON-RPC notifications, and a
//! two-tier identity lookup (recently seen members, then the roster file).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use serde_json::json;
use tagsd_core::{ChatTransport, IdentityResolver, MessageRef, Result, RoleRef, TagsError};
use tagsd_rpc::Outbound;
use tokio::time::Instant;
use tracing::{debug, info};

/// Prompts, reactions and role deletions become notifications to the client
pub struct ConsoleTransport {
    outbound: Outbound,
}

impl ConsoleTransport {
    pub fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }

    fn emit(&self, method: &str, params: serde_json::Value) -> Result<()> {
        if self.outbound.notify(method, params) {
            Ok(())
        } else {
            Err(TagsError::Transport("client disconnected".to_string()))
        }
    }
}

#[async_trait::async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send_prompt(&self, channel_id: &str, text: &str) -> Result<MessageRef> {
        let message = MessageRef {
            channel_id: channel_id.to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
        };
        self.emit(
            "notifications/prompt",
            json!({
                "channelId": message.channel_id,
                "messageId": message.message_id,
                "text": text,
            }),
        )?;
        Ok(message)
    }

    async fn add_reaction(&self, message: &MessageRef, emoji: &str) -> Result<()> {
        self.emit(
            "notifications/reaction_added",
            json!({ "messageId": message.message_id, "emoji": emoji }),
        )
    }

    async fn remove_all_reactions(&self, message: &MessageRef) -> Result<()> {
        self.emit(
            "notifications/reactions_cleared",
            json!({ "messageId": message.message_id }),
        )
    }

    async fn delete_role(&self, role: &RoleRef) -> Result<()> {
        self.emit(
            "notifications/role_deleted",
            json!({ "roleId": role.id, "name": role.name }),
        )
    }
}

/// Names of recently active members. Entries expire so that members who leave are
/// eventually looked up in the roster again.
pub struct MemberCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemberCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn remember(&self, owner_id: &str, name: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(owner_id.to_string(), (name.to_string(), Instant::now()));
    }

    fn lookup(&self, owner_id: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(owner_id)
            .filter(|(_, seen)| seen.elapsed() < self.ttl)
            .map(|(name, _)| name.clone())
    }
}

#[async_trait::async_trait]
impl IdentityResolver for MemberCache {
    async fn resolve(&self, owner_id: &str) -> Result<Option<String>> {
        Ok(self.lookup(owner_id))
    }
}

#[derive(Debug, Default, Deserialize)]
struct RosterFile {
    /// user id → username
    #[serde(default)]
    members: HashMap<String, String>,
}

struct Roster {
    modified: Option<SystemTime>,
    members: HashMap<String, String>,
}

/// Authoritative member list, read from a YAML file and re-read when it changes.
///
/// A missing or unreadable roster is a lookup failure, never "member gone".
pub struct RosterResolver {
    path: PathBuf,
    roster: RwLock<Option<Roster>>,
}

impl RosterResolver {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            roster: RwLock::new(None),
        }
    }

    fn refresh(&self) -> Result<()> {
        let metadata = fs::metadata(&self.path).map_err(|e| {
            TagsError::Identity(format!("roster {}: {}", self.path.display(), e))
        })?;
        let modified = metadata.modified().ok();

        {
            let roster = self.roster.read().unwrap_or_else(|e| e.into_inner());
            if let Some(current) = roster.as_ref() {
                if modified.is_some() && current.modified == modified {
                    return Ok(());
                }
            }
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            TagsError::Identity(format!("roster {}: {}", self.path.display(), e))
        })?;
        let file: RosterFile = serde_yaml::from_str(&content)
            .map_err(|e| TagsError::Identity(format!("roster parse error: {}", e)))?;
        info!(path = ?self.path, members = file.members.len(), "Roster loaded");

        *self.roster.write().unwrap_or_else(|e| e.into_inner()) = Some(Roster {
            modified,
            members: file.members,
        });
        Ok(())
    }

    fn with_roster<T>(&self, f: impl FnOnce(&Roster) -> T) -> Result<T> {
        self.refresh()?;
        let roster = self.roster.read().unwrap_or_else(|e| e.into_inner());
        roster
            .as_ref()
            .map(f)
            .ok_or_else(|| TagsError::Identity("roster not loaded".to_string()))
    }

    /// Find a member by username, ignoring case. Returns (id, username).
    pub fn find_by_name(&self, username: &str) -> Result<Option<(String, String)>> {
        let wanted = username.trim().to_lowercase();
        self.with_roster(|roster| {
            roster
                .members
                .iter()
                .find(|(_, name)| name.to_lowercase() == wanted)
                .map(|(id, name)| (id.clone(), name.clone()))
        })
    }
}

#[async_trait::async_trait]
impl IdentityResolver for RosterResolver {
    async fn resolve(&self, owner_id: &str) -> Result<Option<String>> {
        let name = self.with_roster(|roster| roster.members.get(owner_id).cloned())?;
        debug!(owner_id, found = name.is_some(), "Roster lookup");
        Ok(name)
    }
}
