//! TagService - every operation on the tag directory
//!
//! Writers go through the mutation gate: validate → (slot) → table lock → load →
//! mutate → save. Readers take an unlocked snapshot and never write back, even when
//! they refresh display names for output.
//!
//! Adding to a new platform is split into two critical sections around the
//! confirmation wait so that a seven second prompt does not stall unrelated writers.
//! The create slot is held throughout, and only the create path ever inserts a
//! platform, so the platform cannot appear behind our back while we wait.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cleanup::reconcile;
use super::confirm::ConfirmationWorkflow;
use super::gate::MutationGate;
use super::reactions::ReactionBus;
use crate::collab::{ChatTransport, IdentityResolver};
use crate::config::TagsConfig;
use crate::db::TagsDB;
use crate::directory::{sorted_listing, Limits};
use crate::error::{Result, TagsError};
use crate::types::{
    AddedTag, CleanupReport, ConfirmationOutcome, ListedTag, Platform, PlatformSummary,
    RemovedTag, RoleRef, TagEntry,
};

/// Parameters for `TagService::add_tag`
#[derive(Debug, Clone)]
pub struct AddTagRequest {
    /// Where to post the confirmation prompt; falls back to the configured channel
    pub channel_id: Option<String>,
    pub owner_id: String,
    pub display_name: String,
    pub platform: String,
    pub tag: String,
}

pub struct TagService {
    gate: MutationGate,
    workflow: ConfirmationWorkflow,
    transport: Arc<dyn ChatTransport>,
    resolver: Arc<dyn IdentityResolver>,
    limits: Limits,
    prompt_channel: String,
}

impl TagService {
    pub fn new(
        db: Arc<TagsDB>,
        transport: Arc<dyn ChatTransport>,
        resolver: Arc<dyn IdentityResolver>,
        bus: Arc<ReactionBus>,
        config: &TagsConfig,
    ) -> Self {
        Self {
            gate: MutationGate::new(db, config.storage_key.clone()),
            workflow: ConfirmationWorkflow::new(
                Arc::clone(&transport),
                bus,
                config.confirm_timeout(),
            ),
            transport,
            resolver,
            limits: Limits {
                tag: config.tag_limit,
                platform: config.platform_limit,
            },
            prompt_channel: config.prompt_channel.clone(),
        }
    }

    pub fn gate(&self) -> &MutationGate {
        &self.gate
    }

    // ============ Writers ============

    /// Register or replace the requester's tag on a platform.
    ///
    /// An unknown platform is only created after the requester confirms the prompt;
    /// otherwise `ConfirmationAborted` comes back and nothing is written.
    pub async fn add_tag(&self, req: AddTagRequest) -> Result<AddedTag> {
        self.limits.check_tag(&req.tag)?;
        self.limits.check_platform(&req.platform)?;

        let _slot = self.gate.try_create()?;
        let entry = TagEntry::new(&req.owner_id, &req.display_name, &req.platform, &req.tag);

        {
            let table = self.gate.lock_table().await;
            let mut dir = table.load()?.unwrap_or_default();
            if dir.platforms.contains_key(&req.platform) {
                dir.upsert_tag(entry.clone())?;
                table.save(&dir)?;
                info!(platform = %req.platform, owner_id = %req.owner_id, "Tag updated");
                return Ok(AddedTag {
                    entry,
                    created_platform: false,
                });
            }
        }

        let channel = req
            .channel_id
            .as_deref()
            .unwrap_or(self.prompt_channel.as_str());
        let session = self
            .workflow
            .confirm(channel, &req.owner_id, &req.platform)
            .await?;
        if session.outcome != ConfirmationOutcome::Confirmed {
            info!(platform = %req.platform, outcome = %session.outcome, "Aborting platform creation");
            return Err(TagsError::ConfirmationAborted(session.outcome));
        }

        let table = self.gate.lock_table().await;
        let mut dir = table.load()?.unwrap_or_default();
        let platform = dir
            .platforms
            .entry(req.platform.clone())
            .or_insert_with(|| Platform::new(&req.platform));
        platform.users.insert(entry.owner_id.clone(), entry.clone());
        table.save(&dir)?;
        info!(platform = %req.platform, owner_id = %req.owner_id, "Created platform");

        Ok(AddedTag {
            entry,
            created_platform: true,
        })
    }

    /// Remove the owner's tag from a platform, removing the platform if it empties
    pub async fn remove_tag(&self, platform: &str, owner_id: &str) -> Result<RemovedTag> {
        let removed = {
            let table = self.gate.lock_table().await;
            let mut dir = table.load_existing()?;
            let removed = dir.remove_user(platform, owner_id)?;
            table.save(&dir)?;
            removed
        };

        info!(platform, owner_id, platform_removed = removed.platform_removed, "Tag removed");
        if let Some(role) = &removed.orphaned_role {
            self.delete_role_best_effort(role).await;
        }
        Ok(removed)
    }

    pub async fn set_ping(&self, platform: &str, owner_id: &str, ping_me: bool) -> Result<TagEntry> {
        let table = self.gate.lock_table().await;
        let mut dir = table.load_existing()?;
        let entry = dir.set_ping(platform, owner_id, ping_me)?;
        table.save(&dir)?;
        debug!(platform, owner_id, ping_me, "Ping preference set");
        Ok(entry)
    }

    /// Opt the owner out of pings on every platform. Returns how many tags changed.
    pub async fn silence_all(&self, owner_id: &str) -> Result<usize> {
        let table = self.gate.lock_table().await;
        let mut dir = table.load_existing()?;
        let changed = dir.silence_all(owner_id);
        table.save(&dir)?;
        debug!(owner_id, changed, "Pings silenced");
        Ok(changed)
    }

    /// Moderator removal of a whole platform and everyone's tags on it
    pub async fn force_remove_platform(&self, platform: &str) -> Result<Platform> {
        let removed = {
            let table = self.gate.lock_table().await;
            let mut dir = table.load_existing()?;
            let removed = dir.remove_platform(platform)?;
            table.save(&dir)?;
            removed
        };

        info!(platform, tags = removed.users.len(), "Platform force-removed");
        if let Some(role) = &removed.role {
            self.delete_role_best_effort(role).await;
        }
        Ok(removed)
    }

    /// One reconciliation pass. Fails fast with `CleanBusy` if one is already running.
    pub async fn run_cleanup(&self) -> Result<CleanupReport> {
        let _slot = self.gate.try_clean()?;

        let report = {
            let table = self.gate.lock_table().await;
            let mut dir = table.load_existing()?;
            let report = reconcile(&mut dir, self.resolver.as_ref()).await?;
            table.save(&dir)?;
            report
        };

        info!(
            removed_platforms = report.removed_platforms.len(),
            removed_tags = report.removed_tags.len(),
            resolver_calls = report.resolver_calls,
            "Cleanup pass finished"
        );
        for role in &report.orphaned_roles {
            self.delete_role_best_effort(role).await;
        }
        Ok(report)
    }

    // ============ Readers ============

    pub fn get_tag(&self, platform: &str, owner_id: &str) -> Result<TagEntry> {
        let dir = self.gate.snapshot_existing()?;
        dir.get_tag(platform, owner_id).cloned()
    }

    /// A platform's tags with freshly resolved names. Owners that are unknown or whose
    /// lookup fails are flagged and sorted last; nothing is written back.
    pub async fn list_by_platform(&self, platform: &str) -> Result<Vec<ListedTag>> {
        let entries = self.gate.snapshot_existing()?.list_by_platform(platform)?;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = match self.resolver.resolve(&entry.owner_id).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(
                        platform,
                        owner_id = %entry.owner_id,
                        error = %e,
                        "Name lookup failed, listing cached name"
                    );
                    None
                }
            };
            rows.push((entry, name));
        }
        Ok(sorted_listing(rows))
    }

    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<TagEntry>> {
        let tags = self.gate.snapshot_existing()?.list_by_owner(owner_id);
        if tags.is_empty() {
            return Err(TagsError::NoUserTags);
        }
        Ok(tags)
    }

    pub fn list_platforms(&self) -> Result<Vec<PlatformSummary>> {
        Ok(self.gate.snapshot_existing()?.summaries())
    }

    /// Owner ids on a platform that want pings
    pub fn ping_targets(&self, platform: &str) -> Result<Vec<String>> {
        self.gate.snapshot_existing()?.ping_targets(platform)
    }

    async fn delete_role_best_effort(&self, role: &RoleRef) {
        match self.transport.delete_role(role).await {
            Ok(()) => debug!(role_id = %role.id, "Role deleted"),
            Err(e) => warn!(role_id = %role.id, role = %role.name, error = %e, "Failed to delete role"),
        }
    }
}
