//! Directory Store - pure data operations on the tag table
//!
//! No I/O happens here. Invariant maintained by every mutation: a platform with no
//! users is removed, never kept.

use std::cmp::Ordering;

use crate::config::{PLATFORM_LIMIT, TAG_LIMIT};
use crate::error::{Result, TagsError};
use crate::types::{Directory, ListedTag, Platform, PlatformSummary, RemovedTag, TagEntry};

/// Length limits checked before any mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub tag: usize,
    pub platform: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            tag: TAG_LIMIT,
            platform: PLATFORM_LIMIT,
        }
    }
}

impl Limits {
    pub fn check_tag(&self, tag: &str) -> Result<()> {
        if tag.trim().is_empty() {
            return Err(TagsError::EmptyTag);
        }
        if tag.chars().count() > self.tag {
            return Err(TagsError::TagTooLong { limit: self.tag });
        }
        Ok(())
    }

    pub fn check_platform(&self, platform: &str) -> Result<()> {
        if platform.trim().is_empty() {
            return Err(TagsError::EmptyPlatform);
        }
        if platform.chars().count() > self.platform {
            return Err(TagsError::PlatformTooLong {
                limit: self.platform,
            });
        }
        Ok(())
    }
}

impl Directory {
    /// Get a platform by its exact (case-sensitive) name
    pub fn get(&self, platform: &str) -> Result<&Platform> {
        self.platforms.get(platform).ok_or(TagsError::NoPlatform)
    }

    /// Insert or replace a platform wholesale
    pub fn put(&mut self, platform: Platform) {
        self.platforms.insert(platform.name.clone(), platform);
    }

    /// A user's tag on one platform
    pub fn get_tag(&self, platform: &str, owner_id: &str) -> Result<&TagEntry> {
        self.get(platform)?
            .users
            .get(owner_id)
            .ok_or(TagsError::NoUser)
    }

    /// Insert or replace a tag on an existing platform
    pub fn upsert_tag(&mut self, entry: TagEntry) -> Result<()> {
        let platform = self
            .platforms
            .get_mut(&entry.platform)
            .ok_or(TagsError::NoPlatform)?;
        platform.users.insert(entry.owner_id.clone(), entry);
        Ok(())
    }

    /// Remove a user's tag, removing the platform with it if it ends up empty
    pub fn remove_user(&mut self, platform: &str, owner_id: &str) -> Result<RemovedTag> {
        let plat = self
            .platforms
            .get_mut(platform)
            .ok_or(TagsError::NoPlatform)?;
        let entry = plat.users.remove(owner_id).ok_or(TagsError::NoUser)?;

        if !plat.users.is_empty() {
            return Ok(RemovedTag {
                entry,
                platform_removed: false,
                orphaned_role: None,
            });
        }

        let removed = self.platforms.remove(platform);
        Ok(RemovedTag {
            entry,
            platform_removed: true,
            orphaned_role: removed.and_then(|p| p.role),
        })
    }

    /// Remove a whole platform, regardless of its users
    pub fn remove_platform(&mut self, platform: &str) -> Result<Platform> {
        self.platforms.remove(platform).ok_or(TagsError::NoPlatform)
    }

    /// Set the ping preference for one user on one platform
    pub fn set_ping(&mut self, platform: &str, owner_id: &str, ping_me: bool) -> Result<TagEntry> {
        let entry = self
            .platforms
            .get_mut(platform)
            .ok_or(TagsError::NoPlatform)?
            .users
            .get_mut(owner_id)
            .ok_or(TagsError::NoUser)?;
        entry.ping_me = ping_me;
        Ok(entry.clone())
    }

    /// Opt a user out of pings everywhere. Returns how many tags changed.
    pub fn silence_all(&mut self, owner_id: &str) -> usize {
        let mut changed = 0;
        for platform in self.platforms.values_mut() {
            if let Some(entry) = platform.users.get_mut(owner_id) {
                if entry.ping_me {
                    entry.ping_me = false;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Every tag a user has, ordered by platform name
    pub fn list_by_owner(&self, owner_id: &str) -> Vec<TagEntry> {
        // BTreeMap iteration is already name-ordered
        self.platforms
            .values()
            .filter_map(|p| p.users.get(owner_id).cloned())
            .collect()
    }

    /// Raw entries of a platform, in owner-id order
    pub fn list_by_platform(&self, platform: &str) -> Result<Vec<TagEntry>> {
        Ok(self.get(platform)?.users.values().cloned().collect())
    }

    /// Owners on a platform that want pings
    pub fn ping_targets(&self, platform: &str) -> Result<Vec<String>> {
        Ok(self
            .get(platform)?
            .users
            .values()
            .filter(|e| e.ping_me)
            .map(|e| e.owner_id.clone())
            .collect())
    }

    /// Platforms with tag counts, sorted case-insensitively by name
    pub fn summaries(&self) -> Vec<PlatformSummary> {
        let mut out: Vec<PlatformSummary> = self
            .platforms
            .values()
            .map(|p| PlatformSummary {
                name: p.name.clone(),
                tag_count: p.users.len(),
            })
            .collect();
        out.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        out
    }

    /// Check the structural invariants: no empty platforms, every entry points back at
    /// the platform and owner key it is stored under.
    pub fn is_consistent(&self) -> bool {
        self.platforms.iter().all(|(name, platform)| {
            !platform.users.is_empty()
                && platform.name == *name
                && platform
                    .users
                    .iter()
                    .all(|(owner, entry)| entry.owner_id == *owner && entry.platform == *name)
        })
    }
}

/// Build a listing from entries paired with their freshly resolved names.
///
/// Resolved rows take the new display name and sort by it (case-sensitive); rows
/// whose owner could not be resolved keep their cached name, are flagged, and go last.
pub fn sorted_listing(rows: Vec<(TagEntry, Option<String>)>) -> Vec<ListedTag> {
    let mut listing: Vec<ListedTag> = rows
        .into_iter()
        .map(|(mut entry, resolved_name)| match resolved_name {
            Some(name) => {
                entry.display_name = name;
                ListedTag {
                    entry,
                    resolved: true,
                }
            }
            None => ListedTag {
                entry,
                resolved: false,
            },
        })
        .collect();

    listing.sort_by(|a, b| match (a.resolved, b.resolved) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => a
            .entry
            .display_name
            .cmp(&b.entry.display_name)
            .then_with(|| a.entry.owner_id.cmp(&b.entry.owner_id)),
        (false, false) => a.entry.owner_id.cmp(&b.entry.owner_id),
    });
    listing
}
