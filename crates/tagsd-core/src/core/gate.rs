//! Mutation Gate - the only path to a writable directory
//!
//! Three independent locks:
//! - table lock: held across every load → mutate → save sequence
//! - create slot: one platform creation at a time, fails fast
//! - clean slot: one reconciliation pass at a time, fails fast
//!
//! The slots bound logical concurrency, the table lock protects the data. Every lock
//! is a guard, released on drop, so no exit path can leak one.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::db::TagsDB;
use crate::error::{Result, TagsError};
use crate::types::Directory;

/// Which exclusivity slot a guard holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Create,
    Clean,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Create => "create",
            SlotKind::Clean => "clean",
        }
    }
}

/// Held for the duration of a create or clean operation
pub struct SlotGuard {
    kind: SlotKind,
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    pub fn kind(&self) -> SlotKind {
        self.kind
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        debug!(slot = self.kind.as_str(), "Slot released");
    }
}

/// Exclusive access to the stored directory
pub struct TableGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    db: &'a TagsDB,
    key: &'a str,
}

impl TableGuard<'_> {
    /// Load the directory; `None` if it was never saved
    pub fn load(&self) -> Result<Option<Directory>> {
        self.db.load_directory(self.key)
    }

    /// Load the directory, failing with `NoTags` if it was never saved
    pub fn load_existing(&self) -> Result<Directory> {
        self.load()?.ok_or(TagsError::NoTags)
    }

    pub fn save(&self, directory: &Directory) -> Result<()> {
        debug_assert!(directory.is_consistent(), "saving an inconsistent directory");
        self.db.save_directory(self.key, directory)
    }
}

pub struct MutationGate {
    db: Arc<TagsDB>,
    key: String,
    table: Mutex<()>,
    create: Arc<Semaphore>,
    clean: Arc<Semaphore>,
}

impl MutationGate {
    pub fn new(db: Arc<TagsDB>, key: impl Into<String>) -> Self {
        Self {
            db,
            key: key.into(),
            table: Mutex::new(()),
            create: Arc::new(Semaphore::new(1)),
            clean: Arc::new(Semaphore::new(1)),
        }
    }

    /// Wait for the table lock
    pub async fn lock_table(&self) -> TableGuard<'_> {
        TableGuard {
            _guard: self.table.lock().await,
            db: &self.db,
            key: &self.key,
        }
    }

    /// Read without the table lock. May be slightly stale relative to a writer in flight.
    pub fn snapshot(&self) -> Result<Option<Directory>> {
        self.db.load_directory(&self.key)
    }

    /// Like `snapshot`, failing with `NoTags` if nothing was ever saved
    pub fn snapshot_existing(&self) -> Result<Directory> {
        self.snapshot()?.ok_or(TagsError::NoTags)
    }

    /// Claim the create slot without waiting
    pub fn try_create(&self) -> Result<SlotGuard> {
        Self::try_slot(&self.create, SlotKind::Create).ok_or(TagsError::AddBusy)
    }

    /// Claim the clean slot without waiting
    pub fn try_clean(&self) -> Result<SlotGuard> {
        Self::try_slot(&self.clean, SlotKind::Clean).ok_or(TagsError::CleanBusy)
    }

    fn try_slot(slot: &Arc<Semaphore>, kind: SlotKind) -> Option<SlotGuard> {
        let permit = Arc::clone(slot).try_acquire_owned().ok()?;
        debug!(slot = kind.as_str(), "Slot acquired");
        Some(SlotGuard {
            kind,
            _permit: permit,
        })
    }

    pub fn create_in_progress(&self) -> bool {
        self.create.available_permits() == 0
    }

    pub fn clean_in_progress(&self) -> bool {
        self.clean.available_permits() == 0
    }
}
