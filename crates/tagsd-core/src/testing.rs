//! In-memory collaborators for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::collab::{ChatTransport, IdentityResolver};
use crate::core::ReactionBus;
use crate::error::{Result, TagsError};
use crate::types::{MessageRef, RoleRef};

/// Yield until someone is listening on the bus
pub async fn wait_for_listener(bus: &ReactionBus) {
    for _ in 0..10_000 {
        if bus.listener_count() > 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("no reaction listener registered");
}

#[derive(Default)]
pub struct FakeTransport {
    prompts: Mutex<Vec<(MessageRef, String)>>,
    reactions: Mutex<Vec<(String, String)>>,
    cleared: Mutex<Vec<String>>,
    deleted_roles: Mutex<Vec<String>>,
    next_id: AtomicU64,
    pub fail_reactions: AtomicBool,
    pub fail_cleanup: AtomicBool,
    pub fail_role_delete: AtomicBool,
}

impl FakeTransport {
    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<MessageRef> {
        self.prompts.lock().unwrap().last().map(|(m, _)| m.clone())
    }

    pub fn last_prompt_text(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().map(|(_, t)| t.clone())
    }

    pub fn reactions_on(&self, message_id: &str) -> Vec<String> {
        self.reactions
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == message_id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }

    pub fn deleted_roles(&self) -> Vec<String> {
        self.deleted_roles.lock().unwrap().clone()
    }

    /// Yield until `n` background reaction cleanups have been attempted
    pub async fn wait_for_cleared(&self, n: usize) {
        for _ in 0..10_000 {
            if self.cleared.lock().unwrap().len() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("reaction cleanup never ran");
    }
}

#[async_trait::async_trait]
impl ChatTransport for FakeTransport {
    async fn send_prompt(&self, channel_id: &str, text: &str) -> Result<MessageRef> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = MessageRef {
            channel_id: channel_id.to_string(),
            message_id: format!("msg-{}", id),
        };
        self.prompts
            .lock()
            .unwrap()
            .push((message.clone(), text.to_string()));
        Ok(message)
    }

    async fn add_reaction(&self, message: &MessageRef, emoji: &str) -> Result<()> {
        if self.fail_reactions.load(Ordering::SeqCst) {
            return Err(TagsError::Transport("missing permissions".into()));
        }
        self.reactions
            .lock()
            .unwrap()
            .push((message.message_id.clone(), emoji.to_string()));
        Ok(())
    }

    async fn remove_all_reactions(&self, message: &MessageRef) -> Result<()> {
        self.cleared.lock().unwrap().push(message.message_id.clone());
        if self.fail_cleanup.load(Ordering::SeqCst) {
            return Err(TagsError::Transport("message deleted".into()));
        }
        Ok(())
    }

    async fn delete_role(&self, role: &RoleRef) -> Result<()> {
        self.deleted_roles.lock().unwrap().push(role.id.clone());
        if self.fail_role_delete.load(Ordering::SeqCst) {
            return Err(TagsError::Transport("unknown role".into()));
        }
        Ok(())
    }
}

/// Resolver backed by a mutable map. Ids in `failing` return a lookup error.
#[derive(Default)]
pub struct FakeResolver {
    names: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn with(names: &[(&str, &str)]) -> Self {
        let resolver = Self::default();
        for (id, name) in names {
            resolver.set(id, name);
        }
        resolver
    }

    pub fn set(&self, owner_id: &str, name: &str) {
        self.names
            .lock()
            .unwrap()
            .insert(owner_id.to_string(), name.to_string());
    }

    pub fn fail(&self, owner_id: &str) {
        self.failing.lock().unwrap().insert(owner_id.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IdentityResolver for FakeResolver {
    async fn resolve(&self, owner_id: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(owner_id) {
            return Err(TagsError::Identity(format!("gateway timeout for {}", owner_id)));
        }
        Ok(self.names.lock().unwrap().get(owner_id).cloned())
    }
}
