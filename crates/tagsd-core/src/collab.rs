//! Collaborator contracts: the chat transport and the identity resolver
//!
//! The core never talks to a chat service directly. Everything it needs from one is
//! behind these two traits.

use crate::error::Result;
use crate::types::{MessageRef, RoleRef};
use tracing::debug;

/// Outbound side of the chat service
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a message and return a reference to it
    async fn send_prompt(&self, channel_id: &str, text: &str) -> Result<MessageRef>;

    /// Attach a reaction to a message
    async fn add_reaction(&self, message: &MessageRef, emoji: &str) -> Result<()>;

    /// Remove every reaction from a message. Callers treat this as best-effort.
    async fn remove_all_reactions(&self, message: &MessageRef) -> Result<()>;

    /// Delete a role. Callers treat this as best-effort.
    async fn delete_role(&self, role: &RoleRef) -> Result<()>;
}

/// Looks up a user's current display name.
///
/// `Ok(None)` means the user definitively no longer exists (left the server, etc.).
/// `Err` means the lookup itself failed and says nothing about the user.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, owner_id: &str) -> Result<Option<String>>;
}

/// Two-tier lookup: a fast local tier first, then the authoritative one.
///
/// Only a local hit short-circuits. A local miss or local error falls through.
pub struct TieredResolver<L, A> {
    local: L,
    authoritative: A,
}

impl<L, A> TieredResolver<L, A>
where
    L: IdentityResolver,
    A: IdentityResolver,
{
    pub fn new(local: L, authoritative: A) -> Self {
        Self {
            local,
            authoritative,
        }
    }
}

#[async_trait::async_trait]
impl<L, A> IdentityResolver for TieredResolver<L, A>
where
    L: IdentityResolver,
    A: IdentityResolver,
{
    async fn resolve(&self, owner_id: &str) -> Result<Option<String>> {
        match self.local.resolve(owner_id).await {
            Ok(Some(name)) => return Ok(Some(name)),
            Ok(None) => {}
            Err(e) => debug!(owner_id, error = %e, "Local identity tier failed, falling through"),
        }
        self.authoritative.resolve(owner_id).await
    }
}

#[async_trait::async_trait]
impl<T: IdentityResolver + ?Sized> IdentityResolver for std::sync::Arc<T> {
    async fn resolve(&self, owner_id: &str) -> Result<Option<String>> {
        (**self).resolve(owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TagsError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MapResolver {
        names: HashMap<String, String>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl MapResolver {
        fn new(names: &[(&str, &str)], fail: bool) -> Self {
            Self {
                names: names
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl IdentityResolver for MapResolver {
        async fn resolve(&self, owner_id: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TagsError::Identity("unavailable".into()));
            }
            Ok(self.names.get(owner_id).cloned())
        }
    }

    #[tokio::test]
    async fn test_local_hit_short_circuits() {
        let resolver = TieredResolver::new(
            MapResolver::new(&[("u1", "cached")], false),
            MapResolver::new(&[("u1", "fresh")], false),
        );
        assert_eq!(resolver.resolve("u1").await.unwrap().as_deref(), Some("cached"));
        assert_eq!(resolver.authoritative.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_local_miss_and_error_fall_through() {
        let resolver = TieredResolver::new(
            MapResolver::new(&[], false),
            MapResolver::new(&[("u1", "fresh")], false),
        );
        assert_eq!(resolver.resolve("u1").await.unwrap().as_deref(), Some("fresh"));
        assert_eq!(resolver.resolve("u2").await.unwrap(), None);

        let resolver = TieredResolver::new(
            MapResolver::new(&[], true),
            MapResolver::new(&[("u1", "fresh")], false),
        );
        assert_eq!(resolver.resolve("u1").await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_authoritative_error_propagates() {
        let resolver = TieredResolver::new(
            MapResolver::new(&[], false),
            MapResolver::new(&[], true),
        );
        assert!(matches!(
            resolver.resolve("u1").await,
            Err(TagsError::Identity(_))
        ));
    }
}
