//! tagsd core library
//!
//! A shared tag directory: users register a per-platform tag, look up others' tags,
//! opt in or out of pings, and a daily pass prunes owners that no longer exist.
//! New platforms are only created after the requester confirms a prompt by reaction.

pub mod collab;
pub mod config;
pub mod core;
pub mod db;
pub mod directory;
pub mod error;
pub mod types;

#[cfg(test)]
mod testing;

pub use collab::{ChatTransport, IdentityResolver, TieredResolver};
pub use config::TagsConfig;
pub use self::core::{
    AddTagRequest, CleanupScheduler, ConfirmationWorkflow, MutationGate, ReactionBus,
    SchedulerHandle, Subscription, TagService, EMOJI_CONFIRM, EMOJI_DENY,
};
pub use db::TagsDB;
pub use directory::Limits;
pub use error::{Result, TagsError};
pub use types::*;
