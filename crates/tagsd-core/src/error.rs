//! Error taxonomy for the tag directory

use crate::types::ConfirmationOutcome;

/// Errors returned by directory operations.
///
/// Callers (command handlers) turn these into user-facing text.
#[derive(Debug, thiserror::Error)]
pub enum TagsError {
    // validation
    #[error("tag cannot be empty")]
    EmptyTag,

    #[error("platform cannot be empty")]
    EmptyPlatform,

    #[error("your tag is too long, keep it under {limit} characters")]
    TagTooLong { limit: usize },

    #[error("your platform is too long, keep it under {limit} characters")]
    PlatformTooLong { limit: usize },

    // not found
    #[error("no tags found in database, add a tag to start it")]
    NoTags,

    #[error("no platform of that name")]
    NoPlatform,

    #[error("you don't have a tag on this platform")]
    NoUser,

    #[error("no tags found for that user")]
    NoUserTags,

    // busy
    #[error("please do not try to add anything while a new platform is awaiting confirmation")]
    AddBusy,

    #[error("already cleaning, please be patient")]
    CleanBusy,

    #[error("platform creation aborted ({0})")]
    ConfirmationAborted(ConfirmationOutcome),

    // collaborators
    #[error("chat transport error: {0}")]
    Transport(String),

    #[error("identity lookup failed: {0}")]
    Identity(String),

    // storage / config
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TagsError {
    /// Stable machine-readable kind, used by the RPC surface
    pub fn kind(&self) -> &'static str {
        match self {
            TagsError::EmptyTag
            | TagsError::EmptyPlatform
            | TagsError::TagTooLong { .. }
            | TagsError::PlatformTooLong { .. } => "validation",
            TagsError::NoTags | TagsError::NoPlatform | TagsError::NoUser | TagsError::NoUserTags => {
                "not_found"
            }
            TagsError::AddBusy | TagsError::CleanBusy => "busy",
            TagsError::ConfirmationAborted(_) => "aborted",
            TagsError::Transport(_) | TagsError::Identity(_) => "collaborator",
            TagsError::Storage(_) | TagsError::Codec(_) | TagsError::Config(_) | TagsError::Io(_) => {
                "internal"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TagsError>;
