//! Runtime core: locking, reactions, confirmation, cleanup and the service that ties
//! them together.

mod cleanup;
mod confirm;
mod gate;
mod reactions;
mod service;

pub use cleanup::{reconcile, CleanupScheduler, Clock, SchedulerHandle, SystemClock};
pub use confirm::{ConfirmationWorkflow, EMOJI_CONFIRM, EMOJI_DENY};
pub use gate::{MutationGate, SlotGuard, SlotKind, TableGuard};
pub use reactions::{ReactionBus, ReactionFilter, Subscription};
pub use service::{AddTagRequest, TagService};
