//! Confirmation Workflow - human approval before a new platform is created
//!
//! Flow: send_prompt() → subscribe to reactions on that prompt by the requester →
//! attach ✅/❌ → race the verdict oneshot against the deadline → deregister →
//! clear the reactions in the background.
//!
//! The listener resolves the oneshot at most once, so whichever of confirm, deny or
//! timeout lands first is the outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::reactions::{ReactionBus, ReactionFilter};
use crate::collab::ChatTransport;
use crate::error::Result;
use crate::types::{ConfirmationOutcome, ConfirmationSession, MessageRef};

/// ✅
pub const EMOJI_CONFIRM: &str = "\u{2705}";
/// ❌
pub const EMOJI_DENY: &str = "\u{274C}";

pub struct ConfirmationWorkflow {
    transport: Arc<dyn ChatTransport>,
    bus: Arc<ReactionBus>,
    timeout: Duration,
}

impl ConfirmationWorkflow {
    pub fn new(transport: Arc<dyn ChatTransport>, bus: Arc<ReactionBus>, timeout: Duration) -> Self {
        Self {
            transport,
            bus,
            timeout,
        }
    }

    /// Ask `requester_id` to confirm creating `platform` and wait for the answer.
    ///
    /// Returns the finished session; only `Err` for transport failures while setting
    /// the prompt up. Denied and timed-out are normal outcomes, not errors.
    pub async fn confirm(
        &self,
        channel_id: &str,
        requester_id: &str,
        platform: &str,
    ) -> Result<ConfirmationSession> {
        let text = format!(
            "Creating new platform **{}**.\n__Please check if a similar one exists.__\n\
             Confirm adding in {} seconds.",
            platform,
            self.timeout.as_secs()
        );
        let prompt = self.transport.send_prompt(channel_id, &text).await?;

        let mut session = ConfirmationSession {
            prompt: prompt.clone(),
            requester_id: requester_id.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
            outcome: ConfirmationOutcome::Pending,
        };

        let (verdict_tx, verdict_rx) = oneshot::channel();
        let mut verdict_tx = Some(verdict_tx);
        let mut subscription = self.bus.subscribe(
            ReactionFilter {
                message_id: prompt.message_id.clone(),
                user_id: requester_id.to_string(),
            },
            move |event| {
                let verdict = match event.emoji.as_str() {
                    EMOJI_CONFIRM => ConfirmationOutcome::Confirmed,
                    EMOJI_DENY => ConfirmationOutcome::Denied,
                    _ => return,
                };
                if let Some(tx) = verdict_tx.take() {
                    let _ = tx.send(verdict);
                }
            },
        );
        let deadline = Instant::now() + self.timeout;
        info!(
            platform,
            requester_id,
            message_id = %prompt.message_id,
            "Awaiting platform confirmation"
        );

        if let Err(e) = self.attach_affordances(&prompt).await {
            subscription.unsubscribe();
            self.spawn_reaction_cleanup(prompt);
            return Err(e);
        }

        let outcome = match timeout_at(deadline, verdict_rx).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(_)) => {
                warn!(platform, "Confirmation listener dropped before answering");
                ConfirmationOutcome::TimedOut
            }
            Err(_) => ConfirmationOutcome::TimedOut,
        };

        subscription.unsubscribe();
        session.outcome = outcome;
        info!(platform, requester_id, outcome = %outcome, "Platform confirmation finished");

        self.spawn_reaction_cleanup(prompt);
        Ok(session)
    }

    async fn attach_affordances(&self, prompt: &MessageRef) -> Result<()> {
        self.transport.add_reaction(prompt, EMOJI_CONFIRM).await?;
        self.transport.add_reaction(prompt, EMOJI_DENY).await?;
        Ok(())
    }

    /// Clear the prompt's reactions without holding up the caller
    fn spawn_reaction_cleanup(&self, prompt: MessageRef) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            match transport.remove_all_reactions(&prompt).await {
                Ok(()) => debug!(message_id = %prompt.message_id, "Prompt reactions cleared"),
                Err(e) => {
                    warn!(message_id = %prompt.message_id, error = %e, "Failed to clear prompt reactions")
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TagsError;
    use crate::testing::{wait_for_listener, FakeTransport};
    use crate::types::ReactionEvent;
    use std::sync::atomic::Ordering;

    fn workflow(transport: &Arc<FakeTransport>, bus: &Arc<ReactionBus>) -> Arc<ConfirmationWorkflow> {
        Arc::new(ConfirmationWorkflow::new(
            Arc::clone(transport) as Arc<dyn ChatTransport>,
            Arc::clone(bus),
            Duration::from_secs(7),
        ))
    }

    fn react(bus: &ReactionBus, prompt: &MessageRef, user_id: &str, emoji: &str) -> usize {
        bus.publish(&ReactionEvent {
            message_id: prompt.message_id.clone(),
            user_id: user_id.to_string(),
            emoji: emoji.to_string(),
        })
    }

    fn spawn_confirm(
        wf: &Arc<ConfirmationWorkflow>,
        requester: &str,
    ) -> tokio::task::JoinHandle<Result<ConfirmationSession>> {
        let wf = Arc::clone(wf);
        let requester = requester.to_string();
        tokio::spawn(async move { wf.confirm("general", &requester, "Game").await })
    }

    #[tokio::test(start_paused = true)]
    async fn test_affirm_confirms() {
        let transport = Arc::new(FakeTransport::default());
        let bus = ReactionBus::new();
        let wf = workflow(&transport, &bus);

        let handle = spawn_confirm(&wf, "u1");
        wait_for_listener(&bus).await;
        let prompt = transport.last_prompt().unwrap();
        assert_eq!(react(&bus, &prompt, "u1", EMOJI_CONFIRM), 1);

        let session = handle.await.unwrap().unwrap();
        assert_eq!(session.outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(session.requester_id, "u1");
        assert_eq!(session.prompt, prompt);
        assert_eq!(bus.listener_count(), 0);

        let reactions = transport.reactions_on(&prompt.message_id);
        assert_eq!(reactions, vec![EMOJI_CONFIRM.to_string(), EMOJI_DENY.to_string()]);

        transport.wait_for_cleared(1).await;
        assert_eq!(transport.cleared(), vec![prompt.message_id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deny_denies() {
        let transport = Arc::new(FakeTransport::default());
        let bus = ReactionBus::new();
        let wf = workflow(&transport, &bus);

        let handle = spawn_confirm(&wf, "u1");
        wait_for_listener(&bus).await;
        let prompt = transport.last_prompt().unwrap();
        react(&bus, &prompt, "u1", EMOJI_DENY);

        let session = handle.await.unwrap().unwrap();
        assert_eq!(session.outcome, ConfirmationOutcome::Denied);
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_window() {
        let transport = Arc::new(FakeTransport::default());
        let bus = ReactionBus::new();
        let wf = workflow(&transport, &bus);

        let start = Instant::now();
        let session = wf.confirm("general", "u1", "Game").await.unwrap();

        assert_eq!(session.outcome, ConfirmationOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_secs(7));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_other_users_messages_and_emoji() {
        let transport = Arc::new(FakeTransport::default());
        let bus = ReactionBus::new();
        let wf = workflow(&transport, &bus);

        let handle = spawn_confirm(&wf, "u1");
        wait_for_listener(&bus).await;
        let prompt = transport.last_prompt().unwrap();

        // someone else answering, a reaction on another message, an unrelated emoji
        assert_eq!(react(&bus, &prompt, "u2", EMOJI_CONFIRM), 0);
        let other = MessageRef {
            channel_id: prompt.channel_id.clone(),
            message_id: "other".to_string(),
        };
        assert_eq!(react(&bus, &other, "u1", EMOJI_CONFIRM), 0);
        react(&bus, &prompt, "u1", "\u{1F44D}");
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        react(&bus, &prompt, "u1", EMOJI_DENY);
        let session = handle.await.unwrap().unwrap();
        assert_eq!(session.outcome, ConfirmationOutcome::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_verdict_wins() {
        let transport = Arc::new(FakeTransport::default());
        let bus = ReactionBus::new();
        let wf = workflow(&transport, &bus);

        let handle = spawn_confirm(&wf, "u1");
        wait_for_listener(&bus).await;
        let prompt = transport.last_prompt().unwrap();
        react(&bus, &prompt, "u1", EMOJI_DENY);
        react(&bus, &prompt, "u1", EMOJI_CONFIRM);

        let session = handle.await.unwrap().unwrap();
        assert_eq!(session.outcome, ConfirmationOutcome::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_affordance_failure_tears_down_listener() {
        let transport = Arc::new(FakeTransport::default());
        transport.fail_reactions.store(true, Ordering::SeqCst);
        let bus = ReactionBus::new();
        let wf = workflow(&transport, &bus);

        let err = wf.confirm("general", "u1", "Game").await.unwrap_err();
        assert!(matches!(err, TagsError::Transport(_)));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_failure_is_swallowed() {
        let transport = Arc::new(FakeTransport::default());
        transport.fail_cleanup.store(true, Ordering::SeqCst);
        let bus = ReactionBus::new();
        let wf = workflow(&transport, &bus);

        let handle = spawn_confirm(&wf, "u1");
        wait_for_listener(&bus).await;
        let prompt = transport.last_prompt().unwrap();
        react(&bus, &prompt, "u1", EMOJI_CONFIRM);

        let session = handle.await.unwrap().unwrap();
        assert_eq!(session.outcome, ConfirmationOutcome::Confirmed);
    }
}
