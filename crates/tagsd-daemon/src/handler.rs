//! Tool dispatch: JSON arguments in, `TagService` call, JSON result out

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tagsd_core::{
    AddTagRequest, IdentityResolver, ReactionBus, ReactionEvent, TagService, TagsError,
};
use tagsd_rpc::{ToolHandler, ToolResult};
use tracing::debug;

use crate::console::{MemberCache, RosterResolver};

enum CallError {
    InvalidArgs(String),
    UnknownUser(String),
    Tags(TagsError),
}

impl From<TagsError> for CallError {
    fn from(e: TagsError) -> Self {
        CallError::Tags(e)
    }
}

impl From<CallError> for ToolResult {
    fn from(e: CallError) -> Self {
        match e {
            CallError::InvalidArgs(msg) => ToolResult::failure("invalid_args", msg),
            CallError::UnknownUser(name) => {
                ToolResult::failure("not_found", format!("could not find user {}", name))
            }
            CallError::Tags(e) => ToolResult::failure(e.kind(), e.to_string()),
        }
    }
}

type CallResult = std::result::Result<Value, CallError>;

fn args<T: DeserializeOwned>(arguments: Value) -> std::result::Result<T, CallError> {
    serde_json::from_value(arguments).map_err(|e| CallError::InvalidArgs(e.to_string()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddArgs {
    owner_id: String,
    display_name: Option<String>,
    platform: String,
    tag: String,
    channel_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerPlatformArgs {
    owner_id: String,
    platform: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PingMeArgs {
    owner_id: String,
    platform: String,
    ping_me: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerArgs {
    owner_id: String,
}

#[derive(Deserialize)]
struct PlatformArgs {
    platform: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserArgs {
    owner_id: Option<String>,
    username: Option<String>,
}

#[derive(Deserialize)]
struct PingArgs {
    platform: String,
    message: Option<String>,
}

pub struct TagsToolHandler {
    service: Arc<TagService>,
    bus: Arc<ReactionBus>,
    members: Arc<MemberCache>,
    roster: Arc<RosterResolver>,
    resolver: Arc<dyn IdentityResolver>,
}

impl TagsToolHandler {
    pub fn new(
        service: Arc<TagService>,
        bus: Arc<ReactionBus>,
        members: Arc<MemberCache>,
        roster: Arc<RosterResolver>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            service,
            bus,
            members,
            roster,
            resolver,
        }
    }

    async fn dispatch(&self, name: &str, arguments: Value) -> CallResult {
        match name {
            "tags_add" => self.add(args(arguments)?).await,
            "tags_remove" => {
                let a: OwnerPlatformArgs = args(arguments)?;
                let removed = self.service.remove_tag(&a.platform, &a.owner_id).await?;
                Ok(json!({
                    "removed": removed.entry,
                    "platformRemoved": removed.platform_removed,
                }))
            }
            "tags_get" => {
                let a: OwnerPlatformArgs = args(arguments)?;
                Ok(json!(self.service.get_tag(&a.platform, &a.owner_id)?))
            }
            "tags_pingme" => {
                let a: PingMeArgs = args(arguments)?;
                Ok(json!(self.service.set_ping(&a.platform, &a.owner_id, a.ping_me).await?))
            }
            "tags_shutup" => {
                let a: OwnerArgs = args(arguments)?;
                let changed = self.service.silence_all(&a.owner_id).await?;
                Ok(json!({ "silenced": changed }))
            }
            "tags_modremove" => {
                let a: PlatformArgs = args(arguments)?;
                let removed = self.service.force_remove_platform(&a.platform).await?;
                Ok(json!({ "platform": removed.name, "removedTags": removed.users.len() }))
            }
            "tags_clean" => Ok(json!(self.service.run_cleanup().await?)),
            "tags_list" => {
                let a: PlatformArgs = args(arguments)?;
                let tags = self.service.list_by_platform(&a.platform).await?;
                Ok(json!({ "platform": a.platform, "tags": tags }))
            }
            "tags_user" => self.user(args(arguments)?).await,
            "tags_platforms" => Ok(json!({ "platforms": self.service.list_platforms()? })),
            "tags_ping" => {
                let a: PingArgs = args(arguments)?;
                let targets = self.service.ping_targets(&a.platform)?;
                let mentions: Vec<String> = targets.iter().map(|id| format!("<@{}>", id)).collect();
                Ok(json!({
                    "platform": a.platform,
                    "targets": targets,
                    "mentions": mentions,
                    "message": a.message,
                }))
            }
            "tags_react" => {
                let event: ReactionEvent = args(arguments)?;
                let delivered = self.bus.publish(&event);
                Ok(json!({ "delivered": delivered }))
            }
            other => Err(CallError::InvalidArgs(format!("unknown tool {}", other))),
        }
    }

    async fn add(&self, a: AddArgs) -> CallResult {
        let display_name = match a.display_name {
            Some(name) => {
                self.members.remember(&a.owner_id, &name);
                name
            }
            None => self
                .resolver
                .resolve(&a.owner_id)
                .await?
                .unwrap_or_else(|| a.owner_id.clone()),
        };

        let added = self
            .service
            .add_tag(AddTagRequest {
                channel_id: a.channel_id,
                owner_id: a.owner_id,
                display_name,
                platform: a.platform,
                tag: a.tag,
            })
            .await?;
        Ok(json!(added))
    }

    /// By id when given, otherwise by id-or-username
    async fn user(&self, a: UserArgs) -> CallResult {
        let owner_id = match (a.owner_id, a.username) {
            (Some(id), _) => id,
            (None, Some(username)) => {
                let as_id = username.trim();
                if self.resolver.resolve(as_id).await?.is_some() {
                    as_id.to_string()
                } else {
                    match self.roster.find_by_name(&username)? {
                        Some((id, _)) => id,
                        None => return Err(CallError::UnknownUser(username)),
                    }
                }
            }
            (None, None) => {
                return Err(CallError::InvalidArgs(
                    "either ownerId or username is required".to_string(),
                ))
            }
        };

        let tags = self.service.list_by_owner(&owner_id)?;
        Ok(json!({ "ownerId": owner_id, "tags": tags }))
    }
}

#[async_trait::async_trait]
impl ToolHandler for TagsToolHandler {
    async fn call(&self, name: &str, arguments: Value) -> ToolResult {
        debug!(tool = name, "Dispatching tool call");
        match self.dispatch(name, arguments).await {
            Ok(value) => ToolResult::json(&value),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleTransport;
    use std::path::Path;
    use std::time::Duration;
    use tagsd_core::{ChatTransport, TagsConfig, TagsDB, TieredResolver, EMOJI_CONFIRM};
    use tagsd_rpc::outbound_channel;
    use tokio::sync::mpsc;

    struct Fixture {
        handler: Arc<TagsToolHandler>,
        notifications: mpsc::UnboundedReceiver<String>,
        _dir: tempfile::TempDir,
    }

    fn fixture(roster: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let roster_path = dir.path().join("roster.yaml");
        std::fs::write(&roster_path, roster).unwrap();

        let (outbound, notifications) = outbound_channel();
        let transport: Arc<dyn ChatTransport> = Arc::new(ConsoleTransport::new(outbound));
        let members = Arc::new(MemberCache::new(Duration::from_secs(300)));
        let roster = Arc::new(RosterResolver::new(Path::new(&roster_path)));
        let resolver: Arc<dyn IdentityResolver> = Arc::new(TieredResolver::new(
            Arc::clone(&members),
            Arc::clone(&roster),
        ));
        let bus = ReactionBus::new();
        let service = Arc::new(TagService::new(
            Arc::new(TagsDB::in_memory().unwrap()),
            transport,
            Arc::clone(&resolver),
            Arc::clone(&bus),
            &TagsConfig::default(),
        ));

        Fixture {
            handler: Arc::new(TagsToolHandler::new(service, bus, members, roster, resolver)),
            notifications,
            _dir: dir,
        }
    }

    fn body(result: &ToolResult) -> Value {
        serde_json::from_str(result.first_text().unwrap()).unwrap()
    }

    async fn next_notification(rx: &mut mpsc::UnboundedReceiver<String>, method: &str) -> Value {
        loop {
            let line: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            if line["method"] == method {
                return line;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_confirmed_through_react_tool() {
        let mut fx = fixture("members:\n  U1: alice\n");

        let handler = Arc::clone(&fx.handler);
        let pending = tokio::spawn(async move {
            handler
                .call(
                    "tags_add",
                    json!({ "ownerId": "U1", "platform": "Game", "tag": "main#1234" }),
                )
                .await
        });

        let prompt = next_notification(&mut fx.notifications, "notifications/prompt").await;
        let message_id = prompt["params"]["messageId"].as_str().unwrap().to_string();
        // affordances attach after the prompt; wait for both before answering
        next_notification(&mut fx.notifications, "notifications/reaction_added").await;
        next_notification(&mut fx.notifications, "notifications/reaction_added").await;

        let reacted = fx
            .handler
            .call(
                "tags_react",
                json!({ "messageId": message_id, "userId": "U1", "emoji": EMOJI_CONFIRM }),
            )
            .await;
        assert_eq!(body(&reacted)["delivered"], 1);

        let added = pending.await.unwrap();
        assert!(!added.is_error());
        let added = body(&added);
        assert_eq!(added["createdPlatform"], true);
        assert_eq!(added["entry"]["displayName"], "alice");

        let got = fx
            .handler
            .call("tags_get", json!({ "ownerId": "U1", "platform": "Game" }))
            .await;
        assert_eq!(body(&got)["tag"], "main#1234");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_add_reports_aborted() {
        let fx = fixture("members: {}\n");
        let result = fx
            .handler
            .call(
                "tags_add",
                json!({ "ownerId": "U1", "displayName": "alice", "platform": "Game", "tag": "a" }),
            )
            .await;
        assert!(result.is_error());
        assert_eq!(body(&result)["kind"], "aborted");
    }

    #[tokio::test]
    async fn test_errors_carry_kind() {
        let fx = fixture("members: {}\n");

        let result = fx.handler.call("tags_platforms", json!({})).await;
        assert_eq!(body(&result)["kind"], "not_found");

        let result = fx.handler.call("tags_get", json!({ "platform": "Game" })).await;
        assert_eq!(body(&result)["kind"], "invalid_args");

        let result = fx
            .handler
            .call(
                "tags_add",
                json!({ "ownerId": "U1", "displayName": "a", "platform": "Game", "tag": "x".repeat(65) }),
            )
            .await;
        assert_eq!(body(&result)["kind"], "validation");
    }

    #[tokio::test]
    async fn test_user_lookup_by_name() {
        let fx = fixture("members:\n  U1: Alice\n");
        let result = fx.handler.call("tags_user", json!({ "username": "nobody" })).await;
        assert_eq!(body(&result)["kind"], "not_found");

        // known user, empty directory
        let result = fx.handler.call("tags_user", json!({ "username": "alice" })).await;
        assert_eq!(body(&result)["kind"], "not_found");
        assert!(body(&result)["error"].as_str().unwrap().contains("no tags"));
    }
}
