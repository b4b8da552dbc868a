//! Tool definitions
//!
//! One tool per directory operation, plus `tags_react` which feeds reaction events
//! into the daemon so a pending confirmation can be answered.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        ToolResult {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: None,
        }
    }

    pub fn json<T: Serialize>(value: &T) -> Self {
        let text = serde_json::to_string(value)
            .unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string());
        ToolResult::text(text)
    }

    /// Error with a machine-readable category, e.g. `busy` or `not_found`
    pub fn failure(kind: &str, message: impl Into<String>) -> Self {
        ToolResult {
            content: vec![ToolContent::Text {
                text: json!({ "error": message.into(), "kind": kind }).to_string(),
            }],
            is_error: Some(true),
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    /// First text block, if any
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|c| match c {
            ToolContent::Text { text } => text.as_str(),
        })
    }
}

fn owner_platform_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "ownerId": { "type": "string", "description": "User id of the tag owner" },
            "platform": { "type": "string", "description": "Platform name (case-sensitive)" }
        },
        "required": ["ownerId", "platform"]
    })
}

pub fn all_tools() -> Vec<ToolDefinition> {
    vec![
        // ===== Writers =====
        ToolDefinition::new(
            "tags_add",
            "Add or replace your tag on a platform. A new platform needs a ✅ reaction on the prompt within the confirmation window.",
            json!({
                "type": "object",
                "properties": {
                    "ownerId": { "type": "string" },
                    "displayName": { "type": "string", "description": "Current display name, cached with the tag" },
                    "platform": { "type": "string", "description": "At most 20 characters" },
                    "tag": { "type": "string", "description": "At most 64 characters" },
                    "channelId": { "type": "string", "description": "Where to post the confirmation prompt" }
                },
                "required": ["ownerId", "platform", "tag"]
            }),
        ),
        ToolDefinition::new(
            "tags_remove",
            "Remove your tag from a platform. The platform goes away with its last tag.",
            owner_platform_schema(),
        ),
        ToolDefinition::new(
            "tags_pingme",
            "Set whether you want pings for a platform",
            json!({
                "type": "object",
                "properties": {
                    "ownerId": { "type": "string" },
                    "platform": { "type": "string" },
                    "pingMe": { "type": "boolean" }
                },
                "required": ["ownerId", "platform", "pingMe"]
            }),
        ),
        ToolDefinition::new(
            "tags_shutup",
            "Stop pings on every platform you have a tag on",
            json!({
                "type": "object",
                "properties": { "ownerId": { "type": "string" } },
                "required": ["ownerId"]
            }),
        ),
        ToolDefinition::new(
            "tags_modremove",
            "Moderator tool: remove a platform and all of its tags",
            json!({
                "type": "object",
                "properties": { "platform": { "type": "string" } },
                "required": ["platform"]
            }),
        ),
        ToolDefinition::new(
            "tags_clean",
            "Moderator tool: drop tags of users that no longer exist and refresh names",
            json!({ "type": "object", "properties": {} }),
        ),
        // ===== Readers =====
        ToolDefinition::new("tags_get", "Get your tag for a platform", owner_platform_schema()),
        ToolDefinition::new(
            "tags_list",
            "List all tags on a platform, sorted by display name",
            json!({
                "type": "object",
                "properties": { "platform": { "type": "string" } },
                "required": ["platform"]
            }),
        ),
        ToolDefinition::new(
            "tags_user",
            "List all tags of a user, by id or by case-insensitive username",
            json!({
                "type": "object",
                "properties": {
                    "ownerId": { "type": "string" },
                    "username": { "type": "string" }
                }
            }),
        ),
        ToolDefinition::new(
            "tags_platforms",
            "List all platforms with their tag counts",
            json!({ "type": "object", "properties": {} }),
        ),
        ToolDefinition::new(
            "tags_ping",
            "Users on a platform that want pings, with an optional message",
            json!({
                "type": "object",
                "properties": {
                    "platform": { "type": "string" },
                    "message": { "type": "string" }
                },
                "required": ["platform"]
            }),
        ),
        // ===== Events =====
        ToolDefinition::new(
            "tags_react",
            "Deliver a reaction event, e.g. ✅ or ❌ on a confirmation prompt",
            json!({
                "type": "object",
                "properties": {
                    "messageId": { "type": "string" },
                    "userId": { "type": "string" },
                    "emoji": { "type": "string" }
                },
                "required": ["messageId", "userId", "emoji"]
            }),
        ),
    ]
}

pub fn get_tool(name: &str) -> Option<ToolDefinition> {
    all_tools().into_iter().find(|t| t.name == name)
}
