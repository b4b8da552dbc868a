//! JSON-RPC 2.0 control surface for tagsd
//!
//! Line-delimited JSON over stdio. Clients call tools (`tools/list`, `tools/call`);
//! the daemon pushes confirmation prompts back as notifications.
//!
//! ```no_run
//! use tagsd_rpc::{RpcServer, ToolHandler, ToolResult};
//! use serde_json::Value;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ToolHandler for Echo {
//!     async fn call(&self, name: &str, _arguments: Value) -> ToolResult {
//!         ToolResult::text(name)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     RpcServer::new(Echo).run().await
//! }
//! ```

pub mod protocol;
pub mod server;
pub mod tools;

pub use protocol::{Notification, Request, RequestId, Response, RpcError};
pub use server::{outbound_channel, Outbound, RpcServer, ToolHandler};
pub use tools::{all_tools, get_tool, ToolContent, ToolDefinition, ToolResult};
