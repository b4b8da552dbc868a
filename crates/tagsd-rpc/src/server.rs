//! Line-delimited JSON-RPC server
//!
//! Every outgoing line (responses and notifications) goes through one outbound queue
//! drained by a single writer task, so lines never interleave. `tools/call` requests
//! run on their own tasks: an `add` waiting on its confirmation must not block the
//! `tags_react` call that answers it.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::protocol::{self, Notification, Request, RequestId, Response, RpcError};
use crate::tools::{self, ToolResult};

const SERVER_NAME: &str = "tagsd";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";

#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, name: &str, arguments: Value) -> ToolResult;
}

/// Cloneable handle for pushing lines to the client
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbound {
    /// Queue a notification. Returns false once the writer is gone.
    pub fn notify(&self, method: &str, params: Value) -> bool {
        match protocol::to_line(&Notification::new(method, params)) {
            Ok(line) => self.tx.send(line).is_ok(),
            Err(e) => {
                warn!(method, error = %e, "Failed to encode notification");
                false
            }
        }
    }

    fn respond(&self, response: &Response) {
        match protocol::to_line(response) {
            Ok(line) => {
                debug!("Sending: {}", line);
                if self.tx.send(line).is_err() {
                    warn!("Outbound queue closed, dropping response");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode response"),
        }
    }
}

/// Create the outbound queue ahead of the server, for collaborators that need to
/// emit notifications
pub fn outbound_channel() -> (Outbound, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outbound { tx }, rx)
}

pub struct RpcServer<H: ToolHandler + 'static> {
    handler: Arc<H>,
    outbound: Outbound,
    outbound_rx: mpsc::UnboundedReceiver<String>,
}

impl<H: ToolHandler + 'static> RpcServer<H> {
    pub fn new(handler: H) -> Self {
        let (outbound, outbound_rx) = outbound_channel();
        Self::with_outbound(handler, outbound, outbound_rx)
    }

    pub fn with_outbound(
        handler: H,
        outbound: Outbound,
        outbound_rx: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        RpcServer {
            handler: Arc::new(handler),
            outbound,
            outbound_rx,
        }
    }

    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    /// Serve stdin/stdout until EOF
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting JSON-RPC server on stdio");
        self.run_with(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve any reader/writer pair until the reader hits EOF. In-flight calls are
    /// allowed to finish and everything queued is flushed before returning.
    pub async fn run_with<R, W>(self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let RpcServer {
            handler,
            outbound,
            outbound_rx,
        } = self;

        let (stop_tx, stop_rx) = oneshot::channel();
        let writer_task = tokio::spawn(write_lines(writer, outbound_rx, stop_rx));

        let mut reader = BufReader::new(reader);
        let mut in_flight = JoinSet::new();
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            debug!("Received: {}", text);

            while in_flight.try_join_next().is_some() {}

            let request = match protocol::parse_request_str(text) {
                Ok(request) => request,
                Err(err) => {
                    outbound.respond(&Response::from_error(RequestId::Null, err));
                    continue;
                }
            };

            if request.method == "tools/call" && !request.is_notification() {
                let handler = Arc::clone(&handler);
                let outbound = outbound.clone();
                in_flight.spawn(async move {
                    let params = request.params.unwrap_or(Value::Null);
                    let response = handle_tools_call(handler.as_ref(), request.id, params).await;
                    outbound.respond(&response);
                });
                continue;
            }

            if let Some(response) = handle_request(request) {
                outbound.respond(&response);
            }
        }

        while in_flight.join_next().await.is_some() {}
        let _ = stop_tx.send(());
        writer_task.await??;
        Ok(())
    }
}

async fn write_lines<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<String>,
    mut stop: oneshot::Receiver<()>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => write_line(&mut writer, &line).await?,
                None => break,
            },
            _ = &mut stop => {
                while let Ok(line) = rx.try_recv() {
                    write_line(&mut writer, &line).await?;
                }
                break;
            }
        }
    }
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Everything except `tools/call`. `None` for notifications.
fn handle_request(request: Request) -> Option<Response> {
    let id = request.id.clone();
    let method = request.method.as_str();

    if request.is_notification() {
        debug!(method, "Notification received");
        return None;
    }

    let response = match method {
        "initialize" => {
            info!("JSON-RPC client initialized");
            Response::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION }
                }),
            )
        }
        "tools/list" => Response::success(id, json!({ "tools": tools::all_tools() })),
        "tools/call" => Response::from_error(
            id,
            RpcError::InvalidRequest("tools/call must carry an id".to_string()),
        ),
        "ping" => Response::success(id, json!({})),
        _ => {
            warn!("Unknown method: {}", method);
            Response::from_error(id, RpcError::MethodNotFound(method.to_string()))
        }
    };
    Some(response)
}

async fn handle_tools_call<H: ToolHandler + ?Sized>(
    handler: &H,
    id: RequestId,
    params: Value,
) -> Response {
    let name = match params.get("name").and_then(|v| v.as_str()) {
        Some(n) => n.to_string(),
        None => {
            return Response::from_error(
                id,
                RpcError::InvalidParams("Missing 'name' field".to_string()),
            );
        }
    };

    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or(Value::Object(serde_json::Map::new()));

    if tools::get_tool(&name).is_none() {
        return Response::from_error(id, RpcError::InvalidParams(format!("Unknown tool: {}", name)));
    }

    debug!("Calling tool: {} with args: {:?}", name, arguments);
    let result = handler.call(&name, arguments).await;

    match serde_json::to_value(result) {
        Ok(value) => Response::success(id, value),
        Err(e) => Response::from_error(id, RpcError::InternalError(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::sync::Notify;

    /// `tags_add` parks until a `tags_react` call arrives
    #[derive(Default)]
    struct GateHandler {
        released: Notify,
    }

    #[async_trait::async_trait]
    impl ToolHandler for GateHandler {
        async fn call(&self, name: &str, _arguments: Value) -> ToolResult {
            match name {
                "tags_add" => {
                    self.released.notified().await;
                    ToolResult::text("added")
                }
                "tags_react" => {
                    self.released.notify_one();
                    ToolResult::text("reacted")
                }
                _ => ToolResult::json(&json!({ "tool": name })),
            }
        }
    }

    async fn exchange(input: &str) -> Vec<Value> {
        let server = RpcServer::new(GateHandler::default());
        let (client_out, server_out) = duplex(64 * 1024);
        server
            .run_with(input.as_bytes(), server_out)
            .await
            .unwrap();

        let mut text = String::new();
        let mut client_out = client_out;
        client_out.read_to_string(&mut text).await.unwrap();
        text.lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn call(id: i64, name: &str) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": {} }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#, "\n",
        );
        let responses = exchange(input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "tagsd");
        assert!(responses[1]["result"]["tools"].as_array().unwrap().len() > 5);
    }

    #[tokio::test]
    async fn test_blocked_call_does_not_block_later_calls() {
        let input = format!("{}\n{}\n", call(1, "tags_add"), call(2, "tags_react"));
        let responses = exchange(&input).await;

        assert_eq!(responses.len(), 2);
        // the react answer lands first, then the add it released
        assert_eq!(responses[0]["id"], 2);
        assert_eq!(responses[1]["id"], 1);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "added");
    }

    #[tokio::test]
    async fn test_errors() {
        let input = format!(
            "{}\n{}\n{}\n",
            "not json",
            r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#,
            call(6, "tags_frobnicate"),
        );
        let mut responses = exchange(&input).await;
        responses.sort_by_key(|r| r["id"].as_i64().unwrap_or(0));

        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["error"]["code"], -32601);
        assert_eq!(responses[2]["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_notifications_are_flushed() {
        let server = RpcServer::new(GateHandler::default());
        assert!(server.outbound().notify("notifications/prompt", json!({ "text": "hello" })));

        let (mut client_out, server_out) = duplex(4096);
        server.run_with(&b""[..], server_out).await.unwrap();

        let mut text = String::new();
        client_out.read_to_string(&mut text).await.unwrap();
        let line: Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(line["method"], "notifications/prompt");
        assert_eq!(line["params"]["text"], "hello");
    }
}
