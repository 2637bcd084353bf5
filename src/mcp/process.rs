//! Stdio transport: newline-delimited JSON-RPC 2.0 with a child process.

use super::{McpError, McpToolDef, ToolResult, ToolServer, ToolServerConfig};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";
/// How long a server gets to exit on its own after stdin closes.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type Responder = oneshot::Sender<Result<Value, McpError>>;
type Pending = Arc<Mutex<HashMap<String, Responder>>>;
type Writer = Arc<AsyncMutex<Option<BufWriter<ChildStdin>>>>;

/// A running MCP server subprocess.
///
/// The child is spawned with `kill_on_drop`, so dropping the last handle
/// kills it even when [`ToolServer::close`] was never awaited.
pub struct McpProcess {
    name: String,
    child: Mutex<Option<Child>>,
    writer: Writer,
    pending: Pending,
    /// Cleared by the reader task once the server's stdout closes.
    alive: Arc<AtomicBool>,
    id_counter: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl McpProcess {
    /// Spawn the server and complete the MCP handshake.
    pub async fn spawn(name: String, config: ToolServerConfig) -> Result<Self, McpError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        if let Some(env) = config.env {
            cmd.envs(env);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::SpawnFailed(format!("{}: {e}", config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture server stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture server stdout".into()))?;

        let process = Self {
            name,
            child: Mutex::new(Some(child)),
            writer: Arc::new(AsyncMutex::new(Some(BufWriter::new(stdin)))),
            pending: Arc::new(Mutex::new(HashMap::new())),
            alive: Arc::new(AtomicBool::new(true)),
            id_counter: AtomicU64::new(1),
        };

        tokio::spawn(reader_loop(
            process.name.clone(),
            stdout,
            Arc::clone(&process.pending),
            Arc::clone(&process.writer),
            Arc::clone(&process.alive),
        ));

        if let Err(e) = process.initialize().await {
            let _ = process.close().await;
            return Err(e);
        }

        debug!(server = %process.name, "MCP server ready");
        Ok(process)
    }

    async fn initialize(&self) -> Result<(), McpError> {
        self.request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
        .await?;

        self.notify("notifications/initialized", json!({})).await
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = format!("req-{}", self.id_counter.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), tx);
        // The reader drains pending requests when the server goes away;
        // anything inserted after that drain would never be answered.
        if !self.alive.load(Ordering::SeqCst) {
            lock(&self.pending).remove(&id);
            return Err(McpError::Disconnected);
        }

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        if let Err(e) = write_message(&self.writer, &payload).await {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(response)) => Ok(response.get("result").cloned().unwrap_or(Value::Null)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(McpError::Disconnected),
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        write_message(&self.writer, &payload).await
    }
}

#[async_trait]
impl ToolServer for McpProcess {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| McpError::Protocol("tools/list result has no tools".into()))?;

        serde_json::from_value(tools).map_err(|e| McpError::Protocol(e.to_string()))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, McpError> {
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        let response = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;

        Ok(parse_tool_result(&response))
    }

    async fn close(&self) -> Result<(), McpError> {
        // Closing stdin first lets well-behaved servers exit on their own.
        self.writer.lock().await.take();

        let child = lock(&self.child).take();
        if let Some(mut child) = child {
            match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!(server = %self.name, %status, "MCP server exited"),
                _ => {
                    if let Err(e) = child.kill().await {
                        debug!(server = %self.name, "MCP server already exited: {e}");
                    }
                    debug!(server = %self.name, "MCP server killed");
                }
            }
        }

        fail_all_pending(&self.pending);
        Ok(())
    }

    fn abort(&self) {
        if let Some(mut child) = lock(&self.child).take()
            && let Err(e) = child.start_kill()
        {
            debug!(server = %self.name, "MCP server already exited: {e}");
        }
        fail_all_pending(&self.pending);
    }
}

/// Flatten MCP tool content (an array of `{type: "text", text}` items) to text.
fn parse_tool_result(response: &Value) -> ToolResult {
    let is_error = response
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let content = match response.get("content") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    ToolResult { content, is_error }
}

async fn write_message(writer: &Writer, message: &Value) -> Result<(), McpError> {
    let mut encoded =
        serde_json::to_string(message).map_err(|e| McpError::Protocol(e.to_string()))?;
    encoded.push('\n');

    let mut guard = writer.lock().await;
    let stream = guard.as_mut().ok_or(McpError::Disconnected)?;
    stream
        .write_all(encoded.as_bytes())
        .await
        .map_err(|_| McpError::Disconnected)?;
    stream.flush().await.map_err(|_| McpError::Disconnected)
}

async fn reader_loop(
    name: String,
    stdout: ChildStdout,
    pending: Pending,
    writer: Writer,
    alive: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(server = %name, "MCP server stdout read failed: {e}");
                break;
            }
        }
        // Servers may print banners in any encoding; only JSON lines matter.
        let raw = String::from_utf8_lossy(&buf);
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let message: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                debug!(server = %name, line, "Skipping non-JSON line from MCP server: {e}");
                continue;
            }
        };

        match (message.get("id").cloned(), message.get("method").and_then(Value::as_str)) {
            (Some(id), Some(method)) => {
                if let Err(e) = answer_server_request(&writer, id, method).await {
                    warn!(server = %name, method, "Failed to answer MCP server request: {e}");
                }
            }
            (Some(id), None) => deliver_response(&name, &pending, &id, message),
            (None, Some(method)) => debug!(server = %name, method, "MCP notification"),
            (None, None) => {}
        }
    }

    debug!(server = %name, "MCP server stdout closed");
    alive.store(false, Ordering::SeqCst);
    fail_all_pending(&pending);
}

fn deliver_response(name: &str, pending: &Pending, id: &Value, message: Value) {
    let key = match id {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return,
    };
    let Some(responder) = lock(pending).remove(&key) else {
        debug!(server = %name, id = %key, "Response for unknown request");
        return;
    };

    let outcome = match message.get("error") {
        Some(error) => Err(McpError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }),
        None => Ok(message),
    };
    let _ = responder.send(outcome);
}

async fn answer_server_request(writer: &Writer, id: Value, method: &str) -> Result<(), McpError> {
    let reply = if method == "ping" {
        json!({ "jsonrpc": "2.0", "id": id, "result": {} })
    } else {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": -32601,
                "message": format!("client does not implement method '{method}'")
            }
        })
    };
    write_message(writer, &reply).await
}

fn fail_all_pending(pending: &Pending) {
    for (_, responder) in lock(pending).drain() {
        let _ = responder.send(Err(McpError::Disconnected));
    }
}
