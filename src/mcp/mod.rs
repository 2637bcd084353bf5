//! Model Context Protocol tool servers reached over stdio.
//!
//! [`ToolServer`] and [`ToolServerLauncher`] are the seams the assistant
//! depends on; [`McpProcess`] and [`StdioLauncher`] are the subprocess
//! implementations.

mod process;

pub use process::McpProcess;

use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: Option<HashMap<String, String>>,
}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McpToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn server: {0}")]
    SpawnFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Disconnected")]
    Disconnected,
}

/// A connected tool server.
#[async_trait]
pub trait ToolServer: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, McpError>;

    /// Shut the server down. Calling it again is a no-op.
    async fn close(&self) -> Result<(), McpError>;

    /// Synchronous best-effort kill for paths that cannot await, such as `Drop`.
    fn abort(&self) {}
}

/// Starts tool servers.
#[async_trait]
pub trait ToolServerLauncher: Send + Sync {
    async fn launch(&self, config: ToolServerConfig) -> Result<Arc<dyn ToolServer>, McpError>;
}

/// Launches tool servers as local subprocesses speaking MCP over stdio.
#[derive(Debug, Clone)]
pub struct StdioLauncher {
    name: String,
}

impl StdioLauncher {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ToolServerLauncher for StdioLauncher {
    async fn launch(&self, config: ToolServerConfig) -> Result<Arc<dyn ToolServer>, McpError> {
        let process = McpProcess::spawn(self.name.clone(), config).await?;
        Ok(Arc::new(process))
    }
}

/// A tool from a connected server, ready to hand to the model.
#[derive(Clone)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    server: Arc<dyn ToolServer>,
}

impl McpTool {
    pub fn new(def: McpToolDef, server: Arc<dyn ToolServer>) -> Self {
        Self {
            name: def.name,
            description: def.description,
            input_schema: def.input_schema,
            server,
        }
    }

    /// Bind every advertised tool to the server that provides it.
    pub fn bind_all(defs: Vec<McpToolDef>, server: &Arc<dyn ToolServer>) -> Vec<Self> {
        defs.into_iter()
            .map(|def| Self::new(def, Arc::clone(server)))
            .collect()
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }

    pub async fn call(&self, arguments: serde_json::Value) -> Result<ToolResult, McpError> {
        self.server.call_tool(&self.name, arguments).await
    }
}

impl std::fmt::Debug for McpTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
