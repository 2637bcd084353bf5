//! Lazy lifecycle for the search tool server and the agent built on it.
//!
//! Nothing is started until the first query (or an explicit
//! [`SearchAssistant::ensure_initialized`]). At most one tool server is
//! running per assistant. [`SearchAssistant::teardown`] shuts it down, and
//! dropping the assistant kills it if teardown was skipped.

use crate::agent::{Agent, AgentEvent, SYSTEM_PROMPT};
use crate::config::{Config, SEARCH_API_KEY_ENV};
use crate::error::{Error, Result};
use crate::mcp::{McpError, McpTool, StdioLauncher, ToolServer, ToolServerLauncher};
use crate::provider::{self, AnthropicFactory, ModelFactory};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

/// Name of the search tool server, used in logs.
pub const TOOL_SERVER_NAME: &str = "perplexity-ask";

/// Everything that exists once initialization has succeeded.
struct Ready {
    connection: Arc<dyn ToolServer>,
    agent: Arc<Agent>,
}

#[derive(Debug, thiserror::Error)]
enum InitFailure {
    #[error(transparent)]
    Tools(#[from] McpError),
    #[error(transparent)]
    Model(#[from] provider::Error),
}

pub struct SearchAssistant {
    config: Config,
    launcher: Arc<dyn ToolServerLauncher>,
    models: Arc<dyn ModelFactory>,
    state: Mutex<Option<Ready>>,
}

impl SearchAssistant {
    pub fn new(
        config: Config,
        launcher: Arc<dyn ToolServerLauncher>,
        models: Arc<dyn ModelFactory>,
    ) -> Self {
        Self {
            config,
            launcher,
            models,
            state: Mutex::new(None),
        }
    }

    /// Assistant backed by a stdio tool server and the Anthropic API.
    pub fn from_config(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(StdioLauncher::new(TOOL_SERVER_NAME)),
            Arc::new(AnthropicFactory),
        )
    }

    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Start the tool server and build the agent, unless already done.
    ///
    /// Concurrent callers are serialized; only the first does any work. On
    /// failure nothing is kept and the next call starts over.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.ready_agent().await.map(|_| ())
    }

    /// Close the tool server and forget the agent. Safe to call repeatedly.
    pub async fn teardown(&self) {
        let ready = self.state.lock().await.take();
        let Some(Ready { connection, agent }) = ready else {
            debug!("Teardown with nothing running");
            return;
        };
        drop(agent);

        match connection.close().await {
            Ok(()) => info!(server = TOOL_SERVER_NAME, "Tool server closed"),
            Err(e) => debug!(server = TOOL_SERVER_NAME, error = %e, "Tool server close failed"),
        }
    }

    /// Answer a query, initializing on first use.
    pub async fn handle_query(&self, query: &str) -> Result<String> {
        self.handle_query_with_events(query, None).await
    }

    /// Answer a query, reporting tool activity on `events` as it happens.
    ///
    /// Initialization errors come back unchanged. A failed query leaves the
    /// assistant initialized and its conversation as it was.
    pub async fn handle_query_with_events(
        &self,
        query: &str,
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
    ) -> Result<String> {
        if query.trim().is_empty() {
            return Err(Error::Query("query must not be empty".to_string()));
        }

        let agent = self.ready_agent().await?;
        agent
            .run(query, events)
            .await
            .map_err(|e| Error::Query(e.to_string()))
    }

    async fn ready_agent(&self) -> Result<Arc<Agent>> {
        let mut state = self.state.lock().await;
        if let Some(ready) = state.as_ref() {
            return Ok(Arc::clone(&ready.agent));
        }

        let ready = self.initialize().await?;
        let agent = Arc::clone(&ready.agent);
        *state = Some(ready);
        Ok(agent)
    }

    async fn initialize(&self) -> Result<Ready> {
        let credential = self.config.search_credential().ok_or_else(|| {
            Error::Configuration(format!("missing required credential: {SEARCH_API_KEY_ENV}"))
        })?;

        info!(server = TOOL_SERVER_NAME, "Starting tool server");
        let connection = self
            .launcher
            .launch(self.config.tool_server_config(credential))
            .await
            .map_err(Error::initialization)?;

        match self.build_agent(&connection).await {
            Ok(agent) => {
                info!(
                    model = agent.model(),
                    tools = ?agent.tool_names(),
                    "Search assistant ready"
                );
                Ok(Ready {
                    connection,
                    agent: Arc::new(agent),
                })
            }
            Err(cause) => {
                if let Err(e) = connection.close().await {
                    debug!(error = %e, "Close after failed initialization also failed");
                }
                Err(Error::initialization(cause))
            }
        }
    }

    async fn build_agent(
        &self,
        connection: &Arc<dyn ToolServer>,
    ) -> std::result::Result<Agent, InitFailure> {
        let defs = connection.list_tools().await?;
        let tools = McpTool::bind_all(defs, connection);
        let llm = self.models.build(&self.config)?;

        Ok(Agent::new(
            llm,
            self.config.model.clone(),
            SYSTEM_PROMPT,
            tools,
            self.config.session_id.clone(),
        )
        .with_limits(self.config.max_tokens, self.config.max_turns))
    }
}

impl Drop for SearchAssistant {
    fn drop(&mut self) {
        if let Some(ready) = self.state.get_mut().take() {
            debug!(server = TOOL_SERVER_NAME, "Dropped without teardown, killing tool server");
            ready.connection.abort();
        }
    }
}

#[cfg(test)]
mod tests;
