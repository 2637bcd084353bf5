mod events;
mod tools;

pub use events::AgentEvent;

use crate::mcp::McpTool;
use crate::provider::{ChatRequest, LlmApi, Message, Role, ToolDefinition};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tracing::{Instrument, debug};

pub const SYSTEM_PROMPT: &str = "\
You are an intelligent search and research assistant with access to real-time web information.

Your capabilities include:
- Searching the web for current information and news
- Researching topics across various domains
- Providing accurate, up-to-date answers with reliable sources
- Synthesizing information from multiple sources
- Fact-checking and verification

When responding:
- Always cite your sources when possible
- Distinguish between factual information and opinions
- Provide comprehensive yet concise answers
- If information is uncertain or contradictory, mention this
- Suggest follow-up questions when appropriate
- Focus on accuracy and reliability

For research queries:
1. Search for the most current and relevant information
2. Cross-reference multiple sources when possible
3. Provide context and background information
4. Summarize key findings clearly
5. Highlight any limitations or uncertainties in the data";

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_MAX_TURNS: usize = 8;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] crate::provider::Error),

    #[error("No final answer after {0} model turns")]
    TurnLimit(usize),

    #[error("{0}")]
    Tool(String),
}

/// A model with a fixed prompt and tool set, plus the conversation so far.
pub struct Agent {
    llm: Arc<dyn LlmApi>,
    model: String,
    system_prompt: String,
    tools: Vec<McpTool>,
    definitions: Arc<Vec<ToolDefinition>>,
    session_id: String,
    max_tokens: u32,
    max_turns: usize,
    history: Mutex<Vec<Message>>,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LlmApi>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        tools: Vec<McpTool>,
        session_id: impl Into<String>,
    ) -> Self {
        let definitions = Arc::new(tools.iter().map(McpTool::definition).collect());
        Self {
            llm,
            model: model.into(),
            system_prompt: system_prompt.into(),
            tools,
            definitions,
            session_id: session_id.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_turns: DEFAULT_MAX_TURNS,
            history: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, max_tokens: u32, max_turns: usize) -> Self {
        self.max_tokens = max_tokens;
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Number of messages in the conversation so far.
    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    /// Answer one query, calling tools as the model requests them.
    ///
    /// Queries on the same agent run one at a time. If the query fails the
    /// conversation is left exactly as it was before the call.
    pub async fn run(
        &self,
        query: &str,
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
    ) -> Result<String, AgentError> {
        let span = tracing::info_span!("agent.run", session.id = %self.session_id, model = %self.model);

        async move {
            let mut turn = PendingTurn::start(self.history.lock().await);
            turn.history.push(Message::user_text(query));

            let result = self.run_turns(&mut turn.history, events).await;
            match &result {
                Ok(_) => turn.commit(),
                Err(e) => debug!(error = %e, "Query failed, rolling back history"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_turns(
        &self,
        history: &mut Vec<Message>,
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
    ) -> Result<String, AgentError> {
        for turn in 1..=self.max_turns {
            let request = ChatRequest {
                model: self.model.clone(),
                system: Some(self.system_prompt.clone()),
                messages: Arc::new(history.clone()),
                tools: Arc::clone(&self.definitions),
                max_tokens: Some(self.max_tokens),
                session_id: Some(self.session_id.clone()),
            };

            let response = self.llm.complete(request).await?;
            let tool_calls = response.tool_calls();
            let text = response.text();
            history.push(response);

            debug!(turn, tool_calls = tool_calls.len(), "Model turn complete");

            if tool_calls.is_empty() {
                return Ok(text);
            }

            let results = tools::execute_tool_calls(&self.tools, tool_calls, events).await?;
            history.push(Message {
                role: Role::ToolResult,
                content: Arc::new(results),
            });
        }

        Err(AgentError::TurnLimit(self.max_turns))
    }
}

/// History held for one query. Unless committed, it is truncated back to
/// where the query started when dropped, including when the query future
/// is cancelled mid-turn.
struct PendingTurn<'a> {
    history: MutexGuard<'a, Vec<Message>>,
    checkpoint: usize,
    committed: bool,
}

impl<'a> PendingTurn<'a> {
    fn start(history: MutexGuard<'a, Vec<Message>>) -> Self {
        let checkpoint = history.len();
        Self {
            history,
            checkpoint,
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.history.truncate(self.checkpoint);
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("model", &self.model)
            .field("tools", &self.tool_names())
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
