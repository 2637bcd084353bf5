use crate::agent::{AgentError, AgentEvent};
use crate::mcp::McpTool;
use crate::provider::{ContentBlock, ToolCall};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

/// Run every tool call from one model turn concurrently.
///
/// Results come back in call order. A failing or unknown tool becomes an
/// error result for the model to read, not an error of the turn.
pub(crate) async fn execute_tool_calls(
    tools: &[McpTool],
    tool_calls: Vec<ToolCall>,
    events: Option<&mpsc::UnboundedSender<AgentEvent>>,
) -> Result<Vec<ContentBlock>, AgentError> {
    let mut set = JoinSet::new();
    let num_tools = tool_calls.len();

    for (index, call) in tool_calls.into_iter().enumerate() {
        let tool = tools.iter().find(|t| t.name == call.name).cloned();
        let tx = events.cloned();

        if let Some(tx) = &tx {
            let _ = tx.send(AgentEvent::ToolCallStart {
                id: call.id.clone(),
                name: call.name.clone(),
            });
        }

        set.spawn(async move {
            let (content, is_error) = match tool {
                Some(tool) => match tool.call(call.arguments).await {
                    Ok(res) => (res.content, res.is_error),
                    Err(e) => (e.to_string(), true),
                },
                None => (format!("Unknown tool: {}", call.name), true),
            };
            debug!(tool = %call.name, is_error, "Tool call finished");

            if let Some(tx) = &tx {
                let _ = tx.send(AgentEvent::ToolCallResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    is_error,
                });
            }

            let block = ContentBlock::ToolResult {
                tool_call_id: call.id,
                content,
                is_error,
            };
            (index, block)
        });
    }

    let mut results = vec![None; num_tools];
    while let Some(res) = set.join_next().await {
        match res {
            Ok((index, block)) => results[index] = Some(block),
            Err(e) if e.is_panic() => {
                return Err(AgentError::Tool("Tool task panicked unexpectedly".into()));
            }
            Err(_) => return Err(AgentError::Tool("Tool task cancelled".into())),
        }
    }

    results
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| AgentError::Tool("Tool execution incomplete".into()))
}
