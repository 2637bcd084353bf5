//! Conversion between our message types and the Anthropic wire format.

use super::request::{
    AnthropicMessage, AnthropicRequest, AnthropicTool, ContentBlock, RequestMetadata, SystemBlock,
};
use super::response::{AnthropicResponse, ResponseBlock};
use crate::provider::types::{
    ChatRequest, ContentBlock as OurBlock, Message, Role, ToolDefinition,
};
use std::sync::Arc;

const DEFAULT_MAX_TOKENS: u32 = 4096;

pub(crate) fn build_request(request: &ChatRequest) -> AnthropicRequest {
    let messages = request
        .messages
        .iter()
        .filter_map(convert_message)
        .collect();

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(request.tools.iter().map(convert_tool).collect())
    };

    AnthropicRequest {
        model: request.model.clone(),
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: request
            .system
            .as_ref()
            .map(|prompt| vec![SystemBlock::cached_text(prompt.clone())]),
        messages,
        tools,
        metadata: request.session_id.as_ref().map(|id| RequestMetadata {
            user_id: id.clone(),
        }),
    }
}

/// Tool results travel as user turns in the Messages API.
fn convert_message(msg: &Message) -> Option<AnthropicMessage> {
    let role = match msg.role {
        Role::User | Role::ToolResult => "user",
        Role::Assistant => "assistant",
    };

    let content: Vec<ContentBlock> = msg
        .content
        .iter()
        .map(|block| match block {
            OurBlock::Text { text } => ContentBlock::Text { text: text.clone() },
            OurBlock::ToolCall {
                id,
                name,
                arguments,
            } => ContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: arguments.clone(),
            },
            OurBlock::ToolResult {
                tool_call_id,
                content,
                is_error,
            } => ContentBlock::ToolResult {
                tool_use_id: tool_call_id.clone(),
                content: content.clone(),
                is_error: *is_error,
            },
        })
        .collect();

    if content.is_empty() {
        None
    } else {
        Some(AnthropicMessage { role, content })
    }
}

pub(crate) fn convert_tool(tool: &ToolDefinition) -> AnthropicTool {
    AnthropicTool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.parameters.clone(),
    }
}

pub(crate) fn convert_response(response: AnthropicResponse) -> Message {
    let content = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(OurBlock::Text { text }),
            ResponseBlock::ToolUse { id, name, input } => Some(OurBlock::ToolCall {
                id,
                name,
                arguments: input,
            }),
            ResponseBlock::Other => None,
        })
        .collect();

    Message {
        role: Role::Assistant,
        content: Arc::new(content),
    }
}
