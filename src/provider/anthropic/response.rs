//! Anthropic Messages API response types.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub id: String,
    pub content: Vec<ResponseBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Thinking, server tool results and anything newer. Not shown to the user.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_input_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_response() {
        let json = r#"{
            "id": "msg_123",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hello!"}],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "end_turn",
            "stop_sequence": null,
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;

        let response: AnthropicResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.id, "msg_123");
        assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
        assert!(matches!(&response.content[0], ResponseBlock::Text { text } if text == "Hello!"));
    }

    #[test]
    fn test_tool_use_response() {
        let json = r#"{
            "id": "msg_456",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me search."},
                {
                    "type": "tool_use",
                    "id": "toolu_789",
                    "name": "perplexity_ask",
                    "input": {"messages": [{"role": "user", "content": "rust 2024 edition"}]}
                }
            ],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 10}
        }"#;

        let response: AnthropicResponse = serde_json::from_str(json).unwrap();
        let ResponseBlock::ToolUse { id, name, input } = &response.content[1] else {
            panic!("expected tool_use block");
        };
        assert_eq!(id, "toolu_789");
        assert_eq!(name, "perplexity_ask");
        assert_eq!(input["messages"][0]["content"], "rust 2024 edition");
    }

    #[test]
    fn test_unknown_blocks_are_tolerated() {
        let json = r#"{
            "id": "msg_think",
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "x"},
                {"type": "text", "text": "42"}
            ],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1, "cache_read_input_tokens": 7}
        }"#;

        let response: AnthropicResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(response.content[0], ResponseBlock::Other));
        assert_eq!(response.usage.cache_read_input_tokens, 7);
    }
}
