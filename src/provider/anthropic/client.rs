//! Anthropic Messages API client.

use super::convert;
use super::response::AnthropicResponse;
use crate::provider::error::Error;
use crate::provider::http::{ApiKeyAuth, HttpClient};
use crate::provider::types::{ChatRequest, Message};
use crate::provider::LlmApi;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};

pub const BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: HttpClient,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));

        let http = HttpClient::new(
            base_url.unwrap_or(BASE_URL),
            ApiKeyAuth {
                header: "x-api-key".to_string(),
                key: api_key.into(),
            },
        )?
        .with_extra_headers(headers);

        Ok(Self { http })
    }
}

#[async_trait]
impl LlmApi for AnthropicClient {
    async fn complete(&self, request: ChatRequest) -> Result<Message, Error> {
        let api_request = convert::build_request(&request);

        tracing::debug!(
            model = %api_request.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.as_ref().map_or(0, Vec::len),
            "Anthropic API request"
        );

        let response: AnthropicResponse = self.http.post_json("/v1/messages", &api_request).await?;

        tracing::debug!(
            id = %response.id,
            model = %response.model,
            stop_reason = response.stop_reason.as_deref().unwrap_or("none"),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            cache_read_tokens = response.usage.cache_read_input_tokens,
            "Anthropic API response"
        );

        Ok(convert::convert_response(response))
    }
}
