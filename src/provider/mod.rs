//! Hosted model access.
//!
//! The rest of the crate talks to the model through [`LlmApi`]. A
//! [`ModelFactory`] turns a [`Config`] into a client so the lifecycle manager
//! can be driven by a stub in tests.

mod anthropic;
mod error;
mod http;
mod types;

use crate::config::{Config, MODEL_API_KEY_ENV};
use async_trait::async_trait;
use std::sync::Arc;

pub use anthropic::AnthropicClient;
pub use error::{Error, format_api_error};
pub use types::*;

/// Non-streaming chat completion.
#[async_trait]
pub trait LlmApi: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<Message, Error>;
}

/// Builds model clients from configuration.
pub trait ModelFactory: Send + Sync {
    fn build(&self, config: &Config) -> Result<Arc<dyn LlmApi>, Error>;
}

/// Factory for the Anthropic Messages API.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicFactory;

impl ModelFactory for AnthropicFactory {
    fn build(&self, config: &Config) -> Result<Arc<dyn LlmApi>, Error> {
        let key = config
            .model_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::MissingApiKey {
                backend: "Anthropic".to_string(),
                env_var: MODEL_API_KEY_ENV.to_string(),
            })?;

        let client = AnthropicClient::new(key, config.base_url.as_deref())?;
        Ok(Arc::new(client))
    }
}
