//! Native Anthropic Messages API client (non-streaming).

mod client;
mod convert;
mod request;
mod response;

pub use client::{AnthropicClient, BASE_URL};
