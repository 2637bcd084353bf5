//! Shared HTTP plumbing for model providers.

mod client;

pub use client::{ApiKeyAuth, HttpClient};
