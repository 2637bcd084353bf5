//! JSON-over-HTTP client shared by model providers.

use crate::provider::error::{Error, format_api_error};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

/// Whole-request timeout. Tool-heavy answers can take a while.
const TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An API key sent in a named header.
#[derive(Clone)]
pub struct ApiKeyAuth {
    pub header: String,
    pub key: String,
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("header", &self.header)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    auth: ApiKeyAuth,
    extra_headers: HeaderMap,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, auth: ApiKeyAuth) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            extra_headers: HeaderMap::new(),
        })
    }

    /// Headers sent with every request in addition to auth and content type.
    #[must_use]
    pub fn with_extra_headers(mut self, headers: HeaderMap) -> Self {
        self.extra_headers = headers;
        self
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = self.extra_headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let name = HeaderName::try_from(self.auth.header.as_str())
            .map_err(|_| Error::Api("API key header name is invalid".into()))?;
        let value = HeaderValue::from_str(&self.auth.key)
            .map_err(|_| Error::Api("API key contains invalid header characters".into()))?;
        headers.insert(name, value);

        Ok(headers)
    }

    /// POST a JSON body and deserialize the JSON response.
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, Error> {
        let url = format!("{}{path}", self.base_url);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(Error::RateLimited { retry_after });
        }
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::Api(format_api_error(&format!(
                "HTTP {}: {text}",
                status.as_u16()
            ))));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Api(format!("Failed to parse response: {e}")))
    }
}

/// Parse a `Retry-After` value given in seconds (fractions round up).
/// HTTP-date values are not supported.
fn parse_retry_after(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs.max(1));
    }
    let secs = value.parse::<f64>().ok()?;
    if secs.is_finite() && secs > 0.0 {
        Some((secs.ceil() as u64).max(1))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        HttpClient::new(
            "https://api.example.com/",
            ApiKeyAuth {
                header: "x-api-key".into(),
                key: "secret".into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_api_key_header() {
        let headers = client().build_headers().unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "secret");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_extra_headers_are_kept() {
        let mut extra = HeaderMap::new();
        extra.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        let headers = client().with_extra_headers(extra).build_headers().unwrap();
        assert_eq!(headers.get("anthropic-version").unwrap(), "2023-06-01");
        assert_eq!(headers.get("x-api-key").unwrap(), "secret");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client().base_url, "https://api.example.com");
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", client());
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("30"), Some(30));
        assert_eq!(parse_retry_after("0"), Some(1));
        assert_eq!(parse_retry_after("2.5"), Some(3));
        assert_eq!(parse_retry_after("  7 "), Some(7));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("NaN"), None);
        assert_eq!(parse_retry_after("Thu, 01 Jan 2026 00:00:00 GMT"), None);
    }
}
