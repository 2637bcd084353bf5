use crate::mcp::ToolServerConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Credential the search tool server needs. Forwarded into its environment.
pub const SEARCH_API_KEY_ENV: &str = "PERPLEXITY_API_KEY";
/// Credential for the hosted model.
pub const MODEL_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const MODEL_ENV: &str = "SEARCH_ASSISTANT_MODEL";
pub const BASE_URL_ENV: &str = "SEARCH_ASSISTANT_BASE_URL";
pub const SESSION_ID_ENV: &str = "SEARCH_ASSISTANT_SESSION_ID";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_MAX_TURNS: usize = 8;

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search_api_key: Option<String>,
    pub model_api_key: Option<String>,
    pub model: String,
    /// Override for the model API endpoint (proxies, gateways).
    pub base_url: Option<String>,
    /// Attached to every model request for external tracing.
    pub session_id: String,
    pub max_tokens: u32,
    /// Upper bound on model round trips for a single query.
    pub max_turns: usize,
    pub tool_server: ToolServerSettings,
}

/// How to start the search tool server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolServerSettings {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ToolServerSettings {
    fn default() -> Self {
        Self {
            command: "docker".to_string(),
            args: ["run", "-i", "--rm", "-e", SEARCH_API_KEY_ENV, "mcp/perplexity-ask"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("search_api_key", &redact(&self.search_api_key))
            .field("model_api_key", &redact(&self.model_api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .field("max_tokens", &self.max_tokens)
            .field("max_turns", &self.max_turns)
            .field("tool_server", &self.tool_server)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_api_key: None,
            model_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            session_id: uuid::Uuid::new_v4().to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_turns: DEFAULT_MAX_TURNS,
            tool_server: ToolServerSettings::default(),
        }
    }
}

impl Config {
    /// Path of the optional settings file.
    pub fn settings_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("search-assistant").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".search-assistant/config.toml"))
    }

    /// Load the settings file (if any), then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::settings_path();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            tracing::debug!(path = %path.display(), "Loaded settings file");
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overlay values from an environment lookup. Empty values count as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(SEARCH_API_KEY_ENV) {
            self.search_api_key = Some(key);
        }
        if let Some(key) = get(MODEL_API_KEY_ENV) {
            self.model_api_key = Some(key);
        }
        if let Some(model) = get(MODEL_ENV) {
            self.model = model;
        }
        if let Some(url) = get(BASE_URL_ENV) {
            self.base_url = Some(url);
        }
        if let Some(id) = get(SESSION_ID_ENV) {
            self.session_id = id;
        }
    }

    /// The search credential, if present and non-empty.
    pub fn search_credential(&self) -> Option<&str> {
        self.search_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }

    /// Tool server launch parameters with the credential in the child environment.
    pub fn tool_server_config(&self, credential: &str) -> ToolServerConfig {
        let mut env = HashMap::new();
        env.insert(SEARCH_API_KEY_ENV.to_string(), credential.to_string());
        ToolServerConfig {
            command: self.tool_server.command.clone(),
            args: self.tool_server.args.clone(),
            env: Some(env),
        }
    }
}
