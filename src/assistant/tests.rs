use super::*;
use crate::mcp::{McpToolDef, ToolResult, ToolServerConfig};
use crate::provider::{ChatRequest, ContentBlock, LlmApi, Message, Role};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    lists: AtomicUsize,
    closes: AtomicUsize,
    aborts: AtomicUsize,
    builds: AtomicUsize,
}

impl Counters {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Switches the tests flip to make a stage fail.
#[derive(Default)]
struct Faults {
    launch: AtomicBool,
    list: AtomicBool,
    build: AtomicBool,
    model: AtomicBool,
}

struct StubServer {
    counters: Arc<Counters>,
    faults: Arc<Faults>,
}

#[async_trait]
impl ToolServer for StubServer {
    async fn list_tools(&self) -> std::result::Result<Vec<McpToolDef>, McpError> {
        self.counters.lists.fetch_add(1, Ordering::SeqCst);
        if self.faults.list.load(Ordering::SeqCst) {
            return Err(McpError::Protocol("tools/list timed out".into()));
        }
        Ok(["A", "B"]
            .into_iter()
            .map(|name| McpToolDef {
                name: name.to_string(),
                description: String::new(),
                input_schema: json!({"type": "object"}),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        _arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, McpError> {
        Ok(ToolResult {
            content: name.to_string(),
            is_error: false,
        })
    }

    async fn close(&self) -> std::result::Result<(), McpError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn abort(&self) {
        self.counters.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

struct StubLauncher {
    counters: Arc<Counters>,
    faults: Arc<Faults>,
    last_config: StdMutex<Option<ToolServerConfig>>,
}

#[async_trait]
impl ToolServerLauncher for StubLauncher {
    async fn launch(
        &self,
        config: ToolServerConfig,
    ) -> std::result::Result<Arc<dyn ToolServer>, McpError> {
        *self.last_config.lock().unwrap() = Some(config);
        if self.faults.launch.load(Ordering::SeqCst) {
            return Err(McpError::SpawnFailed("docker: command not found".into()));
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StubServer {
            counters: Arc::clone(&self.counters),
            faults: Arc::clone(&self.faults),
        }))
    }
}

/// Answers every query with `ECHO:<query>`.
struct EchoModel {
    faults: Arc<Faults>,
}

#[async_trait]
impl LlmApi for EchoModel {
    async fn complete(&self, request: ChatRequest) -> std::result::Result<Message, provider::Error> {
        if self.faults.model.load(Ordering::SeqCst) {
            return Err(provider::Error::Api("HTTP 500: boom".into()));
        }
        let query = request.messages.last().map(Message::text).unwrap_or_default();
        Ok(Message {
            role: Role::Assistant,
            content: Arc::new(vec![ContentBlock::Text {
                text: format!("ECHO:{query}"),
            }]),
        })
    }
}

struct StubFactory {
    counters: Arc<Counters>,
    faults: Arc<Faults>,
}

impl ModelFactory for StubFactory {
    fn build(&self, _config: &Config) -> std::result::Result<Arc<dyn LlmApi>, provider::Error> {
        self.counters.builds.fetch_add(1, Ordering::SeqCst);
        if self.faults.build.load(Ordering::SeqCst) {
            return Err(provider::Error::MissingApiKey {
                backend: "Anthropic".into(),
                env_var: "ANTHROPIC_API_KEY".into(),
            });
        }
        Ok(Arc::new(EchoModel {
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct Harness {
    assistant: SearchAssistant,
    counters: Arc<Counters>,
    faults: Arc<Faults>,
    launcher: Arc<StubLauncher>,
}

fn config_with_credential(credential: Option<&str>) -> Config {
    Config {
        search_api_key: credential.map(str::to_string),
        session_id: "test-session".into(),
        ..Config::default()
    }
}

fn harness_with(config: Config) -> Harness {
    let counters = Arc::new(Counters::default());
    let faults = Arc::new(Faults::default());
    let launcher = Arc::new(StubLauncher {
        counters: Arc::clone(&counters),
        faults: Arc::clone(&faults),
        last_config: StdMutex::new(None),
    });
    let factory = Arc::new(StubFactory {
        counters: Arc::clone(&counters),
        faults: Arc::clone(&faults),
    });
    let assistant = SearchAssistant::new(config, launcher.clone(), factory);
    Harness {
        assistant,
        counters,
        faults,
        launcher,
    }
}

fn harness() -> Harness {
    harness_with(config_with_credential(Some("pplx-test")))
}

#[tokio::test]
async fn test_ensure_initialized_is_idempotent() {
    let h = harness();

    for _ in 0..3 {
        h.assistant.ensure_initialized().await.unwrap();
    }

    assert!(h.assistant.is_ready().await);
    assert_eq!(Counters::get(&h.counters.connects), 1);
    assert_eq!(Counters::get(&h.counters.lists), 1);
    assert_eq!(Counters::get(&h.counters.builds), 1);
}

#[tokio::test]
async fn test_concurrent_initialization_connects_once() {
    let h = harness();

    let (a, b) = tokio::join!(h.assistant.ensure_initialized(), h.assistant.ensure_initialized());

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(Counters::get(&h.counters.connects), 1);
}

#[tokio::test]
async fn test_credential_is_forwarded_to_tool_server() {
    let h = harness();
    h.assistant.ensure_initialized().await.unwrap();

    let config = h.launcher.last_config.lock().unwrap().clone().unwrap();
    assert_eq!(config.command, "docker");
    assert!(config.args.contains(&"mcp/perplexity-ask".to_string()));
    assert_eq!(
        config.env.unwrap().get(SEARCH_API_KEY_ENV).map(String::as_str),
        Some("pplx-test")
    );
}

#[tokio::test]
async fn test_missing_credential_starts_nothing() {
    for credential in [None, Some(""), Some("   ")] {
        let h = harness_with(config_with_credential(credential));

        let err = h.assistant.ensure_initialized().await.unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains(SEARCH_API_KEY_ENV));
        assert!(!h.assistant.is_ready().await);
        assert!(h.launcher.last_config.lock().unwrap().is_none());
        assert_eq!(Counters::get(&h.counters.connects), 0);
        assert_eq!(Counters::get(&h.counters.builds), 0);
    }
}

#[tokio::test]
async fn test_list_failure_rolls_back_then_retries() {
    let h = harness();
    h.faults.list.store(true, Ordering::SeqCst);

    let err = h.assistant.ensure_initialized().await.unwrap_err();

    assert!(err.is_initialization());
    assert!(
        err.to_string()
            .starts_with("Failed to initialize search assistant: ")
    );
    assert!(err.to_string().contains("tools/list timed out"));
    assert_eq!(Counters::get(&h.counters.closes), 1);
    assert_eq!(Counters::get(&h.counters.builds), 0);
    assert!(!h.assistant.is_ready().await);

    h.faults.list.store(false, Ordering::SeqCst);
    h.assistant.ensure_initialized().await.unwrap();

    assert!(h.assistant.is_ready().await);
    assert_eq!(Counters::get(&h.counters.connects), 2);
    assert_eq!(Counters::get(&h.counters.closes), 1);
}

#[tokio::test]
async fn test_model_build_failure_rolls_back() {
    let h = harness();
    h.faults.build.store(true, Ordering::SeqCst);

    let err = h.assistant.ensure_initialized().await.unwrap_err();

    assert!(err.is_initialization());
    assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    assert_eq!(Counters::get(&h.counters.closes), 1);

    h.faults.build.store(false, Ordering::SeqCst);
    h.assistant.ensure_initialized().await.unwrap();
    assert_eq!(Counters::get(&h.counters.builds), 2);
}

#[tokio::test]
async fn test_launch_failure_leaves_nothing_to_close() {
    let h = harness();
    h.faults.launch.store(true, Ordering::SeqCst);

    let err = h.assistant.ensure_initialized().await.unwrap_err();

    assert!(err.is_initialization());
    assert!(err.to_string().contains("docker: command not found"));
    assert_eq!(Counters::get(&h.counters.closes), 0);
    assert!(!h.assistant.is_ready().await);
}

#[tokio::test]
async fn test_teardown_twice_closes_once() {
    let h = harness();
    h.assistant.ensure_initialized().await.unwrap();

    h.assistant.teardown().await;
    h.assistant.teardown().await;

    assert_eq!(Counters::get(&h.counters.closes), 1);
    assert!(!h.assistant.is_ready().await);
}

#[tokio::test]
async fn test_teardown_then_drop_closes_once() {
    let h = harness();
    h.assistant.ensure_initialized().await.unwrap();

    h.assistant.teardown().await;
    let counters = Arc::clone(&h.counters);
    drop(h);

    assert_eq!(Counters::get(&counters.closes), 1);
    assert_eq!(Counters::get(&counters.aborts), 0);
}

#[tokio::test]
async fn test_drop_without_teardown_aborts() {
    let h = harness();
    h.assistant.ensure_initialized().await.unwrap();

    let counters = Arc::clone(&h.counters);
    drop(h);

    assert_eq!(Counters::get(&counters.aborts), 1);
    assert_eq!(Counters::get(&counters.closes), 0);
}

#[tokio::test]
async fn test_teardown_before_init_is_noop() {
    let h = harness();
    h.assistant.teardown().await;
    assert_eq!(Counters::get(&h.counters.closes), 0);
    assert_eq!(Counters::get(&h.counters.connects), 0);
}

#[tokio::test]
async fn test_query_failure_keeps_agent() {
    let h = harness();
    h.faults.model.store(true, Ordering::SeqCst);

    let err = h.assistant.handle_query("first").await.unwrap_err();
    assert!(err.is_query());
    assert!(err.to_string().contains("boom"));
    assert!(h.assistant.is_ready().await);

    h.faults.model.store(false, Ordering::SeqCst);
    assert_eq!(h.assistant.handle_query("again").await.unwrap(), "ECHO:again");

    assert_eq!(Counters::get(&h.counters.connects), 1);
    assert_eq!(Counters::get(&h.counters.builds), 1);
    assert_eq!(Counters::get(&h.counters.closes), 0);
}

#[tokio::test]
async fn test_query_propagates_init_errors_unchanged() {
    let h = harness_with(config_with_credential(None));
    let err = h.assistant.handle_query("hi").await.unwrap_err();
    assert_eq!(
        err,
        Error::Configuration(format!("missing required credential: {SEARCH_API_KEY_ENV}"))
    );
}

#[tokio::test]
async fn test_empty_query_is_rejected_without_init() {
    let h = harness();
    let err = h.assistant.handle_query("  \n").await.unwrap_err();
    assert_eq!(err, Error::Query("query must not be empty".into()));
    assert_eq!(Counters::get(&h.counters.connects), 0);
}

#[tokio::test]
async fn test_echo_scenario_connects_once() {
    let h = harness();

    h.assistant.ensure_initialized().await.unwrap();
    assert_eq!(h.assistant.handle_query("hi").await.unwrap(), "ECHO:hi");
    assert_eq!(h.assistant.handle_query("bye").await.unwrap(), "ECHO:bye");

    assert_eq!(Counters::get(&h.counters.connects), 1);
    assert_eq!(Counters::get(&h.counters.lists), 1);
}

#[tokio::test]
async fn test_query_after_teardown_reinitializes() {
    let h = harness();
    h.assistant.handle_query("one").await.unwrap();
    h.assistant.teardown().await;

    assert_eq!(h.assistant.handle_query("two").await.unwrap(), "ECHO:two");
    assert_eq!(Counters::get(&h.counters.connects), 2);
    assert_eq!(Counters::get(&h.counters.closes), 1);
}
