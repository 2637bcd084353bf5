use search_assistant::assistant::SearchAssistant;
use search_assistant::config::Config;
use search_assistant::{bootstrap, repl};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SEARCH_ASSISTANT_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    bootstrap::load();
    init_logging();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(session.id = %config.session_id, model = %config.model, "Config loaded");

    let assistant = SearchAssistant::from_config(config);
    let code = repl::run(&assistant).await;
    assistant.teardown().await;
    code
}

/// Log to stderr when `SEARCH_ASSISTANT_LOG` or `RUST_LOG` is set.
///
/// `SEARCH_ASSISTANT_LOG` takes a directive such as `search_assistant=trace`;
/// any other value turns on debug output for this crate.
fn init_logging() {
    let default_filter = || EnvFilter::new("search_assistant=debug");
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) if directive.contains('=') => {
            EnvFilter::try_new(&directive).unwrap_or_else(|_| default_filter())
        }
        Ok(_) => default_filter(),
        Err(_) if std::env::var("RUST_LOG").is_ok() => EnvFilter::from_default_env(),
        Err(_) => return,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
