//! Interactive prompt loop.

use crate::agent::AgentEvent;
use crate::assistant::SearchAssistant;
use crate::error::Error;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::pin::Pin;
use std::process::ExitCode;
use tokio::sync::mpsc;

const RULE: &str = "==========================================================================";
const INIT_HINT: &str = "Ensure Docker is running and PERPLEXITY_API_KEY is set.";
const QUERY_HINT: &str = "Try rephrasing the question or check your connection.";
const EXIT_COMMANDS: [&str; 4] = ["exit", "quit", "bye", "goodbye"];

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exit,
    EndOfInput,
    Interrupted,
    InitFailed,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::InitFailed => ExitCode::FAILURE,
            Self::Exit | Self::EndOfInput | Self::Interrupted => ExitCode::SUCCESS,
        }
    }
}

/// Run the prompt on the terminal until the user leaves or presses Ctrl-C.
pub async fn run(assistant: &SearchAssistant) -> ExitCode {
    let lines = spawn_stdin_reader();
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    let mut stdout = io::stdout();
    match run_with(assistant, lines, &mut stdout, interrupt).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Read stdin on a plain thread so a pending read never holds up shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line.clone()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Drive one session against `lines`, writing to `out`.
///
/// The assistant is torn down before this returns, whatever the outcome.
pub async fn run_with<W: Write>(
    assistant: &SearchAssistant,
    mut lines: mpsc::UnboundedReceiver<String>,
    out: &mut W,
    interrupt: impl Future<Output = ()>,
) -> io::Result<Outcome> {
    let mut interrupt = std::pin::pin!(interrupt);
    let outcome = session(assistant, &mut lines, out, interrupt.as_mut()).await;
    assistant.teardown().await;
    outcome
}

async fn session<W: Write, I: Future<Output = ()>>(
    assistant: &SearchAssistant,
    lines: &mut mpsc::UnboundedReceiver<String>,
    out: &mut W,
    mut interrupt: Pin<&mut I>,
) -> io::Result<Outcome> {
    write_banner(out)?;

    tokio::select! {
        result = assistant.ensure_initialized() => {
            if let Err(e) = result {
                writeln!(out, "❌ {e}")?;
                writeln!(out, "🔧 {INIT_HINT}")?;
                return Ok(Outcome::InitFailed);
            }
            writeln!(out, "✅ Search assistant ready.")?;
            writeln!(out)?;
        }
        () = interrupt.as_mut() => {
            write_interrupted(out)?;
            return Ok(Outcome::Interrupted);
        }
    }

    loop {
        write!(out, "🔍 You: ")?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.recv() => line,
            () = interrupt.as_mut() => {
                write_interrupted(out)?;
                return Ok(Outcome::Interrupted);
            }
        };

        let Some(line) = line else {
            writeln!(out)?;
            write_farewell(out)?;
            return Ok(Outcome::EndOfInput);
        };

        let query = line.trim();
        if query.is_empty() {
            writeln!(out, "💭 Ask me a question, or type 'exit' to quit.")?;
            continue;
        }
        if is_exit_command(query) {
            write_farewell(out)?;
            return Ok(Outcome::Exit);
        }

        if !answer(assistant, query, out, interrupt.as_mut()).await? {
            write_interrupted(out)?;
            return Ok(Outcome::Interrupted);
        }
    }
}

/// Returns `false` if interrupted before the answer arrived.
async fn answer<W: Write, I: Future<Output = ()>>(
    assistant: &SearchAssistant,
    query: &str,
    out: &mut W,
    mut interrupt: Pin<&mut I>,
) -> io::Result<bool> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let query_fut = assistant.handle_query_with_events(query, Some(&tx));
    tokio::pin!(query_fut);

    let result = loop {
        tokio::select! {
            result = &mut query_fut => break result,
            Some(event) = rx.recv() => render_event(out, &event)?,
            () = interrupt.as_mut() => return Ok(false),
        }
    };
    while let Ok(event) = rx.try_recv() {
        render_event(out, &event)?;
    }

    match result {
        Ok(text) => {
            writeln!(out, "🤖 SearchBot: {text}")?;
        }
        Err(e) => {
            let msg = match e {
                Error::Query(msg) => msg,
                other => other.to_string(),
            };
            writeln!(out, "❌ Error processing search query: {msg}")?;
            writeln!(out, "🔧 {QUERY_HINT}")?;
        }
    }
    writeln!(out)?;
    Ok(true)
}

fn render_event<W: Write>(out: &mut W, event: &AgentEvent) -> io::Result<()> {
    match event {
        AgentEvent::ToolCallStart { name, .. } => writeln!(out, "[tool] {name}"),
        AgentEvent::ToolCallResult {
            name,
            is_error: true,
            ..
        } => writeln!(out, "[tool] {name} failed"),
        AgentEvent::ToolCallResult { .. } => Ok(()),
    }
}

fn is_exit_command(input: &str) -> bool {
    let input = input.to_lowercase();
    EXIT_COMMANDS.contains(&input.as_str())
}

fn write_banner<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "{RULE}")?;
    writeln!(out, "🔍  SEARCH ASSISTANT")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Ask about current events, research topics or facts to check.")?;
    writeln!(out, "Answers come from live web search and cite their sources.")?;
    writeln!(out)?;
    writeln!(out, "Tips:")?;
    writeln!(out, "   • Specific questions get better answers")?;
    writeln!(out, "   • Ask for sources when you need citations")?;
    writeln!(out)?;
    writeln!(out, "🚪 Type 'exit' to quit anytime")?;
    writeln!(out, "{RULE}")?;
    writeln!(out)
}

fn write_farewell<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "👋 Thanks for searching with me. See you next time!")?;
    writeln!(out, "{RULE}")
}

fn write_interrupted<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "👋 Search assistant interrupted. Happy exploring!")?;
    writeln!(out, "{RULE}")
}
