//! Subcommand handlers extracted from `main.rs`.
//!
//! Keeps `main.rs` slim: clap parsing stays there, the work lives here.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AssistantSettings, SessionOrchestrator, SessionSummary};
use crate::comm::{BroadcastObserver, Fanout, TracingObserver, TurnEvent, TurnObserver};
use crate::config::Config;
use crate::models::OpenAIRealtime;
use crate::room::LocalRoom;
use crate::store::SqliteFoodStore;
use crate::tools::{self, ToolContext, ToolDispatcher};

// ── Shared setup ─────────────────────────────────────────────────────────────

/// Open the configured SQLite store.
pub fn open_store(cfg: &Config) -> anyhow::Result<Arc<SqliteFoodStore>> {
    let path = cfg.store_path();
    let store = SqliteFoodStore::open(&path)
        .with_context(|| format!("failed to open food store: {}", path.display()))?;
    debug!(path = %path.display(), "food store opened");
    Ok(Arc::new(store))
}

// ── start ────────────────────────────────────────────────────────────────────

/// Run one voice session until the model closes or `shutdown` fires.
pub async fn run_session(cfg: &Config, shutdown: CancellationToken) -> anyhow::Result<SessionSummary> {
    let api_key = cfg
        .model
        .api_key
        .resolve()?
        .context("no API key configured: set OPENAI_API_KEY or model.api_key")?;
    let store = open_store(cfg)?;
    let registry = Arc::new(tools::builtins::registry()?);
    info!(tools = registry.len(), "tool registry ready");

    let transcript = BroadcastObserver::new();
    spawn_transcript_printer(&transcript);
    let observers: Vec<Arc<dyn TurnObserver>> =
        vec![Arc::new(TracingObserver), Arc::new(transcript)];

    let model = OpenAIRealtime::with_config(api_key, cfg.model.endpoint.clone(), cfg.model.model.clone())
        .with_voice(cfg.model.voice.clone())
        .with_modalities(cfg.model.modalities.clone());
    let room = LocalRoom::new(cfg.room.participant.clone(), shutdown.clone())
        .with_utterances(spawn_stdin_reader(shutdown.clone()));
    let settings = AssistantSettings {
        instructions: cfg.assistant.instructions.clone(),
        greeting: cfg.assistant.greeting.clone(),
        day_zone: cfg.day_zone()?,
        ..Default::default()
    };

    let mut orchestrator = SessionOrchestrator::new(
        Box::new(room),
        Arc::new(model),
        registry,
        store,
        Arc::new(Fanout(observers)),
        settings,
    )
    .with_shutdown(shutdown);

    Ok(orchestrator.run().await?)
}

/// Print assistant transcript deltas to stdout as they arrive.
fn spawn_transcript_printer(observer: &BroadcastObserver) {
    use std::io::Write;

    let mut rx = observer.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(TurnEvent::Started { .. }) => print!("assistant> "),
                Ok(TurnEvent::Chunk { text, .. }) => print!("{text}"),
                Ok(TurnEvent::Completed { .. }) => println!(),
                Err(RecvError::Lagged(n)) => {
                    debug!(skipped = n, "transcript printer lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
            let _ = std::io::stdout().flush();
        }
    });
}

/// Forward non-blank stdin lines as participant utterances.
fn spawn_stdin_reader(shutdown: CancellationToken) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if tx.send(text.to_string()).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

// ── invoke / tools / history ─────────────────────────────────────────────────

/// Run a single tool invocation and print the spoken reply.
pub async fn invoke_tool(
    config_path: &Path,
    participant: &str,
    tool: &str,
    args: &str,
) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).await?;
    let store = open_store(&cfg)?;
    let registry = Arc::new(tools::builtins::registry()?);
    let dispatcher = ToolDispatcher::new(
        registry,
        ToolContext {
            participant_identity: participant.to_string(),
            store,
            day_zone: cfg.day_zone()?,
        },
    );
    debug!(tool, participant, "debug invoke");

    let reply = match dispatcher.invoke(tool, args).await {
        Ok(reply) => reply,
        Err(e) => {
            eprintln!("error: {e}");
            e.spoken_reply()
        }
    };
    println!("{reply}");
    Ok(())
}

/// Print the function definitions advertised to the model.
pub fn print_tools() -> anyhow::Result<()> {
    let registry = tools::builtins::registry()?;
    let defs = serde_json::to_string_pretty(&registry.function_defs())
        .context("serialize tool definitions")?;
    println!("{defs}");
    Ok(())
}

/// Print a participant's most recent entries, newest first.
pub async fn show_history(config_path: &Path, participant: &str, limit: usize) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).await?;
    let store = open_store(&cfg)?;
    let entries = store.entries_for(participant, limit)?;
    if entries.is_empty() {
        println!("No entries for {participant}.");
        return Ok(());
    }
    for entry in entries {
        println!("{}", serde_json::to_string(&entry).context("serialize entry")?);
    }
    Ok(())
}
