use nutri_voice::cli;
use nutri_voice::config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "nutri_voice",
    version,
    about = "Voice assistant that tracks food and daily nutrition totals"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a voice session (default)
    Start,
    /// Run a single tool call and print the spoken reply
    Invoke {
        /// Participant identity the call is made for
        #[arg(long)]
        participant: String,
        /// Tool name, e.g. consumed_food
        #[arg(long)]
        tool: String,
        /// JSON object of arguments
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Print the tool definitions advertised to the model
    Tools,
    /// Show a participant's most recent entries
    History {
        /// Participant identity
        #[arg(long)]
        participant: String,
        /// Maximum number of entries
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| nutri_voice::nutri_home().join("config.yaml"));

    match cli.command {
        Some(Command::Start) | None => { /* fall through to session startup */ }
        Some(Command::Invoke {
            participant,
            tool,
            args,
        }) => return cli::invoke_tool(&config_path, &participant, &tool, &args).await,
        Some(Command::Tools) => return cli::print_tools(),
        Some(Command::History { participant, limit }) => {
            return cli::show_history(&config_path, &participant, limit).await
        }
    }

    info!(path = %config_path.display(), "loading configuration");
    let cfg = config::Config::load(&config_path).await?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl-C, ending session…");
                cancel.cancel();
            }
        });
    }

    let summary = cli::run_session(&cfg, cancel).await?;
    info!(
        participant = %summary.participant,
        turns = summary.turns_completed,
        tool_calls = summary.tool_calls,
        "shutdown complete"
    );

    Ok(())
}
