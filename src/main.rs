use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tufti_chat::{Commands, Container, ContainerConfig, Router, DEFAULT_MAX_HISTORY_TURNS};

#[derive(Parser)]
#[command(name = "tufti")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Answer with canned replies instead of calling Azure OpenAI
    #[arg(long, global = true)]
    mock_llm: bool,

    /// Seconds to wait for a reply before giving up
    #[arg(long, global = true, default_value = "60")]
    timeout_secs: u64,

    /// Trailing history messages sent as context (0 sends everything)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_HISTORY_TURNS)]
    max_context_turns: usize,

    /// JSON transcript of earlier messages to page through
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false);
    // RUST_LOG wins over --verbose when set.
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        let subscriber = builder.with_env_filter(EnvFilter::from_default_env()).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = builder.with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let container = Container::new(ContainerConfig {
        mock_llm: cli.mock_llm,
        timeout_secs: cli.timeout_secs,
        max_context_turns: cli.max_context_turns,
        history_file: cli.history,
    })
    .await?;

    let router = Router::new(&container);
    let output = router.route(cli.command).await?;
    if !output.is_empty() {
        println!("{}", output);
    }

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn chat_requires_no_arguments_beyond_profile() {
        let cli = Cli::try_parse_from(["tufti", "--mock-llm", "chat", "--name", "Alice"]).unwrap();
        assert!(cli.mock_llm);
        assert_eq!(cli.max_context_turns, DEFAULT_MAX_HISTORY_TURNS);
        assert!(matches!(cli.command, Commands::Chat { no_stream: false, .. }));
    }

    #[test]
    fn ask_accepts_inline_profile() {
        let cli = Cli::try_parse_from([
            "tufti",
            "ask",
            "What is the plait?",
            "--name",
            "Alice",
            "--intent",
            "awareness",
            "--book",
            "tufti",
            "--book",
            "transurfing_1_5",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask { text, profile, .. } => {
                assert_eq!(text, "What is the plait?");
                assert_eq!(profile.books.len(), 2);
                assert!(profile.intent.is_some());
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn unknown_intent_is_rejected() {
        let res = Cli::try_parse_from(["tufti", "ask", "hi", "--name", "A", "--intent", "flying"]);
        assert!(res.is_err());
    }
}
