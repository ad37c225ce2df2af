//! Pink Claude Agent binary.
//!
//! `pink-claude-agent` (or `pink-claude-agent run`) watches the commands queue.
//! `pink-claude-agent worker` executes a single command read from stdin; the
//! daemon spawns it for every claimed entry.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use pink_claude::{ClaudeCli, CommandProcessor, FileSessionStore, ProcessLauncher, Worker};
use pink_core::{config, AgentSettings};
use pink_queue::{QueueMonitor, QueueStore};

/// Pink Claude Agent - runs queued prompts through Claude Code
#[derive(Parser, Debug)]
#[command(name = "pink-claude-agent")]
#[command(about = "Executes queued Telegram prompts with Claude Code")]
struct Args {
    #[command(subcommand)]
    command: Option<Mode>,

    /// Verbose logging (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Watch the commands queue (default)
    Run,
    /// Execute one command and append its response
    Worker {
        #[arg(long)]
        message_id: i64,
        /// Command text; read from stdin when omitted
        #[arg(long, allow_hyphen_values = true)]
        content: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let verbose = if pink_core::verbose_from_env() {
        verbose.max(1)
    } else {
        verbose
    };
    let filter = match verbose {
        0 => "pink_claude=info,pink_queue=info,notify=warn",
        1 => "pink_claude=debug,pink_queue=debug,notify=warn",
        _ => "pink_claude=trace,pink_queue=trace,notify=info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(filter))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());
    match (interrupt, terminate) {
        (Ok(mut interrupt), Ok(mut terminate)) => {
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
        }
        _ => {
            tracing::warn!("Signal handlers unavailable, falling back to Ctrl-C");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    config::load_env();
    init_logging(args.verbose);

    let settings = AgentSettings::from_env();
    let queue = QueueStore::new(config::commands_queue_file(), config::responses_queue_file());

    match args.command.unwrap_or(Mode::Run) {
        Mode::Run => {
            tracing::info!("Starting Claude agent");
            if let Err(e) = config::ensure_all_dirs() {
                tracing::warn!(error = %e, "Failed to create all directories");
            }
            queue.ensure_files()?;

            let launcher = Arc::new(ProcessLauncher::current_exe()?);
            let processor = Arc::new(CommandProcessor::new(queue.clone(), launcher));
            let mut monitor = QueueMonitor::new(queue.commands().path());

            processor.run(&mut monitor, shutdown_signal()).await?;
            monitor.cleanup();
            tracing::info!("Claude agent stopped");
        }
        Mode::Worker {
            message_id,
            content,
        } => {
            let content = match content {
                Some(content) => content,
                None => {
                    let mut content = String::new();
                    tokio::io::stdin().read_to_string(&mut content).await?;
                    content
                }
            };
            let worker = Worker::new(
                Arc::new(ClaudeCli::new(&settings)),
                Arc::new(FileSessionStore::new(config::session_file())),
                queue,
                settings,
            );
            worker.run(message_id, &content).await?;
        }
    }

    Ok(())
}
