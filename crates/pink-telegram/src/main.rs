//! Pink Telegram Agent binary.
//!
//! Normally started by `pink-agent`:
//! ```bash
//! TELEGRAM_BOT_TOKEN=xxx TELEGRAM_USER_ID=123 pink-telegram-agent
//! ```

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use pink_core::{config, AgentSettings, TelegramSettings};
use pink_queue::QueueStore;
use pink_telegram::PinkBot;

/// Pink Telegram Agent - relays Telegram messages to Claude Code
#[derive(Parser, Debug)]
#[command(name = "pink-telegram-agent")]
#[command(about = "Telegram side of Pink Agent")]
struct Args {
    /// Verbose logging (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let verbose = if pink_core::verbose_from_env() {
        verbose.max(1)
    } else {
        verbose
    };
    let filter = match verbose {
        0 => "pink_telegram=info,pink_queue=info,teloxide=warn,notify=warn",
        1 => "pink_telegram=debug,pink_queue=debug,teloxide=info,notify=warn",
        _ => "pink_telegram=trace,pink_queue=trace,teloxide=debug,notify=info",
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

    tracing::info!("Starting Telegram agent");
    let telegram = TelegramSettings::from_env()?;
    let settings = AgentSettings::from_env();

    if let Err(e) = config::ensure_all_dirs() {
        tracing::warn!(error = %e, "Failed to create all directories");
    }

    let queue = QueueStore::new(config::commands_queue_file(), config::responses_queue_file());
    let bot = PinkBot::new(&telegram, &settings, queue);

    if !bot.transcriber().check_service().await {
        tracing::warn!("Transcriber is not available, voice messages will fail until it starts");
    }

    bot.run(shutdown_signal()).await?;
    tracing::info!("Telegram agent stopped");
    Ok(())
}
