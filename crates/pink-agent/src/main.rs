//! Pink Agent entry point.

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pink_agent::cli::{Cli, Commands};
use pink_agent::supervisor::{self, DaemonSpec, Outcome, SignalFlags, Supervisor};
use pink_agent::{send, PidFile, DAEMONS};
use pink_core::{config, TelegramSettings};

type BoxResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn main() -> BoxResult<()> {
    let mut cli = Cli::parse();

    config::load_env();
    if pink_core::verbose_from_env() {
        cli.verbose = cli.verbose.max(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(),
        Commands::Send { text, files } => {
            let settings = TelegramSettings::from_env()?;
            let outgoing = send::plan(text, files)?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(send::send(&settings, outgoing))?;
            Ok(())
        }
    }
}

fn run() -> BoxResult<()> {
    if let Err(e) = config::ensure_all_dirs() {
        warn!(error = %e, "Failed to create all directories");
    }
    let pid_file = PidFile::acquire(config::supervisor_pid_file())?;

    let specs = DAEMONS
        .iter()
        .map(|name| DaemonSpec::locate(name))
        .collect::<pink_agent::Result<Vec<_>>>()?;
    let flags = SignalFlags::register()?;

    info!("Starting Pink Agent");
    match Supervisor::new(specs, flags).run()? {
        Outcome::Stopped => Ok(()),
        Outcome::DaemonDied { name, code } => {
            error!(daemon = %name, ?code, "Daemon exited, shut down the rest");
            Ok(())
        }
        Outcome::Restart => {
            match supervisor::install_dir() {
                Some(dir) => supervisor::update(&dir),
                None => warn!("Install directory unknown, restarting without update"),
            }
            info!("Restarting");
            drop(pid_file);
            Err(supervisor::restart_self().into())
        }
    }
}
