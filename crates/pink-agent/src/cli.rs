//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Pink Agent - Telegram bridge to Claude Code
#[derive(Parser, Debug)]
#[command(name = "pink-agent")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run both agents under supervision (default)
    Run,

    /// Send a message or files to the configured Telegram user
    Send {
        /// Message text; used as the caption of the first file when files are given
        text: Option<String>,

        /// File to attach (repeatable)
        #[arg(short = 'f', long = "file")]
        files: Vec<PathBuf>,
    },
}

impl Cli {
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn,pink_agent=info",
            1 => "warn,pink_agent=debug,teloxide=info",
            _ => "warn,pink_agent=trace,teloxide=debug",
        }
    }
}
