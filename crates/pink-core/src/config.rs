//! Shared filesystem layout for Pink Agent.
//!
//! Provides functions to locate the state directory and the files both
//! daemons share.
//!
//! # Storage Structure
//!
//! All application data is stored under `~/.pink-agent/`:
//!
//! ```text
//! ~/.pink-agent/
//! ├── queue/        # commands.jsonl and responses.jsonl
//! ├── state/        # session id, pending attachments, supervisor pid
//! └── config/       # .env with Telegram credentials
//! ```
//!
//! Downloads (voice notes, uploaded files) go to `<tmp>/pink-agent/`.
//!
//! # Environment Variables
//!
//! - `PINK_AGENT_STATE_DIR`: Override the base state directory
//! - `PINK_AGENT_CONFIG_DIR`: Override the config directory

use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable for custom state directory.
pub const STATE_DIR_ENV: &str = "PINK_AGENT_STATE_DIR";

/// Environment variable for custom config directory.
pub const CONFIG_DIR_ENV: &str = "PINK_AGENT_CONFIG_DIR";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".pink-agent";

/// Directory name used under the OS temp dir.
const TEMP_SUBDIR: &str = "pink-agent";

const QUEUE_SUBDIR: &str = "queue";
const STATE_SUBDIR: &str = "state";
const CONFIG_SUBDIR: &str = "config";

static STATE_DIR_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Get the Pink Agent state directory.
///
/// The state directory is determined by:
/// 1. `PINK_AGENT_STATE_DIR` environment variable if set
/// 2. `~/.pink-agent` if home directory is available
/// 3. `.pink-agent` in current directory as fallback
pub fn state_dir() -> PathBuf {
    STATE_DIR_CACHE
        .get_or_init(|| {
            std::env::var(STATE_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    dirs::home_dir()
                        .map(|h| h.join(DEFAULT_STATE_DIR))
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
                })
        })
        .clone()
}

/// Directory holding both queue files.
pub fn queue_dir() -> PathBuf {
    state_dir().join(QUEUE_SUBDIR)
}

/// Path of the commands queue (chat daemon writes, Claude daemon reads).
pub fn commands_queue_file() -> PathBuf {
    queue_dir().join("commands.jsonl")
}

/// Path of the responses queue (Claude workers write, chat daemon reads).
pub fn responses_queue_file() -> PathBuf {
    queue_dir().join("responses.jsonl")
}

/// Get the runtime state directory.
pub fn runtime_state_dir() -> PathBuf {
    state_dir().join(STATE_SUBDIR)
}

/// File holding the current backend session id.
pub fn session_file() -> PathBuf {
    runtime_state_dir().join("session")
}

/// File holding attachment paths waiting for the next prompt.
pub fn attachments_file() -> PathBuf {
    runtime_state_dir().join("attachments.json")
}

/// Supervisor PID file, used to refuse a second instance.
pub fn supervisor_pid_file() -> PathBuf {
    runtime_state_dir().join("supervisor.pid")
}

/// Get the user config directory.
///
/// Defaults to `~/.pink-agent/config/` or `PINK_AGENT_CONFIG_DIR` env var.
pub fn config_dir() -> PathBuf {
    std::env::var(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir().join(CONFIG_SUBDIR))
}

/// Get the .env file path (Telegram token, user id).
pub fn env_file() -> PathBuf {
    config_dir().join(".env")
}

/// Scratch directory for downloaded voice notes.
pub fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(TEMP_SUBDIR)
}

/// Scratch directory for uploaded files waiting to be referenced by a prompt.
pub fn files_dir() -> PathBuf {
    temp_dir().join("files")
}

/// Load `.env` from the config directory, then from the working directory.
///
/// Variables already present in the environment are never overridden.
pub fn load_env() {
    let env_path = env_file();
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
    let _ = dotenvy::dotenv();
}

/// Ensure the state directory and all subdirectories exist.
///
/// # Errors
/// Returns an error if any directory cannot be created.
pub fn ensure_all_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(queue_dir())?;
    std::fs::create_dir_all(runtime_state_dir())?;
    std::fs::create_dir_all(config_dir())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The state dir is cached process-wide, so these only check file names.

    #[test]
    fn test_queue_file_names() {
        assert!(commands_queue_file().ends_with("queue/commands.jsonl"));
        assert!(responses_queue_file().ends_with("queue/responses.jsonl"));
    }

    #[test]
    fn test_state_file_names() {
        assert!(session_file().ends_with("state/session"));
        assert!(attachments_file().ends_with("state/attachments.json"));
        assert!(supervisor_pid_file().ends_with("supervisor.pid"));
    }

    #[test]
    fn test_env_file_name() {
        assert!(env_file().ends_with(".env"));
    }

    #[test]
    fn test_temp_dirs_live_under_os_temp() {
        assert!(temp_dir().starts_with(std::env::temp_dir()));
        assert!(files_dir().ends_with("pink-agent/files"));
    }
}
