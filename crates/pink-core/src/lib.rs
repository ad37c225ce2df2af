//! Pink Agent Core - shared pieces used by both daemons and the supervisor.
//!
//! - **config**: filesystem layout (queues, session file, attachments, temp dirs)
//! - **settings**: policy values and credentials read from the environment
//! - **messages**: user-facing texts

pub mod config;
pub mod messages;
pub mod settings;

pub use config::{
    attachments_file, commands_queue_file, config_dir, ensure_all_dirs, env_file, files_dir,
    load_env, queue_dir, responses_queue_file, runtime_state_dir, session_file, state_dir,
    supervisor_pid_file, temp_dir,
};
pub use settings::{verbose_from_env, AgentSettings, SettingsError, TelegramSettings};
