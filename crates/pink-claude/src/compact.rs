//! Auto-compaction: summarize the session, then hand the summary to a fresh one.

use tracing::{debug, info};

use crate::backend::ExecOptions;
use crate::error::{ClaudeError, Result};
use crate::parser;
use crate::session::SessionManager;

/// Directive that makes the CLI summarize the resumed session.
pub const SUMMARIZE_PROMPT: &str = "/summarize";

/// Builds the first prompt of the replacement session.
pub fn takeover_prompt(summary: &str) -> String {
    format!(
        "Previous session summary:\n\n{summary}\n\n\
        This is a session takeover/handoff. Read the listed files to load context, \
        then acknowledge that you're ready. DO NOT make any changes (edit files, \
        create files, commit, etc) - just read and report that you've loaded the context."
    )
}

/// Drops the usage counter and its blank line from a rendered summary.
pub fn extract_summary(rendered: &str) -> String {
    let lines: Vec<&str> = rendered.split('\n').collect();
    if lines.len() > 2 && lines[0].contains('/') {
        lines[2..].join("\n")
    } else {
        rendered.to_string()
    }
}

fn stage_error(stage: &'static str, err: ClaudeError) -> ClaudeError {
    match err {
        ClaudeError::Compact { .. } | ClaudeError::CompactTimeout(_) => err,
        ClaudeError::Timeout(limit) => ClaudeError::CompactTimeout(limit),
        other => ClaudeError::Compact {
            stage,
            reason: other.to_string(),
        },
    }
}

impl SessionManager {
    /// Replaces `current_session_id` with a new session seeded by its summary.
    ///
    /// Returns the new session id. Nothing is retried; on failure the stored
    /// session may already be gone and the user has to start over with `/new`
    /// or try `/compact` again.
    pub async fn perform_auto_compact(&self, current_session_id: &str) -> Result<String> {
        info!(session_id = %current_session_id, "Auto-compact triggered");
        let timeout = Some(self.settings().aux_timeout);

        debug!("Running summarize");
        let opts = ExecOptions::new()
            .resume(current_session_id)
            .structured()
            .with_timeout(timeout);
        let output = self
            .backend()
            .execute(SUMMARIZE_PROMPT, &opts)
            .await
            .map_err(|e| stage_error("summarize", e))?;
        if !output.success() {
            return Err(ClaudeError::Compact {
                stage: "summarize",
                reason: output.stderr.trim().to_string(),
            });
        }

        let rendered = parser::parse_output(
            output.stdout.trim(),
            current_session_id,
            self.settings().max_session_context,
        )
        .map_err(|e| stage_error("summary parsing", e))?;
        let summary = extract_summary(&rendered.text);

        debug!("Resetting session");
        self.reset_session()?;

        debug!("Creating new session from summary");
        let opts = ExecOptions::new().with_timeout(timeout);
        let output = self
            .backend()
            .execute(&takeover_prompt(&summary), &opts)
            .await
            .map_err(|e| stage_error("new session creation", e))?;
        if !output.success() {
            return Err(ClaudeError::Compact {
                stage: "new session creation",
                reason: output.stderr.trim().to_string(),
            });
        }

        let new_session_id = self
            .backend()
            .latest_session_id()
            .map_err(|e| stage_error("session discovery", e))?;
        self.write_session_id(&new_session_id)?;

        info!(session_id = %new_session_id, "Auto-compact completed");
        Ok(new_session_id)
    }
}
