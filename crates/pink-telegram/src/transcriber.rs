//! Voice transcription through the external `pink-transcriber` CLI.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, TelegramError};

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(120);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Transcriber {
    bin: String,
    timeout: Duration,
}

impl Transcriber {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            timeout: TRANSCRIBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True when `<bin> --health` exits successfully within five seconds.
    pub async fn check_service(&self) -> bool {
        let run = Command::new(&self.bin)
            .arg("--health")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        matches!(
            tokio::time::timeout(HEALTH_TIMEOUT, run).await,
            Ok(Ok(status)) if status.success()
        )
    }

    /// Transcribes an audio file to text.
    pub async fn transcribe(&self, audio: &Path) -> Result<String> {
        if !audio.exists() {
            return Err(TelegramError::Transcription(format!(
                "audio file not found: {}",
                audio.display()
            )));
        }

        debug!(path = %audio.display(), "Transcribing");
        let run = Command::new(&self.bin)
            .arg(audio)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Err(_) => {
                return Err(TelegramError::Transcription(format!(
                    "timed out after {} seconds",
                    self.timeout.as_secs()
                )))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TelegramError::Transcription(format!(
                    "{} not found. Make sure it is installed and running.",
                    self.bin
                )))
            }
            Ok(result) => result?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                "Unknown error".to_string()
            } else {
                stderr
            };
            return Err(TelegramError::Transcription(reason));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(TelegramError::Transcription(
                "transcription returned empty result".into(),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{tempdir, TempDir};

    fn script(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("transcriber");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn audio(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("1.ogg");
        std::fs::write(&path, b"OggS").unwrap();
        path
    }

    #[tokio::test]
    async fn test_transcribe_returns_trimmed_stdout() {
        let dir = tempdir().unwrap();
        let t = Transcriber::new(script(&dir, "echo '  hello world  '"));
        assert_eq!(t.transcribe(&audio(&dir)).await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let dir = tempdir().unwrap();
        let t = Transcriber::new(script(&dir, "echo 'model missing' >&2; exit 3"));
        let err = t.transcribe(&audio(&dir)).await.unwrap_err();
        assert_eq!(err.to_string(), "Transcription failed: model missing");
    }

    #[tokio::test]
    async fn test_empty_output_is_an_error() {
        let dir = tempdir().unwrap();
        let t = Transcriber::new(script(&dir, "exit 0"));
        assert!(t.transcribe(&audio(&dir)).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_audio_file() {
        let dir = tempdir().unwrap();
        let t = Transcriber::new(script(&dir, "echo hi"));
        let err = t.transcribe(&dir.path().join("nope.ogg")).await.unwrap_err();
        assert!(err.to_string().contains("audio file not found"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempdir().unwrap();
        let healthy = Transcriber::new(script(&dir, "exit 0"));
        assert!(healthy.check_service().await);

        let missing = Transcriber::new("/nonexistent/pink-transcriber");
        assert!(!missing.check_service().await);
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempdir().unwrap();
        let t = Transcriber::new(script(&dir, "sleep 5"))
            .with_timeout(Duration::from_millis(200));
        let err = t.transcribe(&audio(&dir)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
