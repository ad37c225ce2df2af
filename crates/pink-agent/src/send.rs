//! `pink-agent send`: push text or files to the configured Telegram user.

use std::path::{Path, PathBuf};

use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::info;

use pink_core::TelegramSettings;

use crate::error::{Result, SupervisorError};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "heic",
];

/// Whether a file goes out as a photo rather than a document.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// One Bot API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Photo {
        path: PathBuf,
        caption: Option<String>,
    },
    Document {
        path: PathBuf,
        caption: Option<String>,
    },
}

/// Turns the command line into Bot API calls. With files, the text becomes
/// the caption of the first one.
pub fn plan(text: Option<String>, files: Vec<PathBuf>) -> Result<Vec<Outgoing>> {
    let text = text.filter(|t| !t.trim().is_empty());
    if text.is_none() && files.is_empty() {
        return Err(SupervisorError::NothingToSend);
    }
    if let Some(missing) = files.iter().find(|f| !f.is_file()) {
        return Err(SupervisorError::FileNotFound(missing.clone()));
    }

    if files.is_empty() {
        return Ok(text.into_iter().map(Outgoing::Text).collect());
    }

    let mut caption = text;
    Ok(files
        .into_iter()
        .map(|path| {
            let caption = caption.take();
            if is_image(&path) {
                Outgoing::Photo { path, caption }
            } else {
                Outgoing::Document { path, caption }
            }
        })
        .collect())
}

/// Sends everything in order, stopping at the first failure.
pub async fn send(settings: &TelegramSettings, outgoing: Vec<Outgoing>) -> Result<()> {
    let bot = Bot::new(&settings.bot_token);
    let chat_id = ChatId(settings.user_id);

    for item in outgoing {
        match item {
            Outgoing::Text(text) => {
                bot.send_message(chat_id, text).await?;
                info!("Message sent");
            }
            Outgoing::Photo { path, caption } => {
                let mut request = bot.send_photo(chat_id, InputFile::file(&path));
                if let Some(caption) = caption {
                    request = request.caption(caption);
                }
                request.await?;
                info!(file = %path.display(), "Photo sent");
            }
            Outgoing::Document { path, caption } => {
                let mut request = bot.send_document(chat_id, InputFile::file(&path));
                if let Some(caption) = caption {
                    request = request.caption(caption);
                }
                request.await?;
                info!(file = %path.display(), "Document sent");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("shot.PNG")));
        assert!(is_image(Path::new("/tmp/a.jpeg")));
        assert!(is_image(Path::new("scan.heic")));
        assert!(!is_image(Path::new("report.pdf")));
        assert!(!is_image(Path::new("Makefile")));
    }

    #[test]
    fn test_plan_text_only() {
        let plan = plan(Some("hello".into()), vec![]).unwrap();
        assert_eq!(plan, vec![Outgoing::Text("hello".into())]);
    }

    #[test]
    fn test_plan_caption_goes_to_first_file() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("a.png");
        let doc = dir.path().join("b.txt");
        fs::write(&photo, b"png").unwrap();
        fs::write(&doc, b"txt").unwrap();

        let plan = plan(Some("look".into()), vec![photo.clone(), doc.clone()]).unwrap();

        assert_eq!(
            plan,
            vec![
                Outgoing::Photo {
                    path: photo,
                    caption: Some("look".into()),
                },
                Outgoing::Document {
                    path: doc,
                    caption: None,
                },
            ]
        );
    }

    #[test]
    fn test_plan_nothing_to_send() {
        assert!(matches!(plan(None, vec![]), Err(SupervisorError::NothingToSend)));
        assert!(matches!(
            plan(Some("  ".into()), vec![]),
            Err(SupervisorError::NothingToSend)
        ));
    }

    #[test]
    fn test_plan_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone.pdf");
        let err = plan(Some("x".into()), vec![missing.clone()]).unwrap_err();
        assert!(matches!(err, SupervisorError::FileNotFound(p) if p == missing));
    }
}
