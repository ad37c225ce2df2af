//! Delivery of the responses queue to the chat.
//!
//! The head entry is only deleted after every chunk went out, so a failed
//! send leaves it in place and it is retried. One delivery runs at a time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use pink_core::messages::{ERROR_PREFIX, REACTION_DONE, TRANSCRIPTION_PREFIX};
use pink_queue::{QueueMonitor, QueueStore, ResponseEntry};

use crate::chunking::{continuation_prefix, split_into_chunks};
use crate::error::Result;
use crate::markdown::to_markdown_v2;
use crate::notifier::Notifier;

/// Pause before retrying a failed delivery.
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct ResponseDispatcher {
    queue: QueueStore,
    notifier: Arc<dyn Notifier>,
    max_len: usize,
    retry_delay: Duration,
    flight: Mutex<()>,
}

impl ResponseDispatcher {
    pub fn new(queue: QueueStore, notifier: Arc<dyn Notifier>, max_len: usize) -> Self {
        Self {
            queue,
            notifier,
            max_len,
            retry_delay: RETRY_DELAY,
            flight: Mutex::new(()),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Delivers the head response and removes it. Returns `false` when the
    /// queue was empty.
    pub async fn process_next(&self) -> Result<bool> {
        let _flight = self.flight.lock().await;

        let Some(entry) = self.queue.read_first_response()? else {
            return Ok(false);
        };

        self.deliver(&entry).await?;

        if let Err(e) = self
            .notifier
            .set_reaction(entry.message_id, REACTION_DONE)
            .await
        {
            debug!(message_id = entry.message_id, error = %e, "Could not set done reaction");
        }

        self.queue.delete_first_response()?;

        if entry.output.starts_with(TRANSCRIPTION_PREFIX) {
            debug!(message_id = entry.message_id, "Transcription sent");
        } else {
            debug!(message_id = entry.message_id, "Response sent");
        }
        Ok(true)
    }

    /// Delivers responses until the queue is empty. Returns how many went out.
    pub async fn drain(&self) -> Result<usize> {
        let mut count = 0;
        while self.process_next().await? {
            count += 1;
        }
        Ok(count)
    }

    /// Drains, retrying after a pause whenever a delivery fails.
    pub async fn drain_with_retry(&self) -> usize {
        let mut delivered = 0;
        loop {
            match self.process_next().await {
                Ok(true) => delivered += 1,
                Ok(false) => return delivered,
                Err(e) => {
                    error!(error = %e, "Send failed, will retry");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn deliver(&self, entry: &ResponseEntry) -> Result<()> {
        let (text, markdown) = if entry.output.starts_with(ERROR_PREFIX) {
            (entry.output.clone(), false)
        } else {
            (to_markdown_v2(&entry.output), true)
        };

        if text.trim().is_empty() {
            warn!(message_id = entry.message_id, "Empty response, nothing to send");
            return Ok(());
        }

        let chunks = if text.chars().count() <= self.max_len {
            vec![text]
        } else {
            split_into_chunks(&text, self.max_len)
        };
        let total = chunks.len();

        for (i, chunk) in chunks.into_iter().enumerate() {
            if i == 0 {
                self.send_with_fallback(&chunk, Some(entry.message_id), markdown)
                    .await?;
            } else {
                let body = continuation_prefix(i, total, markdown) + &chunk;
                self.send_with_fallback(&body, None, markdown).await?;
            }
        }
        Ok(())
    }

    /// Sends as MarkdownV2 and, if Telegram rejects the markup, once more as
    /// plain text.
    async fn send_with_fallback(&self, text: &str, reply_to: Option<i64>, markdown: bool) -> Result<()> {
        match self.notifier.send_text(text, reply_to, markdown).await {
            Err(e) if markdown && e.is_markup_error() => {
                warn!(error = %e, "Markdown parsing failed, retrying with plain text");
                self.notifier.send_text(text, reply_to, false).await
            }
            other => other,
        }
    }

    /// Runs until `shutdown` resolves.
    pub async fn run<S>(self: Arc<Self>, monitor: &mut QueueMonitor, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        info!("Response sender started");

        let dispatcher = Arc::clone(&self);
        monitor.start(move || {
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                dispatcher.drain_with_retry().await;
            }
        })?;

        let backlog = tokio::spawn({
            let dispatcher = Arc::clone(&self);
            async move {
                let n = dispatcher.drain_with_retry().await;
                if n > 0 {
                    info!(count = n, "Delivered queued backlog");
                }
            }
        });

        shutdown.await;
        info!("Shutting down response sender");

        monitor.shutdown();
        backlog.abort();
        monitor.cleanup_async().await;
        Ok(())
    }
}
