//! End-to-end command handling against a scripted backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use pink_claude::{
    Backend, BackendOutput, ClaudeError, CommandProcessor, ExecOptions, MemorySessionStore,
    SessionStore, Worker, WorkerLauncher,
};
use pink_core::{messages, AgentSettings};
use pink_queue::{CommandEntry, QueueStore, ResponseEntry};

const SESSION: &str = "abcdef1234567890";
const NEW_SESSION: &str = "fedcba9876543210";

/// Plays back canned outputs and records every call.
#[derive(Default)]
struct StubBackend {
    outputs: Mutex<VecDeque<pink_claude::Result<BackendOutput>>>,
    session_ids: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(String, ExecOptions)>>,
}

impl StubBackend {
    fn new() -> Self {
        Self::default()
    }

    fn then_ok(self, stdout: &str) -> Self {
        self.outputs.lock().unwrap().push_back(Ok(BackendOutput {
            status: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }));
        self
    }

    fn then_fail(self, stderr: &str) -> Self {
        self.outputs.lock().unwrap().push_back(Ok(BackendOutput {
            status: 1,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }));
        self
    }

    fn then_timeout(self, secs: u64) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .push_back(Err(ClaudeError::Timeout(Duration::from_secs(secs))));
        self
    }

    fn then_session(self, id: &str) -> Self {
        self.session_ids.lock().unwrap().push_back(id.to_string());
        self
    }

    fn calls(&self) -> Vec<(String, ExecOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn execute(&self, prompt: &str, opts: &ExecOptions) -> pink_claude::Result<BackendOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), opts.clone()));
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(BackendOutput::default()))
    }

    fn latest_session_id(&self) -> pink_claude::Result<String> {
        self.session_ids
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ClaudeError::SessionDiscovery("no session logs".into()))
    }
}

/// Runs the worker in-process instead of spawning a child.
struct InlineLauncher {
    worker: Worker,
}

#[async_trait]
impl WorkerLauncher for InlineLauncher {
    async fn run(&self, entry: CommandEntry) -> pink_claude::Result<()> {
        self.worker.run(entry.message_id, &entry.content).await
    }

    fn terminate(&self) {}
}

fn usage_events(text: &str, input: u64, cache_read: u64) -> String {
    serde_json::json!([{
        "type": "assistant",
        "message": {
            "content": [{"type": "text", "text": text}],
            "usage": {
                "input_tokens": input,
                "cache_creation_input_tokens": 0,
                "cache_read_input_tokens": cache_read
            }
        }
    }])
    .to_string()
}

struct Harness {
    _dir: tempfile::TempDir,
    queue: QueueStore,
    store: Arc<MemorySessionStore>,
    backend: Arc<StubBackend>,
    processor: CommandProcessor,
}

fn harness(backend: StubBackend, store: MemorySessionStore) -> Harness {
    let dir = tempdir().unwrap();
    let queue = QueueStore::in_dir(dir.path());
    queue.ensure_files().unwrap();
    let backend = Arc::new(backend);
    let store = Arc::new(store);
    let worker = Worker::new(
        backend.clone(),
        store.clone(),
        queue.clone(),
        AgentSettings::default(),
    );
    let processor = CommandProcessor::new(queue.clone(), Arc::new(InlineLauncher { worker }));
    Harness {
        _dir: dir,
        queue,
        store,
        backend,
        processor,
    }
}

fn responses(queue: &QueueStore) -> Vec<ResponseEntry> {
    queue.responses().read_all().unwrap()
}

#[tokio::test]
async fn test_simple_round_trip_creates_session() {
    let backend = StubBackend::new()
        .then_ok("bootstrapped")
        .then_session(SESSION)
        .then_ok(r#"[{"type":"assistant","message":{"content":[{"type":"text","text":"hi there"}],"usage":{"input_tokens":10,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}]"#);
    let h = harness(backend, MemorySessionStore::new());
    h.queue.append_command(42, "hello").unwrap();

    assert_eq!(h.processor.drain().await.unwrap(), 1);

    assert_eq!(
        responses(&h.queue),
        vec![ResponseEntry::new(42, "10 / 200000 | abcdef12\n\nhi there")]
    );
    assert!(h.queue.read_first_command().unwrap().is_none());
    assert_eq!(h.store.read().unwrap().as_deref(), Some(SESSION));

    let calls = h.backend.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1.resume, None);
    assert_eq!(calls[1].0, "hello");
    assert_eq!(calls[1].1.resume.as_deref(), Some(SESSION));
    assert!(calls[1].1.structured_output);
}

#[tokio::test]
async fn test_threshold_triggers_compaction() {
    let summary = serde_json::json!([{
        "type": "assistant",
        "message": {
            "content": [{"type": "text", "text": "Worked on the parser."}],
            "usage": {"input_tokens": 5}
        }
    }])
    .to_string();
    let backend = StubBackend::new()
        .then_ok(&usage_events("answer", 10_000, 180_000))
        .then_ok(&summary)
        .then_ok("loaded")
        .then_session(NEW_SESSION);
    let h = harness(backend, MemorySessionStore::with_session(SESSION));
    h.queue.append_command(7, "big question").unwrap();

    h.processor.drain().await.unwrap();

    let out = responses(&h.queue);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].output, "190000 / 200000 | abcdef12\n\nanswer");
    assert_eq!(out[1].output, messages::auto_compact_notification(180_000));
    assert_eq!(out[2].output, messages::compact_success(NEW_SESSION));
    assert!(out.iter().all(|r| r.message_id == 7));
    assert_eq!(h.store.read().unwrap().as_deref(), Some(NEW_SESSION));

    let calls = h.backend.calls();
    assert_eq!(calls[1].0, "/summarize");
    assert_eq!(calls[1].1.resume.as_deref(), Some(SESSION));
    assert!(calls[2].0.contains("Worked on the parser."));
    assert!(!calls[2].0.contains("abcdef12"));
    assert_eq!(calls[2].1.resume, None);
}

#[tokio::test]
async fn test_compaction_failure_keeps_original_answer() {
    let backend = StubBackend::new()
        .then_ok(&usage_events("answer", 0, 185_000))
        .then_fail("summarize exploded");
    let h = harness(backend, MemorySessionStore::with_session(SESSION));
    h.queue.append_command(8, "q").unwrap();

    h.processor.drain().await.unwrap();

    let out = responses(&h.queue);
    assert_eq!(out.len(), 3);
    assert!(out[0].output.ends_with("answer"));
    assert!(out[2].output.starts_with("❌ Auto-compact failed: summarize failed"));
    assert!(out[2].output.contains("/new"));
}

#[tokio::test]
async fn test_compaction_timeout_is_named() {
    let backend = StubBackend::new()
        .then_ok(&usage_events("answer", 0, 185_000))
        .then_timeout(120);
    let h = harness(backend, MemorySessionStore::with_session(SESSION));
    h.queue.append_command(12, "q").unwrap();

    h.processor.drain().await.unwrap();

    let out = responses(&h.queue);
    assert_eq!(out.len(), 3);
    assert_eq!(
        out[2].output,
        messages::compact_failed("Auto-compact timeout (>120 seconds)")
    );
}

#[tokio::test]
async fn test_out_of_memory_suggests_new_session() {
    let backend = StubBackend::new().then_fail("FATAL ERROR: heap out of memory");
    let h = harness(backend, MemorySessionStore::with_session(SESSION));
    h.queue.append_command(3, "hello").unwrap();

    h.processor.drain().await.unwrap();

    let out = responses(&h.queue);
    assert_eq!(out.len(), 1);
    assert!(out[0].output.starts_with(messages::ERROR_PREFIX));
    assert!(out[0].output.contains("/new"));
    assert!(!out[0].output.contains("FATAL"));
}

#[tokio::test]
async fn test_unparseable_output_is_shown_raw() {
    let backend = StubBackend::new().then_ok("plain answer\n");
    let h = harness(backend, MemorySessionStore::with_session(SESSION));
    h.queue.append_command(4, "hello").unwrap();

    h.processor.drain().await.unwrap();

    assert_eq!(responses(&h.queue), vec![ResponseEntry::new(4, "plain answer")]);
}

#[tokio::test]
async fn test_empty_output_is_done() {
    let backend = StubBackend::new().then_ok("   ");
    let h = harness(backend, MemorySessionStore::with_session(SESSION));
    h.queue.append_command(5, "hello").unwrap();

    h.processor.drain().await.unwrap();

    assert_eq!(responses(&h.queue), vec![ResponseEntry::new(5, "Done")]);
}

#[tokio::test]
async fn test_session_discovery_failure_is_reported() {
    let backend = StubBackend::new().then_ok("bootstrapped");
    let h = harness(backend, MemorySessionStore::new());
    h.queue.append_command(6, "hello").unwrap();

    h.processor.drain().await.unwrap();

    let out = responses(&h.queue);
    assert_eq!(out.len(), 1);
    assert!(out[0].output.starts_with("❌ Error: session discovery failed"));
}

#[tokio::test]
async fn test_new_command_resets_session() {
    let h = harness(StubBackend::new(), MemorySessionStore::with_session(SESSION));
    h.queue.append_command(9, "/new").unwrap();

    h.processor.drain().await.unwrap();

    assert_eq!(
        responses(&h.queue),
        vec![ResponseEntry::new(9, messages::NEW_SESSION)]
    );
    assert_eq!(h.store.read().unwrap(), None);
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_compact_command_without_session() {
    let h = harness(StubBackend::new(), MemorySessionStore::new());
    h.queue.append_command(10, "/compact").unwrap();

    h.processor.drain().await.unwrap();

    assert_eq!(
        responses(&h.queue),
        vec![ResponseEntry::new(10, messages::NO_SESSION)]
    );
}

#[tokio::test]
async fn test_compact_command_with_session() {
    let backend = StubBackend::new()
        .then_ok(&usage_events("summary", 1, 0))
        .then_ok("ok")
        .then_session(NEW_SESSION);
    let h = harness(backend, MemorySessionStore::with_session(SESSION));
    h.queue.append_command(11, "/compact").unwrap();

    h.processor.drain().await.unwrap();

    let out: Vec<String> = responses(&h.queue).into_iter().map(|r| r.output).collect();
    assert_eq!(
        out,
        vec![
            messages::COMPACT_STARTING.to_string(),
            messages::compact_success(NEW_SESSION)
        ]
    );
}
