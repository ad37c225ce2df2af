//! Parser for the CLI's `--output-format=json` event array.
//!
//! The array mixes `assistant` events (text, tool calls, token usage) and
//! `user` events (tool results). Tool calls are collected in a first pass and
//! their results filled in by a second one, since a result always refers back
//! to a call by id.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{ClaudeError, Result};
use crate::format::ToolKind;

/// Token counters from one `usage` snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

impl Usage {
    /// Tokens the session currently occupies.
    pub fn context_size(&self) -> u64 {
        self.input_tokens + self.cache_creation_input_tokens + self.cache_read_input_tokens
    }
}

/// One tool call and, once seen, its result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolAction {
    pub kind: ToolKind,
    pub input: Value,
    pub result: Option<String>,
}

impl ToolAction {
    pub fn render(&self) -> Option<String> {
        self.kind.render(&self.input, self.result.as_deref())
    }
}

/// Everything extracted from one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEvents {
    pub actions: Vec<ToolAction>,
    pub texts: Vec<String>,
    /// Last non-empty usage snapshot.
    pub usage: Option<Usage>,
}

/// Display text plus the context size it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    pub text: String,
    pub context_size: u64,
}

/// Extracts tool calls, texts and usage from an event array.
pub fn extract(raw: &str) -> Result<ParsedEvents> {
    let events: Value = serde_json::from_str(raw).map_err(|e| ClaudeError::Parse(e.to_string()))?;
    let events = events
        .as_array()
        .ok_or_else(|| ClaudeError::Parse("expected a JSON array of events".into()))?;

    let mut parsed = ParsedEvents::default();
    let mut by_id: HashMap<String, usize> = HashMap::new();

    for message in events_of(events, "assistant") {
        if let Some(usage) = message.get("usage").filter(|u| is_non_empty(u)) {
            let usage = Usage::deserialize(usage).map_err(|e| ClaudeError::Parse(e.to_string()))?;
            parsed.usage = Some(usage);
        }

        for block in content_blocks(message) {
            match block.get("type").and_then(Value::as_str) {
                Some("tool_use") => {
                    let id = str_field(block, "id").to_string();
                    let action = ToolAction {
                        kind: ToolKind::from_name(str_field(block, "name")),
                        input: block.get("input").cloned().unwrap_or(Value::Null),
                        result: None,
                    };
                    match by_id.get(&id) {
                        Some(&idx) => parsed.actions[idx] = action,
                        None => {
                            by_id.insert(id, parsed.actions.len());
                            parsed.actions.push(action);
                        }
                    }
                }
                Some("text") => parsed.texts.push(str_field(block, "text").to_string()),
                _ => {}
            }
        }
    }

    for message in events_of(events, "user") {
        for block in content_blocks(message) {
            if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                continue;
            }
            if let Some(&idx) = by_id.get(str_field(block, "tool_use_id")) {
                parsed.actions[idx].result = Some(result_text(block.get("content")));
            }
        }
    }

    Ok(parsed)
}

/// Parses `raw` and renders it for chat.
///
/// The first line is a `<used> / <ceiling> | <short id>` counter when usage and
/// a session id are known, followed by the rendered tool calls and then the
/// text blocks, all separated by blank lines.
pub fn parse_output(raw: &str, session_id: &str, max_context: u64) -> Result<ParsedOutput> {
    let parsed = extract(raw)?;
    if parsed.usage.is_none() {
        warn!("No usage found in events");
    }
    let context_size = parsed.usage.map(|u| u.context_size()).unwrap_or(0);

    let mut sections = Vec::new();
    if parsed.usage.is_some() && !session_id.is_empty() {
        sections.push(format!(
            "{} / {} | {}",
            context_size,
            max_context,
            pink_core::messages::short_id(session_id)
        ));
    }

    let actions: Vec<String> = parsed.actions.iter().filter_map(ToolAction::render).collect();
    if !actions.is_empty() {
        sections.push(actions.join("\n\n"));
    }
    if !parsed.texts.is_empty() {
        sections.push(parsed.texts.join("\n\n"));
    }

    Ok(ParsedOutput {
        text: sections.join("\n\n"),
        context_size,
    })
}

fn events_of<'a>(events: &'a [Value], kind: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    events
        .iter()
        .filter(move |e| e.get("type").and_then(Value::as_str) == Some(kind))
        .filter_map(|e| e.get("message"))
}

fn content_blocks(message: &Value) -> impl Iterator<Item = &Value> {
    message
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn is_non_empty(value: &Value) -> bool {
    value.as_object().is_some_and(|o| !o.is_empty())
}

/// Tool results are either a string or a list of text blocks.
fn result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}
