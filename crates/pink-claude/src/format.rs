//! Rendering of tool invocations for chat.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static SYSTEM_REMINDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<system-reminder>.*?</system-reminder>").expect("Invalid reminder regex")
});
static BLANK_RUN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n\n+").expect("Invalid blank run regex"));
static LINE_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)→(.*)$").expect("Invalid line number regex"));

/// Longest file preview shown for a read.
const READ_PREVIEW_MAX: usize = 2000;

/// Extensions whose content is worth previewing.
const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".markdown", ".py", ".js", ".ts", ".jsx", ".tsx", ".html", ".css", ".scss",
    ".sass", ".json", ".yaml", ".yml", ".toml", ".ini", ".env", ".sh", ".bash", ".zsh", ".php",
    ".java", ".c", ".cpp", ".h", ".go", ".rs", ".xml", ".svg", ".sql", ".log", ".conf", ".config",
];

/// The tools we know how to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    Write,
    Edit,
    Read,
    Bash,
    Glob,
    Grep,
    Task,
    TodoWrite,
    Other(String),
}

impl ToolKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Write" => Self::Write,
            "Edit" => Self::Edit,
            "Read" => Self::Read,
            "Bash" => Self::Bash,
            "Glob" => Self::Glob,
            "Grep" => Self::Grep,
            "Task" => Self::Task,
            "TodoWrite" => Self::TodoWrite,
            other => Self::Other(other.to_string()),
        }
    }

    /// Renders one invocation. `None` means the tool is not shown at all.
    pub fn render(&self, input: &Value, result: Option<&str>) -> Option<String> {
        let field = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or("");

        let text = match self {
            Self::TodoWrite => return None,
            Self::Write => format!(
                "📝 Created: {}\n```\n{}\n```",
                field("file_path"),
                field("content")
            ),
            Self::Edit => render_edit(field("file_path"), field("old_string"), field("new_string"), result),
            Self::Read => render_read(field("file_path"), result),
            Self::Bash => render_bash(field("command"), result),
            Self::Glob => format!("🔍 Glob: {}", field("pattern")),
            Self::Grep => format!("🔍 Grep: {}", field("pattern")),
            Self::Task => format!("🤖 Agent: {}", field("description")),
            Self::Other(name) => format!("🔨 {}", name),
        };
        Some(text)
    }
}

fn render_edit(path: &str, old: &str, new: &str, result: Option<&str>) -> String {
    let needle = new.trim();
    let line_no = result.and_then(|r| {
        r.lines().find_map(|line| {
            let caps = LINE_NUMBER_REGEX.captures(line)?;
            caps[2].contains(needle).then(|| caps[1].to_string())
        })
    });

    match line_no {
        Some(n) => format!("✏️ Edited: {path}\n```\n{n}: - {old}\n{n}: + {new}\n```"),
        None => format!("✏️ Edited: {path}\n```\n- {old}\n+ {new}\n```"),
    }
}

fn render_read(path: &str, result: Option<&str>) -> String {
    let lower = path.to_lowercase();
    let is_text = TEXT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext));
    let Some(content) = result.filter(|_| is_text) else {
        return format!("👀 Read: {path}");
    };

    let content = clean_line_numbers(&clean_system_reminders(content));
    match content.char_indices().nth(READ_PREVIEW_MAX) {
        Some((cut, _)) => {
            let lines = content.matches('\n').count();
            format!(
                "👀 Read: {path}\n```\n{}\n...\n(truncated, {lines} lines total)\n```",
                &content[..cut]
            )
        }
        None => format!("👀 Read: {path}\n```\n{content}\n```"),
    }
}

fn render_bash(command: &str, result: Option<&str>) -> String {
    let output = result.map(clean_system_reminders).unwrap_or_default();
    if output.trim().is_empty() {
        format!("🔧 Bash: {command}")
    } else {
        format!("🔧 Bash: {command}\n```\n{output}\n```")
    }
}

/// Strips `<system-reminder>` blocks the CLI injects into tool results.
pub fn clean_system_reminders(text: &str) -> String {
    let stripped = SYSTEM_REMINDER_REGEX.replace_all(text, "");
    BLANK_RUN_REGEX
        .replace_all(&stripped, "\n\n")
        .trim()
        .to_string()
}

/// Turns `     12→code` read-tool lines into `12: code`.
pub fn clean_line_numbers(text: &str) -> String {
    text.split('\n')
        .map(|line| match LINE_NUMBER_REGEX.captures(line) {
            Some(caps) => format!("{}: {}", &caps[1], &caps[2]),
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_todo_is_hidden() {
        assert_eq!(ToolKind::from_name("TodoWrite").render(&json!({}), None), None);
    }

    #[test]
    fn test_unknown_tool_is_bare_name() {
        let out = ToolKind::from_name("WebFetch").render(&json!({"url": "x"}), Some("body"));
        assert_eq!(out.as_deref(), Some("🔨 WebFetch"));
    }

    #[test]
    fn test_write() {
        let out = ToolKind::Write
            .render(&json!({"file_path": "/a.txt", "content": "hi"}), None)
            .unwrap();
        assert_eq!(out, "📝 Created: /a.txt\n```\nhi\n```");
    }

    #[test]
    fn test_edit_with_line_number() {
        let input = json!({"file_path": "/a.rs", "old_string": "let a = 1;", "new_string": "let a = 2;"});
        let result = "The file was edited:\n     4→fn main() {\n     5→    let a = 2;\n";

        let out = ToolKind::Edit.render(&input, Some(result)).unwrap();
        assert_eq!(
            out,
            "✏️ Edited: /a.rs\n```\n5: - let a = 1;\n5: + let a = 2;\n```"
        );
    }

    #[test]
    fn test_edit_without_result() {
        let input = json!({"file_path": "/a.rs", "old_string": "a", "new_string": "b"});
        let out = ToolKind::Edit.render(&input, None).unwrap();
        assert_eq!(out, "✏️ Edited: /a.rs\n```\n- a\n+ b\n```");
    }

    #[test]
    fn test_read_text_file_is_cleaned() {
        let result = "     1→hello\n     2→world\n<system-reminder>secret</system-reminder>";
        let out = ToolKind::Read
            .render(&json!({"file_path": "/notes.MD"}), Some(result))
            .unwrap();
        assert_eq!(out, "👀 Read: /notes.MD\n```\n1: hello\n2: world\n```");
    }

    #[test]
    fn test_read_binary_or_unresolved_is_bare() {
        let png = ToolKind::Read.render(&json!({"file_path": "/x.png"}), Some("data"));
        assert_eq!(png.as_deref(), Some("👀 Read: /x.png"));

        let pending = ToolKind::Read.render(&json!({"file_path": "/x.txt"}), None);
        assert_eq!(pending.as_deref(), Some("👀 Read: /x.txt"));
    }

    #[test]
    fn test_read_is_capped() {
        let long = "y\n".repeat(1500);
        let out = ToolKind::Read
            .render(&json!({"file_path": "/big.log"}), Some(&long))
            .unwrap();
        assert!(out.contains("(truncated, 1499 lines total)"));
    }

    #[test]
    fn test_bash() {
        let input = json!({"command": "ls"});
        assert_eq!(
            ToolKind::Bash.render(&input, Some("a\nb")).as_deref(),
            Some("🔧 Bash: ls\n```\na\nb\n```")
        );
        assert_eq!(
            ToolKind::Bash
                .render(&input, Some("<system-reminder>x</system-reminder>"))
                .as_deref(),
            Some("🔧 Bash: ls")
        );
    }

    #[test]
    fn test_clean_system_reminders_collapses_blank_runs() {
        let text = "a\n\n<system-reminder>\nx\n</system-reminder>\n\nb";
        assert_eq!(clean_system_reminders(text), "a\n\nb");
    }
}
