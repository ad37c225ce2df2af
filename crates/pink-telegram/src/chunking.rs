//! Splitting long outgoing text into Telegram-sized messages.
//!
//! Splits prefer a blank line, then a newline, and only cut mid-line as a
//! last resort. Newline splits are only taken outside fenced code blocks; if a
//! cut lands inside one, the fence is closed at the end of the chunk and
//! reopened at the start of the next.

const FENCE: &str = "```";

/// Splits `text` into chunks of at most `max_len` characters (plus a closing
/// fence when a chunk ends inside a code block).
pub fn split_into_chunks(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text.to_string();

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_len {
            if !remaining.trim().is_empty() {
                chunks.push(remaining);
            }
            break;
        }

        // Byte offset of the `max_len`-th character.
        let limit = remaining
            .char_indices()
            .nth(max_len)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let window = &remaining[..limit];
        let outside_fence = |pos: usize| remaining[..pos].matches(FENCE).count() % 2 == 0;

        // A split at 0 would make an empty chunk.
        let split_at = window
            .rfind("\n\n")
            .filter(|&pos| pos > 0 && outside_fence(pos))
            .or_else(|| window.rfind('\n').filter(|&pos| pos > 0 && outside_fence(pos)))
            .unwrap_or(limit);

        let inside_fence = !outside_fence(split_at);
        let mut chunk = remaining[..split_at].trim_end().to_string();
        if inside_fence {
            chunk.push('\n');
            chunk.push_str(FENCE);
        }
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }

        let rest = remaining[split_at..].trim_start();
        remaining = if inside_fence && !rest.is_empty() {
            format!("{FENCE}\n{rest}")
        } else {
            rest.to_string()
        };
    }

    chunks
}

/// Marker put in front of chunk `index` (zero-based) of `total`.
///
/// Parentheses are reserved in MarkdownV2, so they are escaped there.
pub fn continuation_prefix(index: usize, total: usize, markdown: bool) -> String {
    if markdown {
        format!("\\(continued {}/{}\\)\n\n", index + 1, total)
    } else {
        format!("(continued {}/{})\n\n", index + 1, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drops whitespace (splits trim it) and fences (splits add them).
    fn squash(text: &str) -> String {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        compact.replace(FENCE, "")
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        assert_eq!(split_into_chunks("hello\n\nworld", 100), vec!["hello\n\nworld"]);
        assert_eq!(split_into_chunks("", 100), Vec::<String>::new());
    }

    #[test]
    fn test_prefers_blank_line() {
        let text = "aaaa\nbbbb\n\ncccc\ndddd";
        let chunks = split_into_chunks(text, 15);
        assert_eq!(chunks, vec!["aaaa\nbbbb", "cccc\ndddd"]);
    }

    #[test]
    fn test_falls_back_to_newline() {
        let text = "aaaa\nbbbb\ncccc";
        let chunks = split_into_chunks(text, 12);
        assert_eq!(chunks, vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn test_hard_cut_without_newlines() {
        let chunks = split_into_chunks(&"x".repeat(25), 10);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_leading_blank_lines_never_make_an_empty_chunk() {
        let text = format!("\n\n{}", "x".repeat(25));
        let chunks = split_into_chunks(&text, 10);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);

        let chunks = split_into_chunks(&format!("\n\n\n{}", "y".repeat(12)), 10);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()), "{chunks:?}");
    }

    #[test]
    fn test_whitespace_only_text_has_no_chunks() {
        assert!(split_into_chunks("   \n\n  ", 4).is_empty());
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "é".repeat(15);
        let chunks = split_into_chunks(&text, 10);
        assert_eq!(chunks, vec!["é".repeat(10), "é".repeat(5)]);
    }

    #[test]
    fn test_fence_is_closed_and_reopened() {
        let code: String = (0..10).map(|i| format!("line {i}\n")).collect();
        let text = format!("intro\n```\n{code}```\noutro");

        let chunks = split_into_chunks(&text, 40);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.matches(FENCE).count() % 2, 0, "unbalanced chunk: {chunk:?}");
        }
        assert!(chunks[1].starts_with("```\n"));
    }

    #[test]
    fn test_round_trip_preserves_content() {
        let code: String = (0..30).map(|i| format!("    let v{i} = {i};\n")).collect();
        let text = format!(
            "Here is the plan.\n\nFirst part of the answer.\n```rust\n{code}```\nAfter the code.\n\n{}",
            "tail words ".repeat(20)
        );

        let chunks = split_into_chunks(&text, 120);

        assert!(chunks.len() > 2);
        assert_eq!(squash(&chunks.concat()), squash(&text));
    }

    #[test]
    fn test_continuation_prefix() {
        assert_eq!(continuation_prefix(1, 3, false), "(continued 2/3)\n\n");
        assert_eq!(continuation_prefix(2, 3, true), "\\(continued 3/3\\)\n\n");
    }
}
