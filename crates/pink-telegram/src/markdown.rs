//! Conversion of Claude's Markdown into Telegram MarkdownV2.
//!
//! The input is parsed with pulldown-cmark and re-emitted entity by entity.
//! MarkdownV2 rejects any unescaped reserved character, so all text gets
//! backslashes. Inside code only backticks and backslashes are escaped.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// Characters with meaning in MarkdownV2 outside code.
const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    '\\',
];

/// Escapes text for use outside any entity.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escapes text for use inside `code` or a ``` block.
pub fn escape_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '`' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        if c == ')' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Converts Markdown to MarkdownV2.
pub fn to_markdown_v2(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut renderer = Renderer::new();
    for event in Parser::new_ext(text, options) {
        renderer.event(event);
    }
    renderer.out
}

/// An inline entity that may nest but must not be reopened while open.
#[derive(Clone, Copy)]
enum Style {
    Bold,
    Italic,
    Strike,
}

impl Style {
    fn marker(self) -> &'static str {
        match self {
            Style::Bold => "*",
            Style::Italic => "_",
            Style::Strike => "~",
        }
    }
}

struct Renderer {
    out: String,
    /// Open depth per style; a marker is written only on 0 <-> 1.
    depth: [usize; 3],
    /// Next number for each open list, `None` for bullets.
    lists: Vec<Option<u64>>,
    links: Vec<String>,
    quote_depth: usize,
    in_code_block: bool,
    at_line_start: bool,
    /// A bullet was just written and the item has no content yet.
    fresh_item: bool,
    /// Byte offset right after the last italic marker.
    italic_end: Option<usize>,
}

impl Renderer {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: [0; 3],
            lists: Vec::new(),
            links: Vec::new(),
            quote_depth: 0,
            in_code_block: false,
            at_line_start: true,
            fresh_item: false,
            italic_end: None,
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                let text = if self.in_code_block {
                    escape_code(&text)
                } else {
                    escape(&text)
                };
                self.raw(&text);
            }
            Event::Code(code) => {
                let code = format!("`{}`", escape_code(&code));
                self.raw(&code);
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let html = escape(&html);
                self.raw(&html);
            }
            Event::SoftBreak | Event::HardBreak => self.raw("\n"),
            Event::Rule => {
                self.block_break();
                self.raw(&escape("---"));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.block_break(),
            Tag::Heading { .. } => {
                self.block_break();
                self.open(Style::Bold);
            }
            Tag::BlockQuote(..) => {
                self.block_break();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.block_break();
                let lang: String = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .chars()
                        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_'))
                        .collect(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.raw(&format!("```{lang}\n"));
                self.in_code_block = true;
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.block_break();
                }
                self.lists.push(start);
            }
            Tag::Item => {
                if !self.out.is_empty() {
                    self.newlines(1);
                }
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let bullet = format!("{n}\\. ");
                        *n += 1;
                        bullet
                    }
                    _ => "• ".to_string(),
                };
                self.raw(&format!("{indent}{bullet}"));
                self.fresh_item = true;
            }
            Tag::Emphasis => self.open(Style::Italic),
            Tag::Strong => self.open(Style::Bold),
            Tag::Strikethrough => self.open(Style::Strike),
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.raw("[");
                self.links.push(dest_url.to_string());
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => self.close(Style::Bold),
            TagEnd::BlockQuote(..) => self.quote_depth = self.quote_depth.saturating_sub(1),
            TagEnd::CodeBlock => {
                if !self.out.ends_with('\n') {
                    self.raw("\n");
                }
                self.raw("```");
                self.in_code_block = false;
            }
            TagEnd::List(_) => {
                self.lists.pop();
            }
            TagEnd::Emphasis => self.close(Style::Italic),
            TagEnd::Strong => self.close(Style::Bold),
            TagEnd::Strikethrough => self.close(Style::Strike),
            TagEnd::Link | TagEnd::Image => {
                let url = self.links.pop().unwrap_or_default();
                self.raw(&format!("]({})", escape_url(&url)));
            }
            _ => {}
        }
    }

    fn open(&mut self, style: Style) {
        self.depth[style as usize] += 1;
        if self.depth[style as usize] == 1 {
            self.marker(style);
        }
    }

    fn close(&mut self, style: Style) {
        let depth = &mut self.depth[style as usize];
        *depth = depth.saturating_sub(1);
        if *depth == 0 {
            self.marker(style);
        }
    }

    fn marker(&mut self, style: Style) {
        // `__` would read as underline; a carriage return between two
        // italic markers is ignored by Telegram and keeps them apart.
        if matches!(style, Style::Italic) && self.italic_end == Some(self.out.len()) {
            self.out.push('\r');
        }
        self.raw(style.marker());
        if matches!(style, Style::Italic) {
            self.italic_end = Some(self.out.len());
        }
    }

    /// Separates a new block from what came before.
    fn block_break(&mut self) {
        if self.fresh_item || self.out.is_empty() {
            return;
        }
        self.newlines(if self.lists.is_empty() { 2 } else { 1 });
    }

    fn newlines(&mut self, n: usize) {
        let have = self.out.chars().rev().take_while(|&c| c == '\n').count();
        for _ in have..n {
            self.raw("\n");
        }
    }

    /// Appends already-escaped output, opening quote lines as needed.
    fn raw(&mut self, s: &str) {
        for c in s.chars() {
            if c != '\n' && self.at_line_start {
                self.at_line_start = false;
                if self.quote_depth > 0 && !self.in_code_block {
                    self.out.push('>');
                }
            }
            self.out.push(c);
            if c == '\n' {
                self.at_line_start = true;
            }
        }
        if !s.is_empty() && !s.ends_with(' ') {
            self.fresh_item = false;
        }
    }
}
