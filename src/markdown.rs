use crate::syntax::SyntaxHighlighter;
use colored::Colorize;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// Renders agent replies, which are markdown, for the terminal.
pub struct MarkdownRenderer {
    highlighter: SyntaxHighlighter,
}

#[derive(Default)]
struct RenderState {
    out: String,
    strong: usize,
    emphasis: usize,
    strike: usize,
    heading: Option<HeadingLevel>,
    quote_depth: usize,
    /// Next number per open list; `None` for bullet lists
    lists: Vec<Option<u64>>,
    code: Option<(String, String)>,
    links: Vec<String>,
    at_line_start: bool,
}

impl RenderState {
    fn line_prefix(&mut self) {
        if self.at_line_start {
            for _ in 0..self.quote_depth {
                self.out.push_str(&format!("{} ", "│".dimmed()));
            }
            self.at_line_start = false;
        }
    }

    fn text(&mut self, text: &str) {
        self.line_prefix();

        let styled = if let Some(level) = self.heading {
            match level {
                HeadingLevel::H1 | HeadingLevel::H2 => text.bright_cyan().bold(),
                _ => text.cyan().bold(),
            }
        } else {
            let mut styled = text.normal();
            if self.strong > 0 {
                styled = styled.bold();
            }
            if self.emphasis > 0 {
                styled = styled.italic();
            }
            if self.strike > 0 {
                styled = styled.strikethrough();
            }
            if self.quote_depth > 0 {
                styled = styled.dimmed();
            }
            styled
        };
        self.out.push_str(&styled.to_string());
    }

    fn newline(&mut self) {
        self.out.push('\n');
        self.at_line_start = true;
    }

    fn ensure_line_start(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.newline();
        }
        self.at_line_start = true;
    }

    /// End a block with one blank line, unless inside a list.
    fn block_end(&mut self) {
        self.ensure_line_start();
        if self.lists.is_empty() && !self.out.ends_with("\n\n") {
            self.newline();
        }
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self {
            highlighter: SyntaxHighlighter::new(),
        }
    }

    pub fn render(&self, markdown: &str) -> String {
        let mut state = RenderState {
            at_line_start: true,
            ..Default::default()
        };
        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;

        for event in Parser::new_ext(markdown, options) {
            if let Some((_, code)) = state.code.as_mut() {
                match event {
                    Event::Text(text) => {
                        code.push_str(&text);
                        continue;
                    }
                    Event::End(TagEnd::CodeBlock) => {}
                    _ => continue,
                }
            }

            match event {
                Event::Start(tag) => self.start(&mut state, tag),
                Event::End(tag) => self.end(&mut state, tag),
                Event::Text(text) => state.text(&text),
                Event::Code(code) => {
                    state.line_prefix();
                    state.out.push_str(&code.bright_yellow().to_string());
                }
                Event::SoftBreak | Event::HardBreak => state.newline(),
                Event::Rule => {
                    state.ensure_line_start();
                    state.out.push_str(&"─".repeat(40).dimmed().to_string());
                    state.block_end();
                }
                Event::TaskListMarker(done) => {
                    state.out.push_str(if done { "[x] " } else { "[ ] " });
                }
                Event::Html(html) | Event::InlineHtml(html) => state.text(&html),
                _ => {}
            }
        }

        state.out.trim_end().to_string()
    }

    fn start(&self, state: &mut RenderState, tag: Tag) {
        match tag {
            Tag::Paragraph => state.line_prefix(),
            Tag::Heading { level, .. } => {
                state.ensure_line_start();
                state.heading = Some(level);
            }
            Tag::BlockQuote(_) => {
                state.ensure_line_start();
                state.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(lang) => {
                        lang.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                state.ensure_line_start();
                state.code = Some((language, String::new()));
            }
            Tag::List(start) => {
                state.ensure_line_start();
                state.lists.push(start);
            }
            Tag::Item => {
                state.ensure_line_start();
                state.line_prefix();
                let depth = state.lists.len().saturating_sub(1);
                state.out.push_str(&"  ".repeat(depth));
                let marker = match state.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}.", n);
                        *n += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                state.out.push_str(&format!("{} ", marker.bright_blue()));
            }
            Tag::Emphasis => state.emphasis += 1,
            Tag::Strong => state.strong += 1,
            Tag::Strikethrough => state.strike += 1,
            Tag::Link { dest_url, .. } => state.links.push(dest_url.to_string()),
            _ => {}
        }
    }

    fn end(&self, state: &mut RenderState, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => state.block_end(),
            TagEnd::Heading(_) => {
                state.heading = None;
                state.block_end();
            }
            TagEnd::BlockQuote(_) => {
                state.quote_depth = state.quote_depth.saturating_sub(1);
                state.block_end();
            }
            TagEnd::CodeBlock => {
                if let Some((language, code)) = state.code.take() {
                    state
                        .out
                        .push_str(&self.highlighter.highlight_code(&code, &language));
                    state.newline();
                    state.block_end();
                }
            }
            TagEnd::List(_) => {
                state.lists.pop();
                state.block_end();
            }
            TagEnd::Item => state.ensure_line_start(),
            TagEnd::Emphasis => state.emphasis = state.emphasis.saturating_sub(1),
            TagEnd::Strong => state.strong = state.strong.saturating_sub(1),
            TagEnd::Strikethrough => state.strike = state.strike.saturating_sub(1),
            TagEnd::Link => {
                if let Some(url) = state.links.pop() {
                    state
                        .out
                        .push_str(&format!(" ({})", url).dimmed().to_string());
                }
            }
            _ => {}
        }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}
