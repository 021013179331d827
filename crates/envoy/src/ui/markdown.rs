//! Markdown to styled terminal lines.
//!
//! Output is sanitized: control characters (and with them any escape
//! sequences) are stripped, and raw HTML is shown as inert text.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Deepest block/inline nesting the renderer accepts.
const MAX_DEPTH: usize = 24;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MarkdownError {
    #[error("markdown nested deeper than {0} levels")]
    TooDeep(usize),
}

/// A code block found while rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Index of the block's header line in [`Rendered::lines`].
    pub line: usize,
    pub code: String,
}

#[derive(Debug, Default)]
pub struct Rendered {
    pub lines: Vec<Line<'static>>,
    pub code_blocks: Vec<CodeBlock>,
}

/// Drops control characters other than newlines; tabs become spaces.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push('\n'),
            '\t' => out.push_str("    "),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Text shown verbatim, one line per newline.
pub fn plain_lines(text: &str) -> Vec<Line<'static>> {
    sanitize(text)
        .split('\n')
        .map(|l| Line::from(l.to_string()))
        .collect()
}

pub fn render_markdown(text: &str) -> Result<Rendered, MarkdownError> {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES | Options::ENABLE_TASKLISTS;
    let mut writer = Writer::default();

    for event in Parser::new_ext(text, options) {
        writer.event(event)?;
    }
    writer.flush();

    // No trailing blank lines
    while writer.out.lines.last().is_some_and(|l| l.spans.is_empty()) {
        writer.out.lines.pop();
    }
    Ok(writer.out)
}

fn heading_style(level: HeadingLevel) -> Style {
    let color = match level {
        HeadingLevel::H1 => Color::Yellow,
        HeadingLevel::H2 => Color::LightYellow,
        HeadingLevel::H3 => Color::Cyan,
        _ => Color::LightCyan,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn code_style() -> Style {
    Style::default().fg(Color::Gray).bg(Color::Black)
}

fn inline_code_style() -> Style {
    Style::default().fg(Color::Yellow)
}

fn dim() -> Style {
    Style::default().fg(Color::DarkGray)
}

#[derive(Default)]
struct Writer {
    out: Rendered,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    links: Vec<String>,
    code: Option<usize>,
    quote_depth: usize,
    depth: usize,
}

impl Writer {
    fn style(&self) -> Style {
        self.styles
            .iter()
            .fold(Style::default(), |acc, s| acc.patch(*s))
    }

    fn push_text(&mut self, text: &str, style: Style) {
        let text = sanitize(text);
        let mut parts = text.split('\n');
        if let Some(first) = parts.next() {
            if !first.is_empty() {
                self.current.push(Span::styled(first.to_string(), style));
            }
        }
        for part in parts {
            self.flush();
            if !part.is_empty() {
                self.current.push(Span::styled(part.to_string(), style));
            }
        }
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.current.len() + 1);
        if self.quote_depth > 0 {
            spans.push(Span::styled("│ ".repeat(self.quote_depth), dim()));
        }
        spans.append(&mut self.current);
        self.out.lines.push(Line::from(spans));
    }

    fn blank(&mut self) {
        self.flush();
        if self.out.lines.last().is_some_and(|l| !l.spans.is_empty()) {
            self.out.lines.push(Line::default());
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), MarkdownError> {
        match event {
            Event::Start(tag) => {
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(MarkdownError::TooDeep(MAX_DEPTH));
                }
                self.start(tag);
            }
            Event::End(tag) => {
                self.depth = self.depth.saturating_sub(1);
                self.end(tag);
            }
            Event::Text(text) => match self.code {
                Some(index) => self.code_text(index, &text),
                None => {
                    let style = self.style();
                    self.push_text(&text, style);
                }
            },
            Event::Code(code) => {
                let style = self.style().patch(inline_code_style());
                self.push_text(&code, style);
            }
            Event::Html(html) | Event::InlineHtml(html) => self.push_text(&html, dim()),
            Event::SoftBreak => self.current.push(Span::raw(" ")),
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.flush();
                self.out.lines.push(Line::styled("─".repeat(24), dim()));
                self.blank();
            }
            Event::TaskListMarker(done) => {
                let marker = if done { "[x] " } else { "[ ] " };
                self.current.push(Span::styled(marker, dim()));
            }
            _ => {}
        }
        Ok(())
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                self.styles.push(heading_style(level));
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => sanitize(&lang),
                    CodeBlockKind::Indented => String::new(),
                };
                self.out.lines.push(Line::styled(format!("```{}", lang), dim()));
                self.out.code_blocks.push(CodeBlock {
                    line: self.out.lines.len() - 1,
                    code: String::new(),
                });
                self.code = Some(self.out.code_blocks.len() - 1);
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let bullet = format!("{}{}. ", indent, n);
                        *n += 1;
                        bullet
                    }
                    _ => format!("{}• ", indent),
                };
                self.current
                    .push(Span::styled(bullet, Style::default().fg(Color::Green)));
            }
            Tag::Emphasis => self.styles.push(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.styles.push(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self
                .styles
                .push(Style::default().add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { dest_url, .. } => {
                self.links.push(sanitize(&dest_url));
                self.styles.push(
                    Style::default()
                        .fg(Color::Blue)
                        .add_modifier(Modifier::UNDERLINED),
                );
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.blank(),
            TagEnd::Heading(_) => {
                self.styles.pop();
                self.blank();
            }
            TagEnd::BlockQuote(_) => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank();
            }
            TagEnd::CodeBlock => {
                if let Some(block) = self.code.take().and_then(|i| self.out.code_blocks.get_mut(i)) {
                    while block.code.ends_with('\n') {
                        block.code.pop();
                    }
                }
                self.blank();
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::Link => {
                self.styles.pop();
                if let Some(url) = self.links.pop() {
                    self.current.push(Span::styled(format!(" ({})", url), dim()));
                }
            }
            TagEnd::TableCell => self.current.push(Span::styled(" │ ", dim())),
            TagEnd::TableHead | TagEnd::TableRow => self.flush(),
            TagEnd::Table => self.blank(),
            _ => {}
        }
    }

    fn code_text(&mut self, index: usize, text: &str) {
        let text = sanitize(text);
        if let Some(block) = self.out.code_blocks.get_mut(index) {
            block.code.push_str(&text);
        }
        for line in text.lines() {
            self.out
                .lines
                .push(Line::from(Span::styled(format!("  {}", line), code_style())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn emphasis_is_styled() {
        let rendered = render_markdown("plain **bold** _it_").unwrap();
        assert_eq!(rendered.lines.len(), 1);

        let spans = &rendered.lines[0].spans;
        let bold = spans.iter().find(|s| s.content == "bold").unwrap();
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
        let italic = spans.iter().find(|s| s.content == "it").unwrap();
        assert!(italic.style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn code_blocks_are_collected() {
        let md = "Try this:\n\n```rust\nfn main() {}\nlet x = 1;\n```\n\nand\n\n    indented\n";
        let rendered = render_markdown(md).unwrap();

        assert_eq!(rendered.code_blocks.len(), 2);
        assert_eq!(rendered.code_blocks[0].code, "fn main() {}\nlet x = 1;");
        assert_eq!(rendered.code_blocks[1].code, "indented");

        let header = &rendered.lines[rendered.code_blocks[0].line];
        assert_eq!(text_of(header), "```rust");
    }

    #[test]
    fn lists_get_bullets_and_numbers() {
        let rendered = render_markdown("- one\n- two\n\n3. three\n4. four\n").unwrap();
        let lines: Vec<String> = rendered.lines.iter().map(text_of).collect();

        assert!(lines.contains(&"• one".to_string()));
        assert!(lines.contains(&"3. three".to_string()));
        assert!(lines.contains(&"4. four".to_string()));
    }

    #[test]
    fn escape_sequences_and_html_are_inert() {
        let rendered = render_markdown("hi \u{1b}[31mred\u{1b}[0m <script>x</script>").unwrap();
        let text: String = rendered.lines.iter().map(text_of).collect();

        assert!(!text.contains('\u{1b}'));
        assert!(text.contains("<script>"));
    }

    #[test]
    fn excessive_nesting_is_an_error() {
        let md = format!("{} deep", ">".repeat(MAX_DEPTH + 5));
        assert_eq!(
            render_markdown(&md).unwrap_err(),
            MarkdownError::TooDeep(MAX_DEPTH)
        );
    }

    #[test]
    fn plain_lines_split_on_newlines() {
        let lines = plain_lines("a\n<b>\tc");
        assert_eq!(lines.len(), 2);
        assert_eq!(text_of(&lines[1]), "<b>    c");
    }
}
