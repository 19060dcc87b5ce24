use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};

/// Converts a chatbot reply into styled terminal text.
pub fn render_chat(input: &str) -> Text<'static> {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TASKLISTS);

    let mut out = ChatWriter::default();
    for event in Parser::new_ext(input, opts) {
        out.event(event);
    }
    out.finish()
}

#[derive(Default)]
struct ChatWriter {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    prefix: Option<String>,
    quote_depth: usize,
    in_code_block: bool,
    link: Option<String>,
}

impl ChatWriter {
    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, patch: Style) {
        let next = self.style().patch(patch);
        self.styles.push(next);
    }

    fn pop_style(&mut self) {
        self.styles.pop();
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    for raw in text.lines() {
                        self.spans.push(Span::styled(
                            format!("  {raw}"),
                            Style::default().fg(Color::Yellow),
                        ));
                        self.flush();
                    }
                } else {
                    let style = self.style();
                    self.spans.push(Span::styled(text.into_string(), style));
                }
            }
            Event::Code(code) => {
                let style = self.style().fg(Color::Yellow);
                self.spans.push(Span::styled(format!("`{code}`"), style));
            }
            Event::SoftBreak => self.spans.push(Span::raw(" ")),
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.flush();
                self.lines.push(Line::styled(
                    "─".repeat(24),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            Event::TaskListMarker(done) => {
                self.spans
                    .push(Span::raw(if done { "[x] " } else { "[ ] " }));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                self.spans.push(Span::raw(html.into_string()));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                let marks = match level {
                    HeadingLevel::H1 => "# ",
                    HeadingLevel::H2 => "## ",
                    _ => "### ",
                };
                self.push_style(
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                );
                let style = self.style();
                self.spans.push(Span::styled(marks, style));
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth += 1;
                self.push_style(Style::default().fg(Color::Gray));
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.in_code_block = true;
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.prefix = Some(format!("{}{}", "  ".repeat(depth), marker));
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT))
            }
            Tag::Link { dest_url, .. } => {
                self.link = Some(dest_url.into_string());
                self.push_style(
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
            TagEnd::Paragraph => {
                self.flush();
                if self.lists.is_empty() {
                    self.lines.push(Line::default());
                }
            }
            TagEnd::Heading(_) => {
                self.pop_style();
                self.flush();
            }
            TagEnd::BlockQuote => {
                self.flush();
                self.pop_style();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                self.flush();
                self.in_code_block = false;
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
            }
            TagEnd::Item => self.flush(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                if let Some(url) = self.link.take() {
                    self.spans.push(Span::styled(
                        format!(" <{url}>"),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
            }
            _ => {}
        }
    }

    fn flush(&mut self) {
        let item_prefix = self.prefix.take();
        if self.spans.is_empty() {
            if let Some(prefix) = item_prefix {
                // Item text arrives after the marker; keep it for the next flush.
                self.prefix = Some(prefix);
            }
            return;
        }
        let mut spans = Vec::with_capacity(self.spans.len() + 2);
        if self.quote_depth > 0 {
            spans.push(Span::styled(
                "│ ".repeat(self.quote_depth),
                Style::default().fg(Color::DarkGray),
            ));
        }
        if let Some(prefix) = item_prefix {
            spans.push(Span::raw(prefix));
        }
        spans.append(&mut self.spans);
        self.lines.push(Line::from(spans));
    }

    fn finish(mut self) -> Text<'static> {
        self.flush();
        while self
            .lines
            .last()
            .is_some_and(|line| line.spans.is_empty())
        {
            self.lines.pop();
        }
        Text::from(self.lines)
    }
}
