//! Custom widgets for the TUI

use std::sync::LazyLock;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};
use regex::Regex;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::shimmer::{shimmer_spans, AnimatedDots};
use super::theme::Theme;
use crate::session::{IndicatorSequencer, Role, SavedMessages, Turn, TurnStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emphasis {
    BoldItalic,
    Bold,
    Code,
    Italic,
}

static MARKDOWN_PATTERNS: LazyLock<Vec<(Regex, Emphasis)>> = LazyLock::new(|| {
    [
        (r"\*\*\*(.+?)\*\*\*", Emphasis::BoldItalic),
        (r"\*\*(.+?)\*\*", Emphasis::Bold),
        (r"`([^`]+?)`", Emphasis::Code),
        (r"\*([^*]+?)\*", Emphasis::Italic),
    ]
    .into_iter()
    .filter_map(|(pattern, emphasis)| Regex::new(pattern).ok().map(|re| (re, emphasis)))
    .collect()
});

/// Parse inline Markdown emphasis into styled spans.
/// Supports: **bold**, *italic*, `code`, ***bold italic***
fn parse_markdown(text: &str, base: Style, theme: &Theme) -> Vec<Span<'static>> {
    let style_for = |emphasis: Emphasis| match emphasis {
        Emphasis::BoldItalic => base.add_modifier(Modifier::BOLD | Modifier::ITALIC),
        Emphasis::Bold => base.add_modifier(Modifier::BOLD),
        Emphasis::Code => theme.code(),
        Emphasis::Italic => base.add_modifier(Modifier::ITALIC),
    };

    let mut spans = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        // Earliest match wins; ties go to the pattern listed first
        let first = MARKDOWN_PATTERNS
            .iter()
            .filter_map(|(re, emphasis)| re.captures(remaining).map(|caps| (caps, *emphasis)))
            .filter_map(|(caps, emphasis)| {
                let whole = caps.get(0)?;
                let inner = caps.get(1)?;
                Some((whole.start(), whole.end(), inner.as_str().to_string(), emphasis))
            })
            .min_by_key(|(start, ..)| *start);

        match first {
            Some((start, end, inner, emphasis)) => {
                if start > 0 {
                    spans.push(Span::styled(remaining[..start].to_string(), base));
                }
                spans.push(Span::styled(inner, style_for(emphasis)));
                remaining = &remaining[end..];
            }
            None => {
                spans.push(Span::styled(remaining.to_string(), base));
                break;
            }
        }
    }

    if spans.is_empty() {
        spans.push(Span::styled(String::new(), base));
    }
    spans
}

/// Wrap a string into lines of at most `max_width` columns
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 || text.width() <= max_width {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for c in text.chars() {
        let char_width = c.width().unwrap_or(1);
        if current_width + char_width > max_width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(c);
        current_width += char_width;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Cut `text` to `max_width` columns, marking the cut with an ellipsis
pub fn truncate_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut width = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(1);
        if width + w + 1 > max_width {
            break;
        }
        out.push(c);
        width += w;
    }
    out.push('…');
    out
}

/// Header bar: title on the left, clear/theme hints on the right
pub struct HeaderBar<'a> {
    pub title: &'a str,
    pub clear_hint: &'a str,
    pub is_processing: bool,
    pub theme: &'a Theme,
}

impl Widget for HeaderBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height < 1 {
            return;
        }

        let mut title_spans = vec![Span::styled("◆ ", self.theme.accent())];
        if self.is_processing {
            title_spans.extend(shimmer_spans(self.title, self.theme.title()));
        } else {
            title_spans.push(Span::styled(self.title.to_string(), self.theme.title()));
        }
        buf.set_line(area.x + 1, area.y, &Line::from(title_spans), area.width.saturating_sub(2));

        let right = Line::from(vec![
            Span::styled("Ctrl+L ", self.theme.key()),
            Span::styled(self.clear_hint.to_string(), self.theme.key_desc()),
            Span::styled("  │  ", self.theme.muted()),
            Span::styled("Ctrl+T ", self.theme.key()),
            Span::styled(
                format!("{} {} ", self.theme.mode_glyph(), self.theme.mode().as_str()),
                self.theme.key_desc(),
            ),
        ]);
        let right_width = right.width() as u16;
        if right_width + 2 < area.width {
            let x = area.x + area.width - right_width - 1;
            buf.set_line(x, area.y, &right, right_width + 1);
        }
    }
}

/// What the status line is currently reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Ready,
    Busy,
    Info,
    Error,
}

pub struct StatusBar<'a> {
    pub kind: StatusKind,
    pub text: &'a str,
    pub spinner_frame: usize,
    pub theme: &'a Theme,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let line = match self.kind {
            StatusKind::Busy => {
                let spinner = AnimatedDots::new(self.spinner_frame);
                Line::from(vec![
                    Span::styled(format!("{} ", spinner.current()), self.theme.accent()),
                    Span::styled(self.text.to_string(), self.theme.accent()),
                ])
            }
            StatusKind::Info => Line::from(vec![
                Span::styled("● ", self.theme.success()),
                Span::styled(self.text.to_string(), self.theme.text()),
            ]),
            StatusKind::Error => Line::from(vec![
                Span::styled("✗ ", self.theme.error()),
                Span::styled(self.text.to_string(), self.theme.error()),
            ]),
            StatusKind::Ready => Line::from(vec![
                Span::styled("● ", self.theme.success()),
                Span::styled("Ready", self.theme.dim()),
            ]),
        };
        buf.set_line(area.x + 1, area.y, &line, area.width.saturating_sub(2));
    }
}

/// Lines for one conversation turn.
///
/// `answer_number` is the 1-based position among assistant turns, the
/// number `/save` takes.
pub fn render_turn_lines(
    turn: &Turn,
    answer_number: Option<usize>,
    max_width: usize,
    theme: &Theme,
    empty_citation: &str,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let content_width = max_width.saturating_sub(4);

    let mut header = match (turn.role, answer_number) {
        (Role::User, _) => vec![Span::styled(" You ", theme.user_badge())],
        (Role::Assistant, Some(n)) => vec![Span::styled(format!(" Answer #{n} "), theme.assistant_badge())],
        (Role::Assistant, None) => vec![Span::styled(" Answer ", theme.assistant_badge())],
    };
    header.push(Span::styled(format!(" {}", turn.timestamp), theme.muted()));
    match turn.status {
        TurnStatus::Streaming => header.push(Span::styled(" …", theme.muted())),
        TurnStatus::Interrupted => header.push(Span::styled(" ⚠ interrupted", theme.warning())),
        TurnStatus::Complete => {}
    }
    lines.push(Line::from(header));

    let markdown = turn.is_assistant();
    for content_line in turn.content.lines() {
        for (i, wrapped) in wrap_text(content_line, content_width).into_iter().enumerate() {
            let indent = if i == 0 { "  " } else { "    " };
            let mut spans = vec![Span::raw(indent)];
            if markdown {
                spans.extend(parse_markdown(&wrapped, theme.text(), theme));
            } else {
                spans.push(Span::styled(wrapped, theme.text()));
            }
            lines.push(Line::from(spans));
        }
    }

    if !turn.citations.is_empty() {
        lines.push(Line::from(Span::styled("  Sources:", theme.muted())));
        for (i, citation) in turn.citations.iter().enumerate() {
            let description = if citation.source_description.trim().is_empty() {
                empty_citation
            } else {
                citation.source_description.as_str()
            };
            lines.push(Line::from(vec![
                Span::styled(format!("    [{}] ", i + 1), theme.muted()),
                Span::styled(description.to_string(), theme.text()),
                Span::raw(" "),
                Span::styled(citation.source_url.clone(), theme.link()),
            ]));
        }
    }

    lines.push(Line::from(""));
    lines
}

/// Lines for the loading indicator: finished phases ticked off, the
/// current one shimmering.
pub fn indicator_lines(indicator: &IndicatorSequencer, theme: &Theme) -> Vec<Line<'static>> {
    let phases = indicator.phases();
    let last = phases.len().saturating_sub(1);
    phases
        .iter()
        .enumerate()
        .map(|(i, phase)| {
            if i == last {
                let mut spans = vec![Span::styled(format!("  {} ", phase.icon.glyph()), theme.accent())];
                spans.extend(shimmer_spans(&phase.status, theme.thinking()));
                Line::from(spans)
            } else {
                Line::from(vec![
                    Span::styled("  ✓ ", theme.success()),
                    Span::styled(phase.status.clone(), theme.dim()),
                ])
            }
        })
        .collect()
}

/// Side panel listing saved messages
pub struct SavedPanel<'a> {
    pub saved: &'a SavedMessages,
    pub theme: &'a Theme,
}

impl Widget for SavedPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.border())
            .title(Span::styled(
                format!(" Saved Messages ({}) ", self.saved.len()),
                self.theme.accent(),
            ));
        let inner = block.inner(area);
        block.render(area, buf);

        if inner.height == 0 || inner.width < 4 {
            return;
        }

        if self.saved.is_empty() {
            buf.set_line(
                inner.x,
                inner.y,
                &Line::from(Span::styled("No saved messages.", self.theme.muted())),
                inner.width,
            );
            return;
        }

        let width = inner.width as usize;
        let mut lines: Vec<Line> = Vec::new();
        for (i, entry) in self.saved.entries().iter().enumerate() {
            lines.push(Line::from(vec![
                Span::styled(format!("{}. ", i + 1), self.theme.key()),
                Span::styled(entry.timestamp.clone(), self.theme.muted()),
            ]));
            for content_line in entry.content.lines().filter(|l| !l.trim().is_empty()).take(3) {
                lines.push(Line::from(Span::styled(
                    truncate_width(&format!("  {}", content_line.trim()), width),
                    self.theme.text(),
                )));
            }
            lines.push(Line::from(""));
        }

        Paragraph::new(lines).render(inner, buf);
    }
}

pub struct InputBox<'a> {
    pub content: &'a str,
    pub busy: bool,
    pub theme: &'a Theme,
}

impl Widget for InputBox<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(if self.busy {
                self.theme.border()
            } else {
                self.theme.border_focused()
            })
            .title(Span::styled(" Message ", self.theme.muted()));
        let inner = block.inner(area);
        block.render(area, buf);

        let (text, style) = if self.content.is_empty() {
            (
                "Ask a question... (Enter to send, / for commands)",
                self.theme.muted(),
            )
        } else {
            (self.content, self.theme.text())
        };
        Paragraph::new(text)
            .style(style)
            .wrap(Wrap { trim: false })
            .render(inner, buf);
    }
}

pub struct HelpBar<'a> {
    pub theme: &'a Theme,
}

impl Widget for HelpBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bindings = [
            ("Enter", "Send"),
            ("/", "Commands"),
            ("F2", "Saved"),
            ("PgUp/PgDn", "Scroll"),
            ("Esc", "Stop"),
            ("Ctrl+C", "Quit"),
        ];

        let mut spans = vec![Span::raw(" ")];
        for (i, (key, desc)) in bindings.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" │ ", self.theme.muted()));
            }
            spans.push(Span::styled(*key, self.theme.key()));
            spans.push(Span::styled(format!(" {desc}"), self.theme.key_desc()));
        }
        buf.set_line(area.x, area.y, &Line::from(spans), area.width);
    }
}

pub struct FooterBar<'a> {
    pub message: &'a str,
    pub theme: &'a Theme,
}

impl Widget for FooterBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(Line::from(Span::styled(
            self.message.to_string(),
            self.theme.muted().add_modifier(Modifier::ITALIC),
        )))
        .alignment(Alignment::Center)
        .render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Citation, IndicatorPhase, PhaseIcon};

    fn plain(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn test_markdown_emphasis() {
        let theme = Theme::default();
        let spans = parse_markdown("a **b** `c` *d*", Style::default(), &theme);
        let texts: Vec<&str> = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(texts, vec!["a ", "b", " ", "c", " ", "d"]);
        assert!(spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert!(spans[5].style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn test_wrap_and_truncate() {
        assert_eq!(wrap_text("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(wrap_text("abc", 0), vec!["abc"]);
        assert_eq!(truncate_width("hello world", 6), "hello…");
        assert_eq!(truncate_width("short", 10), "short");
    }

    #[test]
    fn test_turn_lines_with_citations() {
        let theme = Theme::default();
        let mut turn = Turn::assistant("The answer");
        turn.citations = vec![
            Citation {
                source_url: "https://example.org/a".into(),
                source_description: "Annual report".into(),
            },
            Citation {
                source_url: "https://example.org/b".into(),
                source_description: String::new(),
            },
        ];
        turn.status = TurnStatus::Interrupted;

        let text = plain(&render_turn_lines(&turn, Some(2), 80, &theme, "Unspecified source"));
        assert!(text[0].starts_with(" Answer #2 "));
        assert!(text[0].ends_with("⚠ interrupted"));
        assert_eq!(text[1], "  The answer");
        assert!(text.iter().any(|l| l.contains("[1] Annual report https://example.org/a")));
        assert!(text.iter().any(|l| l.contains("[2] Unspecified source https://example.org/b")));
    }

    #[test]
    fn test_indicator_lines() {
        let theme = Theme::default();
        let mut indicator = IndicatorSequencer::new();
        indicator.push(IndicatorPhase::new("Searching"));
        indicator.push(IndicatorPhase::new("Reading").with_icon(PhaseIcon::Documents));

        let text = plain(&indicator_lines(&indicator, &theme));
        assert_eq!(text, vec!["  ✓ Searching".to_string(), "  📄 Reading".to_string()]);
    }
}
