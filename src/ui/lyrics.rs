//! Lyric panel rendering.
//!
//! Shows the previous, current and next line. Words of the current line
//! that fall on a beat are underlined; the word on the current beat is
//! highlighted.

use crate::app::App;
use crate::presenter::{WordRole, WordSpan};
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;
use std::time::Instant;

fn word_style(role: WordRole) -> Style {
    match role {
        WordRole::Plain => Style::default().fg(Color::White),
        WordRole::Beat(_) => Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::UNDERLINED),
        WordRole::Active(_) => Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    }
}

fn highlighted_line(spans: Vec<WordSpan>) -> Line<'static> {
    let mut out = Vec::with_capacity(spans.len() * 2);
    for (i, span) in spans.into_iter().enumerate() {
        if i > 0 {
            out.push(Span::raw(" "));
        }
        out.push(Span::styled(span.text, word_style(span.role)));
    }
    Line::from(out)
}

fn dim_line(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::DarkGray),
    ))
}

/// Renders the lyric panel.
///
/// # Arguments
///
/// * `frame` - The frame to render to
/// * `area` - The area to render in
/// * `app` - Application state
/// * `now` - Render time, for the line lead-in
pub fn render_lyrics(frame: &mut Frame, area: Rect, app: &App, now: Instant) {
    let document = app.document();
    let heading = document.heading();
    let title = if heading.is_empty() {
        " Lyrics ".to_string()
    } else {
        format!(" {} ", heading)
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines: Vec<Line<'static>> = Vec::new();
    // Vertically center three lines plus spacing.
    let padding = inner.height.saturating_sub(5) / 2;
    lines.extend((0..padding).map(|_| Line::from("")));

    if document.is_empty() {
        lines.push(dim_line("No lyrics loaded"));
    } else {
        let count = document.line_count();
        match app.displayed_frame(now).line_index {
            Some(index) => {
                let previous = (index + count - 1) % count;
                let next = (index + 1) % count;
                if count > 2 {
                    lines.push(dim_line(&document.lines[previous].display_text));
                } else {
                    lines.push(Line::from(""));
                }
                lines.push(Line::from(""));
                lines.push(highlighted_line(app.line_spans(now).unwrap_or_default()));
                lines.push(Line::from(""));
                if count > 1 {
                    lines.push(dim_line(&document.lines[next].display_text));
                }
            }
            None => {
                lines.push(Line::from(""));
                lines.push(Line::from(""));
                lines.push(dim_line(&document.lines[0].display_text));
                lines.push(Line::from(""));
                lines.push(dim_line("Press Space to start"));
            }
        }
    }

    let widget = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(widget, inner);
}
