//! Terminal user interface components.
//!
//! This module provides the visual components for the practice screen:
//! the transport bar, the lyric panel and the help overlay.

mod help;
mod lyrics;
mod transport;

use crate::app::App;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use ratatui::widgets::Paragraph;
use ratatui::Frame;
use std::time::Instant;

pub use help::render_help;
pub use lyrics::render_lyrics;
pub use transport::render_transport;

/// Renders the complete UI.
///
/// The layout is divided into:
/// - Top: Transport bar with status, tempo and beat indicator
/// - Center: Lyric panel
/// - Bottom: Key hint
pub fn render(frame: &mut Frame, app: &App) {
    let now = Instant::now();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Transport
            Constraint::Min(7),    // Lyrics
            Constraint::Length(1), // Hint
        ])
        .split(frame.area());

    render_transport(frame, chunks[0], app, now);
    render_lyrics(frame, chunks[1], app, now);
    frame.render_widget(
        Paragraph::new(Line::styled(
            " Space play/pause  . stop  r restart  +/- tempo  v vocals  c click  ? help  q quit",
            Style::default().fg(Color::DarkGray),
        )),
        chunks[2],
    );

    if app.show_help {
        render_help(frame, app.help_scroll);
    }
}

/// Helper function to center a rectangle within another rectangle.
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
