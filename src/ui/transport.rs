//! Transport bar rendering.
//!
//! Displays the playback status, tempo, beat indicator and mix toggles.

use crate::app::App;
use crate::clock::PlaybackState;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use std::time::Instant;

/// Renders the transport bar at the top of the screen.
///
/// # Arguments
///
/// * `frame` - The frame to render to
/// * `area` - The area to render in
/// * `app` - Application state
/// * `now` - Render time, for the beat flash
pub fn render_transport(frame: &mut Frame, area: Rect, app: &App, now: Instant) {
    let block = Block::default()
        .title(" Transport ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(14), // Playback status
            Constraint::Length(12), // Tempo
            Constraint::Length(14), // Beat indicator
            Constraint::Length(22), // Vocals / click
            Constraint::Min(20),    // Status message
        ])
        .split(inner);

    let clock = app.clock();
    let play_status = match clock.state() {
        PlaybackState::Running => Span::styled(
            " [>] PLAY ",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        PlaybackState::Paused => Span::styled(
            " [||] PAUSE ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        PlaybackState::Idle => Span::styled(
            " [.] STOP ",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
    };
    frame.render_widget(Paragraph::new(Line::from(play_status)), chunks[0]);

    let tempo_widget = Paragraph::new(Line::from(vec![
        Span::styled("BPM: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", clock.bpm()),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
    ]));
    frame.render_widget(tempo_widget, chunks[1]);

    frame.render_widget(Paragraph::new(beat_indicator(app, now)), chunks[2]);

    let toggle = |label: &'static str, on: bool| {
        Span::styled(
            format!("{}:{} ", label, if on { "on" } else { "off" }),
            Style::default().fg(if on { Color::Cyan } else { Color::DarkGray }),
        )
    };
    let mix_widget = Paragraph::new(Line::from(vec![
        toggle("vocals", clock.vocals_enabled()),
        toggle("click", clock.click_enabled()),
    ]));
    frame.render_widget(mix_widget, chunks[3]);

    if let Some((msg, _)) = &app.status_message {
        let status_line = Line::from(Span::styled(
            msg.as_str(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::ITALIC),
        ));
        frame.render_widget(Paragraph::new(status_line), chunks[4]);
    }
}

/// Four cells, one per beat of the measure; the current beat is lit.
fn beat_indicator(app: &App, now: Instant) -> Line<'static> {
    let playing = app.clock().state() != PlaybackState::Idle;
    let current = app.displayed_frame(now).beat_in_measure;
    let flash = app.beat_flash(now);

    let spans: Vec<Span<'static>> = (0..4)
        .map(|beat| {
            let style = if playing && beat == current {
                let color = if beat == 0 { Color::Magenta } else { Color::Green };
                let style = Style::default().fg(color).add_modifier(Modifier::BOLD);
                if flash {
                    style.add_modifier(Modifier::REVERSED)
                } else {
                    style
                }
            } else {
                Style::default().fg(Color::DarkGray)
            };
            Span::styled(format!(" {} ", beat + 1), style)
        })
        .collect();
    Line::from(spans)
}
