//! Help overlay rendering.
//!
//! Displays keyboard shortcuts and commands in a modal overlay.

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use super::centered_rect;

/// Key binding entry for the help display.
struct KeyBinding {
    key: &'static str,
    description: &'static str,
}

const GENERAL_BINDINGS: &[KeyBinding] = &[
    KeyBinding {
        key: "?",
        description: "Toggle this help",
    },
    KeyBinding {
        key: "q / Esc",
        description: "Quit",
    },
    KeyBinding {
        key: "Ctrl+C",
        description: "Force quit",
    },
];

const TRANSPORT_BINDINGS: &[KeyBinding] = &[
    KeyBinding {
        key: "Space",
        description: "Play / Pause / Resume",
    },
    KeyBinding {
        key: ".",
        description: "Stop (back to the first line)",
    },
    KeyBinding {
        key: "r",
        description: "Restart from the first beat",
    },
    KeyBinding {
        key: "+ / -",
        description: "Increase/decrease tempo (60-200 BPM)",
    },
];

const MIX_BINDINGS: &[KeyBinding] = &[
    KeyBinding {
        key: "v",
        description: "Switch between instrumental and vocals",
    },
    KeyBinding {
        key: "c",
        description: "Toggle metronome click",
    },
];

const SECTIONS: &[(&str, &[KeyBinding])] = &[
    ("General", GENERAL_BINDINGS),
    ("Transport", TRANSPORT_BINDINGS),
    ("Mix", MIX_BINDINGS),
];

/// Renders the help overlay.
///
/// # Arguments
///
/// * `frame` - The frame to render to
/// * `scroll` - Vertical scroll offset
pub fn render_help(frame: &mut Frame, scroll: u16) {
    let area = centered_rect(60, 60, frame.area());

    // Clear the area behind the popup
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(" Help - Keyboard Shortcuts ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Split inner area into content and fixed footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Scrollable content
            Constraint::Length(1), // Fixed footer
        ])
        .split(inner);

    // Build help content (without footer)
    let mut lines: Vec<Line<'static>> = Vec::new();

    let section_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
    let key_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let desc_style = Style::default().fg(Color::White);

    for (title, bindings) in SECTIONS {
        lines.push(Line::from(Span::styled(*title, section_style)));
        lines.extend(bindings.iter().map(|binding| {
            Line::from(vec![
                Span::styled(format!("{:12}", binding.key), key_style),
                Span::styled(binding.description, desc_style),
            ])
        }));
        lines.push(Line::from(""));
    }

    // Render scrollable content
    let help_text = Paragraph::new(lines).scroll((scroll, 0));
    frame.render_widget(help_text, chunks[0]);

    // Render fixed footer (always visible at bottom)
    let footer = Paragraph::new(Line::from(Span::styled(
        "Scroll: Up/Down/j/k  |  Close: ?/Esc",
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )));
    frame.render_widget(footer, chunks[1]);
}
