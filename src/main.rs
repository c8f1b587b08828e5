//! pulsehead - A terminal karaoke practice tool.
//!
//! A metronome-accurate beat clock drives both the backing track and a
//! lyric highlighter, so a singer can see which word falls on which beat.
//!
//! # Features
//!
//! - Beat clock aligned to the audio transport, with pause/resume and
//!   tempo changes that keep the beat phase
//! - One lyric line per measure, the word on the current beat highlighted
//! - Instrumental and vocal stems played in sync, switchable at runtime
//! - Metronome click accented on the first beat of each measure
//! - Headless simulation that prints one JSON frame per beat
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --lyrics song.txt --instrumental inst.mp3 --vocals vox.mp3
//! cargo run -- --config session.json
//! cargo run -- --lyrics song.txt --simulate 16
//! ```
//!
//! Press `?` for help with keyboard shortcuts.

use pulsehead::app::App;
use pulsehead::audio::{ManualBackend, RodioBackend};
use pulsehead::clock::{BeatClock, BeatEvent};
use pulsehead::config::SessionConfig;
use pulsehead::coordinator::{Coordinator, Frame};
use pulsehead::lyrics::load_document;
use pulsehead::ui;

use anyhow::{bail, Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use serde::Serialize;
use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Command-line options for the application.
#[derive(Default)]
struct CliOptions {
    /// Session file to load before applying the other flags.
    config: Option<PathBuf>,
    lyrics: Option<PathBuf>,
    instrumental: Option<PathBuf>,
    vocals: Option<PathBuf>,
    bpm: Option<f64>,
    no_click: bool,
    /// Run headless for this many beats and print frames as JSON.
    simulate: Option<u64>,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `--config <path>`: Load a JSON session file
    /// - `--lyrics <path>`, `--instrumental <path>`, `--vocals <path>`
    /// - `--bpm <n>`: Initial tempo (60-200)
    /// - `--no-click`: Start with the metronome click off
    /// - `--simulate <beats>`: Print frames without audio or a terminal UI
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut options = Self::default();
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    options.config = Some(PathBuf::from(arg_value(&args, i, "--config")?));
                }
                "--lyrics" | "-l" => {
                    i += 1;
                    options.lyrics = Some(PathBuf::from(arg_value(&args, i, "--lyrics")?));
                }
                "--instrumental" => {
                    i += 1;
                    options.instrumental =
                        Some(PathBuf::from(arg_value(&args, i, "--instrumental")?));
                }
                "--vocals" => {
                    i += 1;
                    options.vocals = Some(PathBuf::from(arg_value(&args, i, "--vocals")?));
                }
                "--bpm" | "-b" => {
                    i += 1;
                    let raw = arg_value(&args, i, "--bpm")?;
                    options.bpm = Some(
                        raw.parse()
                            .with_context(|| format!("Invalid BPM: {}", raw))?,
                    );
                }
                "--no-click" => options.no_click = true,
                "--simulate" => {
                    i += 1;
                    let raw = arg_value(&args, i, "--simulate")?;
                    options.simulate = Some(
                        raw.parse()
                            .with_context(|| format!("Invalid beat count: {}", raw))?,
                    );
                }
                "--help" | "-h" => {
                    print_help(args.first().map(String::as_str).unwrap_or("pulsehead"));
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        Ok(options)
    }

    /// Builds the session: the config file (if any) with flags applied on top.
    fn session(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)?,
            None => SessionConfig::default(),
        };
        if let Some(path) = &self.lyrics {
            config.lyrics = Some(path.clone());
        }
        if let Some(path) = &self.instrumental {
            config.instrumental = Some(path.clone());
        }
        if let Some(path) = &self.vocals {
            config.vocals = Some(path.clone());
        }
        if let Some(bpm) = self.bpm {
            config.bpm = bpm;
        }
        if self.no_click {
            config.click_enabled = false;
        }
        Ok(config.validated())
    }
}

/// Returns the argument at `i`, which must follow `flag`.
fn arg_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a String> {
    args.get(i)
        .with_context(|| format!("{} requires an argument", flag))
}

fn print_help(program: &str) {
    eprintln!("pulsehead - Terminal karaoke practice with a beat-synced lyric highlighter");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config PATH        Load a JSON session file");
    eprintln!("  -l, --lyrics PATH        Annotated lyric file");
    eprintln!("      --instrumental PATH  Instrumental stem");
    eprintln!("      --vocals PATH        Vocal stem");
    eprintln!("  -b, --bpm N              Initial tempo (60-200)");
    eprintln!("      --no-click           Start with the metronome click off");
    eprintln!("      --simulate BEATS     Print BEATS frames as JSON lines and exit");
    eprintln!("  -h, --help               Print this help message");
    eprintln!();
    eprintln!("Flags override values from the session file.");
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    // Silent unless RUST_LOG is set
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = cli.session()?;

    if let Some(beats) = cli.simulate {
        return simulate(&config, beats);
    }

    let backend = Arc::new(RodioBackend::with_lookahead(config.lookahead()));
    let mut app = App::new(&config, backend);

    let mut terminal = setup_terminal().context("Failed to setup terminal")?;
    let result = run_app(&mut terminal, &mut app);
    app.shutdown();
    restore_terminal(&mut terminal).context("Failed to restore terminal")?;

    result
}

/// One line of `--simulate` output.
#[derive(Serialize)]
struct SimulatedBeat {
    event: BeatEvent,
    frame: Frame,
}

/// Runs the clock on a manually advanced backend and prints every beat.
fn simulate(config: &SessionConfig, beats: u64) -> Result<()> {
    let document = Arc::new(
        config
            .lyrics
            .as_ref()
            .map(load_document)
            .unwrap_or_default(),
    );
    let backend = Arc::new(ManualBackend::new());
    let clock = BeatClock::new(backend.clone(), config.bpm);
    let coordinator = Coordinator::new(Some(document));

    let (tx, rx) = mpsc::channel();
    clock.on_beat(move |event| {
        let _ = tx.send(SimulatedBeat {
            event: *event,
            frame: coordinator.on_event(event),
        });
    });

    clock.start()?;
    let interval = 60.0 / clock.bpm();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for beat in 0..beats {
        backend.advance(if beat == 0 { 0.0 } else { interval });
        let line = match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(line) => line,
            Err(_) => bail!("Beat {} was not delivered", beat),
        };
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }
    clock.dispose();
    Ok(())
}

/// Sets up the terminal for TUI rendering.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("Failed to create terminal")?;
    Ok(terminal)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Main event loop.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.update();
        app.clear_expired_status();

        terminal.draw(|frame| ui::render(frame, app))?;

        // Short timeout so beat frames are drawn promptly
        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && handle_key(app, key.code, key.modifiers) {
                    return Ok(());
                }
            }
        }
    }
}

/// Handles a key press.
///
/// # Returns
///
/// true if the application should quit.
fn handle_key(app: &mut App, code: KeyCode, modifiers: KeyModifiers) -> bool {
    if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if app.show_help {
        match code {
            KeyCode::Char('?') | KeyCode::Esc => {
                app.show_help = false;
                app.help_scroll = 0;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.help_scroll = app.help_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                app.help_scroll = app.help_scroll.saturating_add(1);
            }
            _ => {}
        }
        return false;
    }

    match code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Char(' ') => app.toggle_playback(),
        KeyCode::Char('.') => app.stop_playback(),
        KeyCode::Char('r') => app.restart_playback(),
        KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_bpm(1.0),
        KeyCode::Char('-') | KeyCode::Char('_') => app.adjust_bpm(-1.0),
        KeyCode::Char('v') => app.toggle_vocals(),
        KeyCode::Char('c') => app.toggle_click(),
        KeyCode::Char('?') => app.show_help = true,
        _ => {}
    }
    false
}
