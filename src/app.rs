//! Application state and event handling.
//!
//! This module defines the main application state that coordinates
//! between the lyric document, the beat clock, and the TUI interface.

use crate::audio::{AudioBackend, StemRole};
use crate::clock::{is_valid_bpm, BeatClock, PlaybackState, Subscription};
use crate::config::SessionConfig;
use crate::coordinator::{Coordinator, Frame};
use crate::lyrics::{load_document, LyricDocument};
use crate::presenter::{attach, highlight, Presenter, WordSpan};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a status message stays on screen.
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);

/// Main application state.
pub struct App {
    /// The beat clock driving playback.
    clock: BeatClock,
    /// The loaded lyric sheet (empty if none was loaded).
    document: Arc<LyricDocument>,
    /// Latest beat frame and line lead-in.
    presenter: Presenter,
    /// Frames produced by the coordinator on the delivery thread.
    frames: Receiver<Frame>,
    /// Keeps the coordinator subscribed for the lifetime of the app.
    subscription: Subscription,
    /// When the latest beat arrived, for the beat indicator flash.
    last_beat_at: Option<Instant>,
    /// Status message to display.
    pub status_message: Option<(String, Instant)>,
    /// Whether the help overlay is open.
    pub show_help: bool,
    /// Help overlay scroll offset.
    pub help_scroll: u16,
}

impl App {
    /// Creates the application for a session.
    ///
    /// Missing lyrics or stems are not fatal: the session continues with an
    /// empty sheet or silent stems and a status message explains why.
    ///
    /// # Arguments
    ///
    /// * `config` - Session configuration (already validated)
    /// * `backend` - Audio output the beat clock will drive
    pub fn new(config: &SessionConfig, backend: Arc<dyn AudioBackend>) -> Self {
        let document = Arc::new(
            config
                .lyrics
                .as_ref()
                .map(load_document)
                .unwrap_or_default(),
        );

        let clock = BeatClock::new(backend, config.bpm);
        clock.set_vocals_enabled(config.vocals_enabled);
        clock.set_stem_level(config.stem_volume);
        clock.set_click_enabled(config.click_enabled);

        let (subscription, frames) =
            attach(&clock, Coordinator::new(Some(Arc::clone(&document))));
        let presenter = Presenter::new(document.line_count(), config.lead_in());

        let mut app = Self {
            clock,
            document,
            presenter,
            frames,
            subscription,
            last_beat_at: None,
            status_message: None,
            show_help: false,
            help_scroll: 0,
        };

        if app.document.is_empty() {
            app.set_status("No lyrics loaded");
        }

        let stems = [
            (StemRole::Instrumental, config.instrumental.as_deref()),
            (StemRole::Vocals, config.vocals.as_deref()),
        ];
        for (role, path) in stems {
            if let Some(path) = path {
                if let Err(e) = app.load_stem_file(role, path) {
                    tracing::warn!("{:#}", e);
                    app.set_status(format!("No {} audio: {}", role.id(), e));
                }
            }
        }
        app
    }

    /// Reads and decodes a stem file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or decoded.
    pub fn load_stem_file(&mut self, role: StemRole, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        self.clock
            .load_stem(role, bytes)
            .with_context(|| format!("Failed to decode {}", path.display()))?;
        Ok(())
    }

    pub fn clock(&self) -> &BeatClock {
        &self.clock
    }

    pub fn document(&self) -> &LyricDocument {
        &self.document
    }

    /// Sets a status message to display temporarily.
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    /// Clears expired status messages.
    pub fn clear_expired_status(&mut self) {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
            }
        }
    }

    /// Play, pause or resume depending on the current state.
    pub fn toggle_playback(&mut self) {
        match self.clock.state() {
            PlaybackState::Running => {
                self.clock.pause();
                self.set_status("Paused");
            }
            PlaybackState::Paused => {
                self.clock.resume();
                self.set_status("Playing");
            }
            PlaybackState::Idle => self.start_playback(),
        }
    }

    fn start_playback(&mut self) {
        self.discard_frames();
        match self.clock.start() {
            Ok(()) => self.set_status("Playing"),
            Err(e) if e.is_benign() => {}
            Err(e) if e.needs_unlock() => {
                self.set_status("Audio output is not ready - press Space to retry");
            }
            Err(e) => self.set_status(format!("Cannot play: {}", e)),
        }
    }

    /// Stops playback and returns to the first line.
    pub fn stop_playback(&mut self) {
        self.clock.stop();
        self.discard_frames();
        self.set_status("Stopped");
    }

    /// Stops and immediately starts again from the first beat.
    pub fn restart_playback(&mut self) {
        self.clock.stop();
        self.start_playback();
    }

    // A delivery already in flight when the clock stops can still arrive;
    // dropping queued frames keeps it off screen.
    fn discard_frames(&mut self) {
        while self.frames.try_recv().is_ok() {}
        self.presenter.reset();
        self.last_beat_at = None;
    }

    /// Changes the tempo by `delta` BPM, staying within 60-200.
    pub fn adjust_bpm(&mut self, delta: f64) {
        let target = self.clock.bpm() + delta;
        if is_valid_bpm(target) {
            self.clock.set_bpm(target);
            self.set_status(format!("BPM: {}", target));
        } else {
            self.set_status("BPM must stay between 60 and 200");
        }
    }

    /// Switches the audible stem between instrumental and vocals.
    pub fn toggle_vocals(&mut self) {
        let enabled = !self.clock.vocals_enabled();
        self.clock.set_vocals_enabled(enabled);
        self.set_status(if enabled { "Vocals on" } else { "Vocals off" });
    }

    pub fn toggle_click(&mut self) {
        let enabled = !self.clock.click_enabled();
        self.clock.set_click_enabled(enabled);
        self.set_status(if enabled { "Click on" } else { "Click off" });
    }

    /// Pulls every frame delivered since the last call. Called once per
    /// render loop iteration.
    pub fn update(&mut self) {
        let now = Instant::now();
        while let Ok(frame) = self.frames.try_recv() {
            self.presenter.push(frame, now);
            self.last_beat_at = Some(now);
        }
    }

    /// The frame to draw at `now`.
    pub fn displayed_frame(&self, now: Instant) -> Frame {
        self.presenter.displayed(now)
    }

    /// The words of the displayed line, tagged for highlighting.
    pub fn line_spans(&self, now: Instant) -> Option<Vec<WordSpan>> {
        let frame = self.displayed_frame(now);
        let line = self.document.line(frame.line_index?)?;
        let active_beat = frame.active_word.as_ref().map(|_| frame.beat_in_measure);
        Some(highlight(line, active_beat))
    }

    /// True for a short moment after each delivered beat.
    pub fn beat_flash(&self, now: Instant) -> bool {
        self.last_beat_at
            .is_some_and(|at| now.saturating_duration_since(at) < Duration::from_millis(120))
    }

    /// Detaches from the clock and shuts it down.
    pub fn shutdown(&mut self) {
        self.subscription.unsubscribe();
        self.clock.dispose();
    }
}
