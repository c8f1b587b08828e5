//! A deterministic audio backend driven by hand.
//!
//! The audio clock only moves when [`ManualBackend::advance`] is called,
//! and every advance polls the registered schedules. Nothing is rendered;
//! every command is recorded so callers can inspect what the clock asked
//! for. Withdrawn clicks are removed from the record, since they never
//! sound. Used by the unit tests and by the offline simulation mode.

use super::backend::{AudioBackend, BackendError, StemHandle};
use super::lock;
use super::schedule::{RepeatSchedule, TickCallback};
use std::collections::HashMap;
use std::sync::Mutex;

/// A command received by the manual backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    PlaySynced {
        stem: StemHandle,
        start_at: f64,
        looping: bool,
    },
    Stop(StemHandle),
    SetVolume(StemHandle, f32),
    SetPaused(StemHandle, bool),
    Click { at: f64, accent: bool },
}

#[derive(Default)]
struct ManualState {
    locked: bool,
    output_missing: bool,
    scheduler_available: bool,
    next_stem: u64,
    stems: HashMap<StemHandle, String>,
    commands: Vec<BackendCommand>,
}

/// Audio backend with a manually advanced clock.
pub struct ManualBackend {
    now: Mutex<f64>,
    lookahead: f64,
    state: Mutex<ManualState>,
    schedules: Mutex<Vec<RepeatSchedule>>,
}

impl ManualBackend {
    /// Creates a backend at time zero with no look-ahead.
    pub fn new() -> Self {
        Self::with_lookahead(0.0)
    }

    /// Creates a backend whose polls emit ticks up to `lookahead` seconds early.
    pub fn with_lookahead(lookahead: f64) -> Self {
        Self {
            now: Mutex::new(0.0),
            lookahead: lookahead.max(0.0),
            state: Mutex::new(ManualState {
                scheduler_available: true,
                ..ManualState::default()
            }),
            schedules: Mutex::new(Vec::new()),
        }
    }

    /// Makes `unlock` fail until unlocked again.
    pub fn set_locked(&self, locked: bool) {
        lock(&self.state).locked = locked;
    }

    /// Makes `unlock` report that there is no output device at all.
    pub fn set_output_missing(&self, missing: bool) {
        lock(&self.state).output_missing = missing;
    }

    /// Makes `schedule` fail while unavailable.
    pub fn set_scheduler_available(&self, available: bool) {
        lock(&self.state).scheduler_available = available;
    }

    /// Advances the audio clock and polls every live schedule.
    ///
    /// # Returns
    ///
    /// The number of ticks emitted.
    pub fn advance(&self, seconds: f64) -> usize {
        let now = {
            let mut now = lock(&self.now);
            *now += seconds.max(0.0);
            *now
        };

        // Poll outside the list lock: tick callbacks read the clock.
        let schedules: Vec<RepeatSchedule> = {
            let mut schedules = lock(&self.schedules);
            schedules.retain(|s| !s.is_cancelled());
            schedules.clone()
        };
        schedules
            .iter()
            .map(|s| s.poll(now, self.lookahead))
            .sum()
    }

    /// Returns a copy of every command received so far.
    pub fn commands(&self) -> Vec<BackendCommand> {
        lock(&self.state).commands.clone()
    }

    /// Clears the command log.
    pub fn clear_commands(&self) {
        lock(&self.state).commands.clear();
    }

    /// Number of schedules that have not been cancelled.
    pub fn live_schedules(&self) -> usize {
        lock(&self.schedules)
            .iter()
            .filter(|s| !s.is_cancelled())
            .count()
    }

    fn record(&self, command: BackendCommand) {
        lock(&self.state).commands.push(command);
    }
}

impl Default for ManualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for ManualBackend {
    fn unlock(&self) -> Result<(), BackendError> {
        let state = lock(&self.state);
        if state.output_missing {
            Err(BackendError::Unavailable(
                "manual backend has no output".to_string(),
            ))
        } else if state.locked {
            Err(BackendError::Locked(
                "manual backend is locked".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn load_stem(&self, id: &str, bytes: Vec<u8>) -> Result<StemHandle, BackendError> {
        if bytes.is_empty() {
            return Err(BackendError::Decode {
                id: id.to_string(),
                reason: "no audio data".to_string(),
            });
        }
        let mut state = lock(&self.state);
        let handle = StemHandle(state.next_stem);
        state.next_stem += 1;
        state.stems.insert(handle, id.to_string());
        Ok(handle)
    }

    fn play_synced(
        &self,
        stem: StemHandle,
        start_at: f64,
        looping: bool,
    ) -> Result<(), BackendError> {
        if !lock(&self.state).stems.contains_key(&stem) {
            return Err(BackendError::UnknownStem(stem));
        }
        self.record(BackendCommand::PlaySynced {
            stem,
            start_at,
            looping,
        });
        Ok(())
    }

    fn stop(&self, stem: StemHandle) {
        self.record(BackendCommand::Stop(stem));
    }

    fn set_volume(&self, stem: StemHandle, level: f32) {
        self.record(BackendCommand::SetVolume(stem, level));
    }

    fn set_paused(&self, stem: StemHandle, paused: bool) {
        self.record(BackendCommand::SetPaused(stem, paused));
    }

    fn now(&self) -> f64 {
        *lock(&self.now)
    }

    fn schedule(&self, bpm: f64, callback: TickCallback) -> Result<RepeatSchedule, BackendError> {
        if !lock(&self.state).scheduler_available {
            return Err(BackendError::SchedulerUnavailable(
                "manual scheduler disabled".to_string(),
            ));
        }
        let schedule = RepeatSchedule::new(bpm, callback);
        lock(&self.schedules).push(schedule.clone());
        Ok(schedule)
    }

    fn trigger_click(&self, at: f64, accent: bool) {
        self.record(BackendCommand::Click { at, accent });
    }

    fn cancel_clicks_after(&self, after: f64) {
        lock(&self.state)
            .commands
            .retain(|c| !matches!(c, BackendCommand::Click { at, .. } if *at > after));
    }
}
