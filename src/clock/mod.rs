//! Beat clock: quarter-note events aligned to the audio transport.
//!
//! The clock owns a repeating schedule on its audio backend. The backend's
//! scheduling thread emits ticks ahead of their audible time; the clock
//! re-dispatches each one to subscribers after a compensating delay so the
//! event lands when the corresponding audio does.

mod beat_clock;
mod dispatch;
mod subscribers;

pub use beat_clock::BeatClock;
pub use dispatch::delivery_delay;
pub use subscribers::Subscription;

use crate::audio::BackendError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Slowest accepted tempo.
pub const MIN_BPM: f64 = 60.0;

/// Fastest accepted tempo.
pub const MAX_BPM: f64 = 200.0;

/// Tempo used when nothing else is configured.
pub const DEFAULT_BPM: f64 = 100.0;

/// Returns true if `bpm` is within the accepted range (inclusive).
///
/// Out-of-range values are ignored by the clock rather than clamped.
pub fn is_valid_bpm(bpm: f64) -> bool {
    (MIN_BPM..=MAX_BPM).contains(&bpm)
}

/// Milliseconds between ticks at the given tempo.
pub fn beat_interval_ms(bpm: f64) -> f64 {
    60_000.0 / bpm
}

/// One quarter-note tick delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatEvent {
    /// Tick number since the last fresh `start()`, from 0.
    pub sequence_number: u64,
    /// Audio clock time (seconds) at which the tick is audible.
    pub scheduled_audio_time: f64,
    /// Wall-clock time of delivery, in milliseconds since the Unix epoch.
    pub delivery_timestamp: f64,
}

/// Playback state owned by the clock.
///
/// `Idle --start--> Running --pause--> Paused --resume--> Running --stop--> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Not started, or stopped. A `start()` begins a fresh sequence.
    Idle,
    /// Ticks are being delivered.
    Running,
    /// Frozen in place; `resume()` continues from the same phase.
    Paused,
}

/// Errors from beat clock operations.
#[derive(Debug, Error)]
pub enum ClockError {
    /// `start()` was called while running or paused. No state changed.
    #[error("beat clock is already running")]
    AlreadyRunning,

    /// The audio output is not available yet. Retry after a user action.
    #[error("audio output is locked: {0}")]
    AudioLocked(#[source] BackendError),

    /// There is no audio output to open. Retrying will not help.
    #[error("audio output unavailable: {0}")]
    AudioUnavailable(#[source] BackendError),

    /// The tick scheduler could not be started. Playback cannot proceed.
    #[error("beat scheduler unavailable: {0}")]
    Scheduler(#[source] BackendError),

    /// The clock was disposed.
    #[error("beat clock has been disposed")]
    Disposed,
}

impl ClockError {
    /// True for errors that only report a redundant call.
    pub fn is_benign(&self) -> bool {
        matches!(self, ClockError::AlreadyRunning)
    }

    /// True when the caller should prompt the user and retry `start()`.
    pub fn needs_unlock(&self) -> bool {
        matches!(self, ClockError::AudioLocked(_))
    }
}
