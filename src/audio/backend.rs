//! The audio output backend consumed by the beat clock.
//!
//! A backend decodes and mixes stems, exposes a monotonic audio clock and
//! runs a look-ahead scheduler for repeating ticks. The clock owns one
//! backend instance, injected at construction, so independent sessions
//! never share transport state.

use super::schedule::{RepeatSchedule, TickCallback};
use thiserror::Error;

/// Opaque handle to a decoded stem owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StemHandle(pub(crate) u64);

/// Errors reported by an audio backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// The output is not running yet and needs a user-driven unlock.
    #[error("audio output is locked: {0}")]
    Locked(String),

    /// No usable audio output.
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    /// A stem could not be decoded.
    #[error("failed to decode stem '{id}': {reason}")]
    Decode { id: String, reason: String },

    /// The handle does not refer to a loaded stem.
    #[error("unknown stem handle {0:?}")]
    UnknownStem(StemHandle),

    /// The repeating scheduler could not be started.
    #[error("scheduler unavailable: {0}")]
    SchedulerUnavailable(String),
}

/// Audio output operations the beat clock depends on.
///
/// Times are seconds on the backend's audio clock (`now()`), which is
/// monotonic and independent of the transport's pause state.
pub trait AudioBackend: Send + Sync {
    /// Makes sure the audio output is running.
    ///
    /// Fails with [`BackendError::Locked`] when the caller must retry after
    /// an explicit user action, and with [`BackendError::Unavailable`] when
    /// there is no output to open.
    fn unlock(&self) -> Result<(), BackendError>;

    /// Decodes a stem from encoded bytes.
    fn load_stem(&self, id: &str, bytes: Vec<u8>) -> Result<StemHandle, BackendError>;

    /// Starts playing a stem from `start_at` seconds into it.
    fn play_synced(&self, stem: StemHandle, start_at: f64, looping: bool)
        -> Result<(), BackendError>;

    /// Stops a playing stem. Stopping an idle stem is a no-op.
    fn stop(&self, stem: StemHandle);

    /// Sets a stem's level (0.0 silent, 1.0 unity).
    fn set_volume(&self, stem: StemHandle, level: f32);

    /// Freezes or unfreezes a playing stem in place.
    fn set_paused(&self, stem: StemHandle, paused: bool);

    /// Current audio clock time in seconds.
    fn now(&self) -> f64;

    /// Registers a repeating quarter-note schedule at the given tempo.
    ///
    /// The returned schedule is not started; the backend's scheduling thread
    /// polls it with look-ahead and invokes `callback` ahead of each tick's
    /// audible time.
    fn schedule(&self, bpm: f64, callback: TickCallback) -> Result<RepeatSchedule, BackendError>;

    /// Queues a metronome click at the given audio time.
    fn trigger_click(&self, _at: f64, _accent: bool) {}

    /// Withdraws queued clicks scheduled strictly after audio time `after`.
    /// Pass `f64::NEG_INFINITY` to withdraw every queued click.
    fn cancel_clicks_after(&self, _after: f64) {}
}
