//! Audio output for beat-synchronized playback.
//!
//! This module provides the backend the beat clock drives. It supports:
//! - A monotonic audio clock independent of transport pause state
//! - Synced playback of an instrumental and a vocal stem
//! - Look-ahead scheduling of repeating quarter-note ticks
//! - A metronome click voiced at each tick's exact audio time

pub mod backend;
pub mod engine;
pub mod manual;
pub mod schedule;
pub mod stems;

pub use backend::{AudioBackend, BackendError, StemHandle};
pub use engine::RodioBackend;
pub use manual::{BackendCommand, ManualBackend};
pub use schedule::{RepeatSchedule, Tick, TickCallback};
pub use stems::{Stem, StemMix, StemRole};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
