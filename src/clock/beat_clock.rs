//! The beat clock.

use super::dispatch::{delivery_delay, Delivered, Dispatcher};
use super::subscribers::{SubscriberList, Subscription};
use super::{is_valid_bpm, BeatEvent, ClockError, PlaybackState, DEFAULT_BPM};
use crate::audio::{
    lock, AudioBackend, BackendError, RepeatSchedule, Stem, StemHandle, StemMix, StemRole,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Beats per measure; the click is accented on the first.
const BEATS_PER_MEASURE: u64 = 4;

struct ClockInner {
    state: PlaybackState,
    bpm: f64,
    schedule: Option<RepeatSchedule>,
    stems: StemMix,
    disposed: bool,
}

/// Emits one [`BeatEvent`] per quarter note, aligned to the audio transport.
///
/// The clock owns the transport of its backend: starting, pausing and
/// stopping the clock does the same to the loaded stems. Every method takes
/// `&self`, so a clock can be shared behind an `Arc`.
pub struct BeatClock {
    backend: Arc<dyn AudioBackend>,
    inner: Mutex<ClockInner>,
    subscribers: Arc<SubscriberList>,
    dispatch: Dispatcher,
    click_enabled: Arc<AtomicBool>,
}

impl BeatClock {
    /// Creates an idle clock over `backend`.
    ///
    /// # Arguments
    ///
    /// * `backend` - Audio output this clock drives exclusively
    /// * `bpm` - Initial tempo; out-of-range values fall back to [`DEFAULT_BPM`]
    pub fn new(backend: Arc<dyn AudioBackend>, bpm: f64) -> Self {
        let bpm = if is_valid_bpm(bpm) {
            bpm
        } else {
            tracing::warn!("Initial BPM {} out of range, using {}", bpm, DEFAULT_BPM);
            DEFAULT_BPM
        };
        let subscribers = SubscriberList::new();
        Self {
            backend,
            inner: Mutex::new(ClockInner {
                state: PlaybackState::Idle,
                bpm,
                schedule: None,
                stems: StemMix::new(),
                disposed: false,
            }),
            dispatch: Dispatcher::new(Arc::clone(&subscribers)),
            subscribers,
            click_enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Starts a fresh run: sequence numbers restart at 0 and the stems
    /// play from transport zero.
    ///
    /// Blocks until the backend's output is unlocked.
    ///
    /// # Errors
    ///
    /// * [`ClockError::AlreadyRunning`] - Running or paused; nothing changed
    /// * [`ClockError::AudioLocked`] - Prompt the user, then call again
    /// * [`ClockError::AudioUnavailable`] - No output device; retrying won't help
    /// * [`ClockError::Scheduler`] - The tick schedule could not be created
    /// * [`ClockError::Disposed`] - The clock was disposed
    pub fn start(&self) -> Result<(), ClockError> {
        let mut inner = lock(&self.inner);
        if inner.disposed {
            return Err(ClockError::Disposed);
        }
        if inner.state != PlaybackState::Idle {
            return Err(ClockError::AlreadyRunning);
        }

        self.backend.unlock().map_err(|e| {
            tracing::error!("Cannot start beat clock: {}", e);
            match e {
                BackendError::Locked(_) => ClockError::AudioLocked(e),
                _ => ClockError::AudioUnavailable(e),
            }
        })?;

        let queue = self.dispatch.begin_run().map_err(|e| {
            tracing::error!("Cannot start beat delivery: {}", e);
            ClockError::Scheduler(BackendError::SchedulerUnavailable(e.to_string()))
        })?;

        let backend = Arc::clone(&self.backend);
        let click_enabled = Arc::clone(&self.click_enabled);
        let schedule = self
            .backend
            .schedule(
                inner.bpm,
                Box::new(move |tick| {
                    let delay = delivery_delay(tick.time, backend.now());
                    queue.push(tick.index, tick.time, delay);
                    if click_enabled.load(Ordering::Relaxed) {
                        backend.trigger_click(tick.time, tick.index % BEATS_PER_MEASURE == 0);
                    }
                }),
            )
            .map_err(|e| {
                tracing::error!("Cannot start beat clock: {}", e);
                ClockError::Scheduler(e)
            })?;

        for stem in inner.stems.iter() {
            self.backend
                .set_volume(stem.handle, inner.stems.volume_for(stem.role));
            if let Err(e) = self.backend.play_synced(stem.handle, 0.0, stem.looping) {
                tracing::warn!("Failed to play {} stem: {}", stem.role.id(), e);
            }
        }

        schedule.start(self.backend.now());
        inner.schedule = Some(schedule);
        inner.state = PlaybackState::Running;
        tracing::info!("Beat clock started at {} BPM", inner.bpm);
        Ok(())
    }

    /// Freezes ticks and stems in place. No-op unless running.
    ///
    /// Ticks scheduled ahead but not yet delivered are discarded here,
    /// along with their clicks, and emitted again after
    /// [`resume`](Self::resume), so the sequence never skips or repeats
    /// across the pause.
    pub fn pause(&self) {
        let mut inner = lock(&self.inner);
        if inner.state != PlaybackState::Running {
            return;
        }
        if let Some(schedule) = &inner.schedule {
            schedule.pause(self.backend.now());
            let delivered = self.withdraw_pending();
            schedule.rewind_to(delivered.next_sequence);
        }
        for stem in inner.stems.iter() {
            self.backend.set_paused(stem.handle, true);
        }
        inner.state = PlaybackState::Paused;
        tracing::info!("Beat clock paused");
    }

    /// Continues from the phase frozen by [`pause`](Self::pause). No-op
    /// unless paused.
    pub fn resume(&self) {
        let mut inner = lock(&self.inner);
        if inner.state != PlaybackState::Paused {
            return;
        }
        for stem in inner.stems.iter() {
            self.backend.set_paused(stem.handle, false);
        }
        if let Some(schedule) = &inner.schedule {
            schedule.resume(self.backend.now());
        }
        inner.state = PlaybackState::Running;
        tracing::info!("Beat clock resumed");
    }

    /// Halts ticks and stems and discards pending deliveries.
    ///
    /// A delivery the dispatcher has already committed to may still reach
    /// subscribers after this returns.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        if inner.state == PlaybackState::Idle {
            return;
        }
        self.halt(&mut inner);
        tracing::info!("Beat clock stopped");
    }

    fn halt(&self, inner: &mut ClockInner) {
        if let Some(schedule) = inner.schedule.take() {
            schedule.cancel();
        }
        for stem in inner.stems.iter() {
            self.backend.stop(stem.handle);
        }
        self.withdraw_pending();
        inner.state = PlaybackState::Idle;
    }

    /// Drops undelivered ticks and the clicks queued for them.
    ///
    /// The schedule must already be paused or cancelled so no new tick
    /// arrives in between.
    fn withdraw_pending(&self) -> Delivered {
        let delivered = self.dispatch.cancel_pending();
        self.backend
            .cancel_clicks_after(delivered.last_audio_time.unwrap_or(f64::NEG_INFINITY));
        delivered
    }

    /// Changes the tempo from the next tick onwards.
    ///
    /// Values outside [60, 200] are ignored and the current tempo is kept.
    pub fn set_bpm(&self, bpm: f64) {
        if !is_valid_bpm(bpm) {
            tracing::debug!("Ignoring out-of-range BPM {}", bpm);
            return;
        }
        let mut inner = lock(&self.inner);
        inner.bpm = bpm;
        if let Some(schedule) = &inner.schedule {
            schedule.set_bpm(self.backend.now(), bpm);
        }
        tracing::debug!("BPM set to {}", bpm);
    }

    pub fn bpm(&self) -> f64 {
        lock(&self.inner).bpm
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.inner).state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Running
    }

    /// Registers a beat subscriber.
    ///
    /// Callbacks run on the delivery thread in increasing sequence order.
    /// A callback may unsubscribe itself, or any other subscriber, while it
    /// runs.
    pub fn on_beat<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&BeatEvent) + Send + 'static,
    {
        self.subscribers.subscribe(Box::new(callback))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Stops playback, removes every subscriber and shuts down delivery.
    /// Calling it again does nothing.
    pub fn dispose(&self) {
        let mut inner = lock(&self.inner);
        if inner.disposed {
            return;
        }
        self.halt(&mut inner);
        self.subscribers.clear();
        self.dispatch.shutdown();
        inner.disposed = true;
        tracing::debug!("Beat clock disposed");
    }

    /// Decodes a stem and adds it to the mix, replacing any stem with the
    /// same role.
    ///
    /// A stem loaded mid-run joins at the next [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns the backend's decode error. Playback is unaffected; the role
    /// stays silent.
    pub fn load_stem(&self, role: StemRole, bytes: Vec<u8>) -> Result<StemHandle, BackendError> {
        let handle = self.backend.load_stem(role.id(), bytes).map_err(|e| {
            tracing::warn!("Failed to load {} stem: {}", role.id(), e);
            e
        })?;

        let mut inner = lock(&self.inner);
        let replaced = inner.stems.insert(Stem {
            role,
            handle,
            looping: true,
        });
        if let Some(old) = replaced {
            self.backend.stop(old.handle);
        }
        tracing::info!("Loaded {} stem", role.id());
        Ok(handle)
    }

    /// Selects which stem is audible: vocals when `enabled`, otherwise the
    /// instrumental.
    pub fn set_vocals_enabled(&self, enabled: bool) {
        let mut inner = lock(&self.inner);
        inner.stems.set_vocals_enabled(enabled);
        self.apply_volumes(&inner.stems);
    }

    pub fn vocals_enabled(&self) -> bool {
        lock(&self.inner).stems.vocals_enabled()
    }

    /// Sets the level of the audible stem, clamped to [0, 1].
    pub fn set_stem_level(&self, level: f32) {
        let mut inner = lock(&self.inner);
        inner.stems.set_level(level);
        self.apply_volumes(&inner.stems);
    }

    fn apply_volumes(&self, stems: &StemMix) {
        for stem in stems.iter() {
            self.backend.set_volume(stem.handle, stems.volume_for(stem.role));
        }
    }

    /// Turns the metronome click on or off. Takes effect on the next tick.
    pub fn set_click_enabled(&self, enabled: bool) {
        self.click_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn click_enabled(&self) -> bool {
        self.click_enabled.load(Ordering::Relaxed)
    }
}

impl Drop for BeatClock {
    fn drop(&mut self) {
        self.dispose();
    }
}
