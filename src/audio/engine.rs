//! Audio backend for real-time stem playback.
//!
//! Provides the audio clock, stem playback and the look-ahead tick
//! scheduler on top of rodio.

use super::backend::{AudioBackend, BackendError, StemHandle};
use super::lock;
use super::schedule::{RepeatSchedule, TickCallback};
use rodio::source::{Buffered, SineWave};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sample, Sink, Source, StreamError};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

/// Sample rate of the clock source (44.1 kHz standard).
pub const SAMPLE_RATE: u32 = 44100;

/// How far ahead of the audio clock ticks are emitted.
pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(100);

/// How often the scheduling thread polls.
const SCHEDULE_INTERVAL: Duration = Duration::from_millis(25);

/// Metronome click voice.
const CLICK_FREQUENCY: f32 = 1046.5; // C6
const CLICK_ACCENT_FREQUENCY: f32 = 1568.0; // G6
const CLICK_DURATION: Duration = Duration::from_millis(30);
const CLICK_LEVEL: f32 = 0.35;

type StemSource = Buffered<Decoder<Cursor<Vec<u8>>>>;

/// Silent source that counts rendered frames.
/// The frame count is the audio clock: it only advances as the device pulls.
struct ClockSource {
    frames: Arc<AtomicU64>,
}

impl Iterator for ClockSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        Some(0.0)
    }
}

impl Source for ClockSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        1 // One sample per frame keeps the count in frames
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None // Infinite stream
    }
}

/// A click that goes silent once withdrawn, even if it is already playing.
struct ClickVoice<S> {
    inner: S,
    withdrawn: Arc<AtomicBool>,
}

impl<S> Iterator for ClickVoice<S>
where
    S: Source,
    S::Item: Sample,
{
    type Item = S::Item;

    fn next(&mut self) -> Option<S::Item> {
        if self.withdrawn.load(Ordering::Relaxed) {
            None
        } else {
            self.inner.next()
        }
    }
}

impl<S> Source for ClickVoice<S>
where
    S: Source,
    S::Item: Sample,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

/// A click handed to the output, kept so it can be withdrawn.
struct QueuedClick {
    at: f64,
    withdrawn: Arc<AtomicBool>,
}

/// A decoded stem and its current sink.
struct StemSlot {
    id: String,
    source: StemSource,
    sink: Option<Sink>,
    volume: f32,
}

/// The open output device.
///
/// `OutputStream` cannot leave the thread that created it, so a dedicated
/// thread owns it and parks until `shutdown` is dropped.
struct OutputPort {
    handle: OutputStreamHandle,
    _shutdown: mpsc::Sender<()>,
}

/// State shared with the scheduling thread.
struct Shared {
    frames: Arc<AtomicU64>,
    output: Mutex<Option<OutputPort>>,
    stems: Mutex<HashMap<StemHandle, StemSlot>>,
    schedules: Mutex<Vec<RepeatSchedule>>,
    clicks: Mutex<Vec<QueuedClick>>,
    scheduler_running: AtomicBool,
    next_stem: AtomicU64,
    lookahead: f64,
}

impl Shared {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::Relaxed) as f64 / SAMPLE_RATE as f64
    }

    fn output_handle(&self) -> Option<OutputStreamHandle> {
        lock(&self.output).as_ref().map(|port| port.handle.clone())
    }

    /// Tracks a click due at `at`, forgetting clicks that have finished.
    fn queue_click(&self, at: f64) -> Arc<AtomicBool> {
        let done_before = self.now() - CLICK_DURATION.as_secs_f64();
        let withdrawn = Arc::new(AtomicBool::new(false));
        let mut clicks = lock(&self.clicks);
        clicks.retain(|c| c.at >= done_before);
        clicks.push(QueuedClick {
            at,
            withdrawn: Arc::clone(&withdrawn),
        });
        withdrawn
    }

    fn withdraw_clicks_after(&self, after: f64) {
        lock(&self.clicks).retain(|c| {
            if c.at > after {
                c.withdrawn.store(true, Ordering::Relaxed);
                false
            } else {
                true
            }
        });
    }

    fn poll_schedules(&self) {
        let schedules: Vec<RepeatSchedule> = {
            let mut schedules = lock(&self.schedules);
            schedules.retain(|s| !s.is_cancelled());
            schedules.clone()
        };
        let now = self.now();
        for schedule in &schedules {
            schedule.poll(now, self.lookahead);
        }
    }
}

/// Audio backend playing stems through the default output device.
///
/// Nothing touches the device until [`unlock`](AudioBackend::unlock), which
/// opens the stream, starts the audio clock and the scheduling thread.
pub struct RodioBackend {
    shared: Arc<Shared>,
}

impl RodioBackend {
    /// Creates a backend with the default look-ahead.
    pub fn new() -> Self {
        Self::with_lookahead(DEFAULT_LOOKAHEAD)
    }

    /// Creates a backend that emits ticks `lookahead` before they are audible.
    pub fn with_lookahead(lookahead: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                frames: Arc::new(AtomicU64::new(0)),
                output: Mutex::new(None),
                stems: Mutex::new(HashMap::new()),
                schedules: Mutex::new(Vec::new()),
                clicks: Mutex::new(Vec::new()),
                scheduler_running: AtomicBool::new(false),
                next_stem: AtomicU64::new(0),
                lookahead: lookahead.as_secs_f64(),
            }),
        }
    }

    /// Returns true once the output device is open.
    pub fn is_unlocked(&self) -> bool {
        lock(&self.shared.output).is_some()
    }

    /// Opens the default output on its own thread and starts the clock source.
    fn open_output(frames: Arc<AtomicU64>) -> Result<OutputPort, BackendError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let started = handle
                        .play_raw(ClockSource { frames })
                        .map(|_| handle)
                        .map_err(|e| BackendError::Unavailable(e.to_string()));
                    let failed = started.is_err();
                    let _ = ready_tx.send(started);
                    if !failed {
                        // Keep the stream alive until the backend is dropped.
                        let _ = shutdown_rx.recv();
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(stream_error(e)));
                }
            })
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(handle)) => Ok(OutputPort {
                handle,
                _shutdown: shutdown_tx,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BackendError::Unavailable(
                "audio output thread exited".to_string(),
            )),
        }
    }

    /// Starts the scheduling thread if it is not running.
    fn ensure_scheduler(&self) -> Result<(), BackendError> {
        if self.shared.scheduler_running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let spawned = thread::Builder::new()
            .name("beat-scheduler".to_string())
            .spawn(move || {
                // Exits once the backend is dropped.
                while let Some(shared) = weak.upgrade() {
                    shared.poll_schedules();
                    drop(shared);
                    thread::sleep(SCHEDULE_INTERVAL);
                }
            });

        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                self.shared.scheduler_running.store(false, Ordering::Release);
                Err(BackendError::SchedulerUnavailable(e.to_string()))
            }
        }
    }
}

/// A missing device cannot be fixed by retrying; anything else (device
/// busy, stream refused) may clear up.
fn stream_error(e: StreamError) -> BackendError {
    match e {
        StreamError::NoDevice => BackendError::Unavailable(e.to_string()),
        other => BackendError::Locked(other.to_string()),
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for RodioBackend {
    fn unlock(&self) -> Result<(), BackendError> {
        let mut output = lock(&self.shared.output);
        if output.is_none() {
            let port = Self::open_output(Arc::clone(&self.shared.frames))?;
            tracing::info!("Audio output opened");
            *output = Some(port);
        }
        Ok(())
    }

    fn load_stem(&self, id: &str, bytes: Vec<u8>) -> Result<StemHandle, BackendError> {
        let decoder = Decoder::new(Cursor::new(bytes)).map_err(|e| BackendError::Decode {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let handle = StemHandle(self.shared.next_stem.fetch_add(1, Ordering::Relaxed));
        lock(&self.shared.stems).insert(
            handle,
            StemSlot {
                id: id.to_string(),
                source: decoder.buffered(),
                sink: None,
                volume: 1.0,
            },
        );
        tracing::debug!("Decoded stem '{}' as {:?}", id, handle);
        Ok(handle)
    }

    fn play_synced(
        &self,
        stem: StemHandle,
        start_at: f64,
        looping: bool,
    ) -> Result<(), BackendError> {
        let output = self
            .shared
            .output_handle()
            .ok_or_else(|| BackendError::Locked("audio output not opened".to_string()))?;

        let mut stems = lock(&self.shared.stems);
        let slot = stems
            .get_mut(&stem)
            .ok_or(BackendError::UnknownStem(stem))?;

        let sink = Sink::try_new(&output).map_err(|e| BackendError::Unavailable(e.to_string()))?;
        sink.set_volume(slot.volume);

        let offset = Duration::from_secs_f64(start_at.max(0.0));
        let source: Box<dyn Source<Item = i16> + Send> = if looping {
            Box::new(slot.source.clone().repeat_infinite().skip_duration(offset))
        } else {
            Box::new(slot.source.clone().skip_duration(offset))
        };
        sink.append(source);

        if let Some(previous) = slot.sink.replace(sink) {
            previous.stop();
        }
        tracing::debug!("Playing stem '{}' from {:.3}s", slot.id, start_at);
        Ok(())
    }

    fn stop(&self, stem: StemHandle) {
        if let Some(slot) = lock(&self.shared.stems).get_mut(&stem) {
            if let Some(sink) = slot.sink.take() {
                sink.stop();
            }
        }
    }

    fn set_volume(&self, stem: StemHandle, level: f32) {
        if let Some(slot) = lock(&self.shared.stems).get_mut(&stem) {
            slot.volume = level;
            if let Some(sink) = &slot.sink {
                sink.set_volume(level);
            }
        }
    }

    fn set_paused(&self, stem: StemHandle, paused: bool) {
        if let Some(slot) = lock(&self.shared.stems).get(&stem) {
            if let Some(sink) = &slot.sink {
                if paused {
                    sink.pause();
                } else {
                    sink.play();
                }
            }
        }
    }

    fn now(&self) -> f64 {
        self.shared.now()
    }

    fn schedule(&self, bpm: f64, callback: TickCallback) -> Result<RepeatSchedule, BackendError> {
        self.ensure_scheduler()?;
        let schedule = RepeatSchedule::new(bpm, callback);
        lock(&self.shared.schedules).push(schedule.clone());
        Ok(schedule)
    }

    fn trigger_click(&self, at: f64, accent: bool) {
        let Some(output) = self.shared.output_handle() else {
            return;
        };
        let delay = Duration::from_secs_f64((at - self.now()).max(0.0));
        let frequency = if accent {
            CLICK_ACCENT_FREQUENCY
        } else {
            CLICK_FREQUENCY
        };
        let click = ClickVoice {
            inner: SineWave::new(frequency)
                .take_duration(CLICK_DURATION)
                .amplify(CLICK_LEVEL)
                .delay(delay),
            withdrawn: self.shared.queue_click(at),
        };
        if let Err(e) = output.play_raw(click) {
            tracing::debug!("Click dropped: {}", e);
        }
    }

    fn cancel_clicks_after(&self, after: f64) {
        self.shared.withdraw_clicks_after(after);
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        for slot in lock(&self.shared.stems).values_mut() {
            if let Some(sink) = slot.sink.take() {
                sink.stop();
            }
        }
        for schedule in lock(&self.shared.schedules).drain(..) {
            schedule.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_source_counts_frames() {
        let frames = Arc::new(AtomicU64::new(0));
        let mut source = ClockSource {
            frames: Arc::clone(&frames),
        };
        for _ in 0..SAMPLE_RATE {
            assert_eq!(source.next(), Some(0.0));
        }
        assert_eq!(frames.load(Ordering::Relaxed), SAMPLE_RATE as u64);
        assert_eq!(source.channels(), 1);
    }

    #[test]
    fn test_withdrawn_click_goes_silent() {
        let withdrawn = Arc::new(AtomicBool::new(false));
        let mut voice = ClickVoice {
            inner: SineWave::new(CLICK_FREQUENCY).take_duration(CLICK_DURATION),
            withdrawn: Arc::clone(&withdrawn),
        };
        assert!(voice.next().is_some());
        withdrawn.store(true, Ordering::Relaxed);
        assert_eq!(voice.next(), None);
    }

    #[test]
    fn test_withdraw_only_clicks_after_cutoff() {
        let backend = RodioBackend::new();
        let first = backend.shared.queue_click(0.0);
        let second = backend.shared.queue_click(0.5);
        let third = backend.shared.queue_click(1.0);

        backend.cancel_clicks_after(0.5);
        assert!(!first.load(Ordering::Relaxed));
        assert!(!second.load(Ordering::Relaxed));
        assert!(third.load(Ordering::Relaxed));

        backend.cancel_clicks_after(f64::NEG_INFINITY);
        assert!(first.load(Ordering::Relaxed));
        assert!(second.load(Ordering::Relaxed));
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        assert!(matches!(
            stream_error(StreamError::NoDevice),
            BackendError::Unavailable(_)
        ));
    }

    #[test]
    fn test_clock_starts_at_zero_before_unlock() {
        let backend = RodioBackend::new();
        assert_eq!(backend.now(), 0.0);
        assert!(!backend.is_unlocked());
    }

    #[test]
    fn test_invalid_stem_bytes_fail_to_decode() {
        let backend = RodioBackend::new();
        let err = backend
            .load_stem("vocals", b"definitely not audio".to_vec())
            .unwrap_err();
        assert!(matches!(err, BackendError::Decode { ref id, .. } if id == "vocals"));
    }

    #[test]
    #[ignore] // Requires an audio output device
    fn test_unlock_opens_output() {
        let backend = RodioBackend::new();
        backend.unlock().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(backend.now() > 0.0);
    }
}
