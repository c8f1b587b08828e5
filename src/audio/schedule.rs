//! Look-ahead repeating schedule for quarter-note ticks.
//!
//! A schedule maps audio clock time to a transport position in beats.
//! Backends poll it from their scheduling thread; each poll emits every tick
//! whose audio time falls inside `now + lookahead`, so callbacks run slightly
//! before the tick is audible and the consumer compensates with a delay.
//!
//! Tempo changes and pause/resume re-anchor the mapping at the current
//! position instead of restarting it, so the beat phase is never lost.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A single tick of a repeating schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Tick number since the schedule started, from 0.
    pub index: u64,
    /// Audio clock time at which the tick is audible.
    pub time: f64,
}

/// Callback invoked on the scheduling thread for every due tick.
pub type TickCallback = Box<dyn FnMut(Tick) + Send>;

/// Lower bound on tempo so tick spacing stays finite.
const MIN_BPM: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduleState {
    /// Created but not started.
    Pending,
    Started,
    Paused,
    Cancelled,
}

struct ScheduleInner {
    state: ScheduleState,
    bpm: f64,
    /// Audio time of the anchor point.
    anchor_time: f64,
    /// Transport position in beats at the anchor point.
    anchor_beats: f64,
    /// Next tick to emit.
    next_tick: u64,
    callback: Option<TickCallback>,
}

impl ScheduleInner {
    fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    fn position(&self, now: f64) -> f64 {
        match self.state {
            ScheduleState::Started => {
                self.anchor_beats + (now - self.anchor_time) / self.seconds_per_beat()
            }
            _ => self.anchor_beats,
        }
    }

    fn time_of(&self, tick: u64) -> f64 {
        self.anchor_time + (tick as f64 - self.anchor_beats) * self.seconds_per_beat()
    }

    fn rebase(&mut self, now: f64) {
        self.anchor_beats = self.position(now);
        self.anchor_time = now;
    }
}

/// A repeating quarter-note schedule shared between its owner and the
/// backend's scheduling thread.
///
/// Cloning yields another handle to the same schedule.
#[derive(Clone)]
pub struct RepeatSchedule {
    inner: Arc<Mutex<ScheduleInner>>,
}

impl RepeatSchedule {
    /// Creates a pending schedule at the given tempo.
    pub fn new(bpm: f64, callback: TickCallback) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScheduleInner {
                state: ScheduleState::Pending,
                bpm: bpm.max(MIN_BPM),
                anchor_time: 0.0,
                anchor_beats: 0.0,
                next_tick: 0,
                callback: Some(callback),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScheduleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the transport at position zero; tick 0 falls at `now`.
    pub fn start(&self, now: f64) {
        let mut inner = self.lock();
        if inner.state == ScheduleState::Cancelled {
            return;
        }
        inner.state = ScheduleState::Started;
        inner.anchor_time = now;
        inner.anchor_beats = 0.0;
        inner.next_tick = 0;
    }

    /// Freezes the transport position. No ticks are emitted while paused.
    ///
    /// Waits for any in-progress poll to finish, so no callback is running
    /// once this returns.
    pub fn pause(&self, now: f64) {
        let mut inner = self.lock();
        if inner.state == ScheduleState::Started {
            inner.rebase(now);
            inner.state = ScheduleState::Paused;
        }
    }

    /// Continues from the position frozen by [`pause`](Self::pause).
    pub fn resume(&self, now: f64) {
        let mut inner = self.lock();
        if inner.state == ScheduleState::Paused {
            inner.anchor_time = now;
            inner.state = ScheduleState::Started;
        }
    }

    /// Changes the tempo from `now` onwards.
    ///
    /// Ticks already emitted keep their times; the next tick is placed at
    /// the new spacing relative to the current position.
    pub fn set_bpm(&self, now: f64, bpm: f64) {
        let mut inner = self.lock();
        inner.rebase(now);
        inner.bpm = bpm.max(MIN_BPM);
    }

    /// Sets the next tick to emit. Used to re-emit ticks that were
    /// scheduled but discarded across a pause.
    pub fn rewind_to(&self, tick: u64) {
        let mut inner = self.lock();
        if inner.state != ScheduleState::Cancelled {
            inner.next_tick = tick;
        }
    }

    /// Cancels the schedule and drops its callback. Irreversible.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        inner.state = ScheduleState::Cancelled;
        inner.callback = None;
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.lock().state == ScheduleState::Cancelled
    }

    /// Current tempo.
    pub fn bpm(&self) -> f64 {
        self.lock().bpm
    }

    /// Transport position in beats at audio time `now`.
    pub fn position(&self, now: f64) -> f64 {
        self.lock().position(now)
    }

    /// Index of the next tick to be emitted.
    pub fn next_tick(&self) -> u64 {
        self.lock().next_tick
    }

    /// Emits every tick whose audio time is at or before `now + lookahead`.
    ///
    /// The callback runs while the schedule is locked, so it must not call
    /// back into this schedule.
    ///
    /// # Returns
    ///
    /// The number of ticks emitted.
    pub fn poll(&self, now: f64, lookahead: f64) -> usize {
        let mut inner = self.lock();
        if inner.state != ScheduleState::Started {
            return 0;
        }

        let horizon = now + lookahead.max(0.0);
        let mut fired = 0;
        while inner.time_of(inner.next_tick) <= horizon {
            let tick = Tick {
                index: inner.next_tick,
                time: inner.time_of(inner.next_tick),
            };
            inner.next_tick += 1;
            fired += 1;
            if let Some(callback) = inner.callback.as_mut() {
                callback(tick);
            }
        }
        fired
    }
}

impl std::fmt::Debug for RepeatSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("RepeatSchedule")
            .field("state", &inner.state)
            .field("bpm", &inner.bpm)
            .field("next_tick", &inner.next_tick)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recording(bpm: f64) -> (RepeatSchedule, mpsc::Receiver<Tick>) {
        let (tx, rx) = mpsc::channel();
        let schedule = RepeatSchedule::new(
            bpm,
            Box::new(move |tick| {
                let _ = tx.send(tick);
            }),
        );
        (schedule, rx)
    }

    fn drain(rx: &mpsc::Receiver<Tick>) -> Vec<Tick> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_pending_schedule_does_not_fire() {
        let (schedule, rx) = recording(120.0);
        assert_eq!(schedule.poll(10.0, 0.1), 0);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_ticks_spaced_by_tempo() {
        let (schedule, rx) = recording(120.0);
        schedule.start(1.0);
        schedule.poll(2.0, 0.0);
        let ticks = drain(&rx);
        let times: Vec<f64> = ticks.iter().map(|t| t.time).collect();
        assert_eq!(times, vec![1.0, 1.5, 2.0]);
        assert_eq!(ticks[2].index, 2);
    }

    #[test]
    fn test_lookahead_fires_early() {
        let (schedule, rx) = recording(60.0);
        schedule.start(0.0);
        schedule.poll(0.0, 0.0);
        assert_eq!(drain(&rx).len(), 1);
        schedule.poll(0.95, 0.1);
        let ticks = drain(&rx);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].time, 1.0);
    }

    #[test]
    fn test_pause_freezes_phase() {
        let (schedule, rx) = recording(120.0);
        schedule.start(0.0);
        schedule.poll(0.0, 0.0);
        schedule.pause(0.25);
        assert_eq!(schedule.poll(5.0, 0.0), 0);
        assert!((schedule.position(5.0) - 0.5).abs() < 1e-9);

        schedule.resume(10.0);
        drain(&rx);
        schedule.poll(10.25, 0.0);
        let ticks = drain(&rx);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].index, 1);
        assert!((ticks[0].time - 10.25).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_change_applies_forward() {
        let (schedule, rx) = recording(60.0);
        schedule.start(0.0);
        schedule.poll(1.0, 0.0);
        assert_eq!(drain(&rx).len(), 2);

        schedule.set_bpm(1.0, 120.0);
        assert_eq!(schedule.bpm(), 120.0);
        schedule.poll(2.0, 0.0);
        let times: Vec<f64> = drain(&rx).iter().map(|t| t.time).collect();
        assert_eq!(times, vec![1.5, 2.0]);
    }

    #[test]
    fn test_rewind_reemits_discarded_tick() {
        let (schedule, rx) = recording(120.0);
        schedule.start(0.0);
        schedule.poll(0.4, 0.2);
        assert_eq!(drain(&rx).len(), 2);

        schedule.pause(0.4);
        assert_eq!(schedule.next_tick(), 2);
        schedule.rewind_to(1);
        assert_eq!(schedule.next_tick(), 1);
        schedule.resume(1.0);
        // Position 0.8 was frozen, so tick 1 is 0.2 beats after resume.
        schedule.poll(1.1, 0.0);
        let ticks = drain(&rx);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].index, 1);
        assert!((ticks[0].time - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_cancel_drops_callback() {
        let (schedule, rx) = recording(120.0);
        schedule.start(0.0);
        schedule.cancel();
        assert!(schedule.is_cancelled());
        assert_eq!(schedule.poll(1.0, 0.0), 0);
        drop(schedule);
        // The sender was owned by the callback.
        assert!(rx.recv().is_err());
    }
}
