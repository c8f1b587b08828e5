//! Delayed delivery of beat events.
//!
//! Ticks arrive from the backend's scheduling thread up to one look-ahead
//! window before they are audible. Each one is queued with a wall-clock
//! deadline and handed to subscribers by a single delivery thread, which
//! keeps events in sequence order and never runs a callback concurrently
//! with itself.
//!
//! Cancellation works through an epoch counter: pause, stop and dispose
//! bump it and every queued delivery from an older epoch is dropped. A
//! delivery that has already passed the epoch check still fires; that
//! race is accepted.

use super::subscribers::SubscriberList;
use super::BeatEvent;
use crate::audio::lock;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Delay between the current audio time and a tick's audible time.
///
/// Ticks already in the past are delivered immediately.
pub fn delivery_delay(scheduled_audio_time: f64, current_audio_time: f64) -> Duration {
    let seconds = scheduled_audio_time - current_audio_time;
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}

fn wall_clock_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Delivery bookkeeping shared by the tick handler, the delivery thread and
/// the clock.
#[derive(Debug, Default)]
struct Gate {
    epoch: u64,
    delivered: Delivered,
}

/// How far delivery got before a cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Delivered {
    /// Sequence number after the last delivered event: the first tick that
    /// has not reached subscribers.
    pub(crate) next_sequence: u64,
    /// Audio time of the last delivered tick, if any.
    pub(crate) last_audio_time: Option<f64>,
}

/// A tick waiting for its delivery deadline.
#[derive(Debug)]
struct Pending {
    sequence_number: u64,
    scheduled_audio_time: f64,
    due: Instant,
    epoch: u64,
}

/// Queues ticks and delivers them on a dedicated thread.
pub(crate) struct Dispatcher {
    gate: Arc<Mutex<Gate>>,
    subscribers: Arc<SubscriberList>,
    sender: Mutex<Option<Sender<Pending>>>,
}

impl Dispatcher {
    pub(crate) fn new(subscribers: Arc<SubscriberList>) -> Self {
        Self {
            gate: Arc::new(Mutex::new(Gate::default())),
            subscribers,
            sender: Mutex::new(None),
        }
    }

    /// Returns a queue handle for a new run, starting the delivery thread
    /// on first use. Resets the delivered sequence to 0.
    pub(crate) fn begin_run(&self) -> std::io::Result<TickQueue> {
        let sender = {
            let mut sender = lock(&self.sender);
            match sender.as_ref() {
                Some(tx) => tx.clone(),
                None => {
                    let (tx, rx) = mpsc::channel();
                    self.spawn(rx)?;
                    *sender = Some(tx.clone());
                    tx
                }
            }
        };

        let mut gate = lock(&self.gate);
        gate.epoch += 1;
        gate.delivered = Delivered::default();
        Ok(TickQueue {
            gate: Arc::clone(&self.gate),
            sender,
        })
    }

    fn spawn(&self, rx: Receiver<Pending>) -> std::io::Result<()> {
        let gate = Arc::clone(&self.gate);
        let subscribers = Arc::clone(&self.subscribers);
        thread::Builder::new()
            .name("beat-delivery".to_string())
            .spawn(move || deliver_loop(rx, gate, subscribers))
            .map(|_| ())
    }

    /// Drops every queued delivery.
    ///
    /// # Returns
    ///
    /// Where delivery stopped. Every dropped tick comes after it, both in
    /// sequence and in audio time.
    pub(crate) fn cancel_pending(&self) -> Delivered {
        let mut gate = lock(&self.gate);
        gate.epoch += 1;
        gate.delivered
    }

    /// Drops queued deliveries and lets the delivery thread exit once every
    /// outstanding queue handle is gone.
    pub(crate) fn shutdown(&self) {
        self.cancel_pending();
        lock(&self.sender).take();
    }
}

/// Enqueues ticks for delivery. Owned by a schedule's tick callback.
pub(crate) struct TickQueue {
    gate: Arc<Mutex<Gate>>,
    sender: Sender<Pending>,
}

impl TickQueue {
    /// Queues a tick for delivery after `delay`.
    pub(crate) fn push(&self, sequence_number: u64, scheduled_audio_time: f64, delay: Duration) {
        let epoch = lock(&self.gate).epoch;
        let pending = Pending {
            sequence_number,
            scheduled_audio_time,
            due: Instant::now() + delay,
            epoch,
        };
        if self.sender.send(pending).is_err() {
            tracing::debug!("Beat {} dropped: delivery stopped", sequence_number);
        }
    }
}

fn deliver_loop(rx: Receiver<Pending>, gate: Arc<Mutex<Gate>>, subscribers: Arc<SubscriberList>) {
    while let Ok(pending) = rx.recv() {
        if lock(&gate).epoch != pending.epoch {
            continue;
        }

        let wait = pending.due.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            thread::sleep(wait);
        }

        {
            let mut gate = lock(&gate);
            if gate.epoch != pending.epoch {
                continue;
            }
            gate.delivered = Delivered {
                next_sequence: pending.sequence_number + 1,
                last_audio_time: Some(pending.scheduled_audio_time),
            };
        }

        let event = BeatEvent {
            sequence_number: pending.sequence_number,
            scheduled_audio_time: pending.scheduled_audio_time,
            delivery_timestamp: wall_clock_ms(),
        };
        tracing::trace!(
            "Beat {} at audio time {:.3}",
            event.sequence_number,
            event.scheduled_audio_time
        );
        subscribers.notify(&event);
    }
    tracing::debug!("Beat delivery thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_delay() {
        assert_eq!(delivery_delay(1.25, 1.0), Duration::from_millis(250));
        assert_eq!(delivery_delay(1.0, 1.5), Duration::ZERO);
        assert_eq!(delivery_delay(1.0, 1.0), Duration::ZERO);
        assert_eq!(delivery_delay(f64::NAN, 1.0), Duration::ZERO);
    }

    #[test]
    fn test_queued_ticks_are_delivered_in_order() {
        let subscribers = SubscriberList::new();
        let (tx, rx) = mpsc::channel();
        subscribers.subscribe(Box::new(move |e| {
            let _ = tx.send(e.sequence_number);
        }));
        let dispatcher = Dispatcher::new(Arc::clone(&subscribers));
        let queue = dispatcher.begin_run().unwrap();
        queue.push(0, 0.0, Duration::from_millis(20));
        queue.push(1, 0.5, Duration::ZERO);

        let timeout = Duration::from_secs(2);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), 0);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), 1);
        assert_eq!(
            dispatcher.cancel_pending(),
            Delivered {
                next_sequence: 2,
                last_audio_time: Some(0.5),
            }
        );
    }

    #[test]
    fn test_cancelled_ticks_are_dropped() {
        let subscribers = SubscriberList::new();
        let (tx, rx) = mpsc::channel();
        subscribers.subscribe(Box::new(move |e| {
            let _ = tx.send(e.sequence_number);
        }));
        let dispatcher = Dispatcher::new(Arc::clone(&subscribers));
        let queue = dispatcher.begin_run().unwrap();
        queue.push(0, 0.0, Duration::from_millis(200));
        assert_eq!(dispatcher.cancel_pending(), Delivered::default());
        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }
}
