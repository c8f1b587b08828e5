//! Presentation adapter between the beat clock and the renderer.
//!
//! [`attach`] subscribes a [`Coordinator`] to a clock and forwards one
//! [`Frame`] per beat over a channel, so the render loop never runs on the
//! delivery thread. [`Presenter`] keeps the latest frame and applies the
//! line lead-in: shortly after the last beat of a measure the next line is
//! shown, giving the singer a moment to read it.

use crate::clock::{BeatClock, Subscription};
use crate::coordinator::{Coordinator, Frame};
use crate::lyrics::LyricLine;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

/// Default delay after the last beat of a measure before the next line is shown.
pub const DEFAULT_LEAD_IN: Duration = Duration::from_millis(100);

/// Characters ignored at the end of a word when matching beat tokens.
const TRAILING_PUNCTUATION: [char; 4] = ['.', ',', '!', '?'];

/// Subscribes `coordinator` to `clock`.
///
/// # Returns
///
/// The subscription (unsubscribe to detach) and the receiving end of the
/// frame channel. Frames arrive in beat order.
pub fn attach(clock: &BeatClock, coordinator: Coordinator) -> (Subscription, Receiver<Frame>) {
    let (tx, rx) = mpsc::channel();
    let subscription = clock.on_beat(move |event| {
        // A closed receiver means the presenter is gone.
        let _ = tx.send(coordinator.on_event(event));
    });
    (subscription, rx)
}

/// Latest frame plus display smoothing.
#[derive(Debug, Clone)]
pub struct Presenter {
    lead_in: Duration,
    line_count: usize,
    current: Frame,
    received_at: Option<Instant>,
}

impl Presenter {
    /// Creates a presenter for a document with `line_count` lines.
    ///
    /// A zero `lead_in` disables the lead-in.
    pub fn new(line_count: usize, lead_in: Duration) -> Self {
        Self {
            lead_in,
            line_count,
            current: Frame::initial(),
            received_at: None,
        }
    }

    /// Records a newly delivered frame.
    pub fn push(&mut self, frame: Frame, at: Instant) {
        self.current = frame;
        self.received_at = Some(at);
    }

    /// The last frame delivered, unmodified.
    pub fn current(&self) -> &Frame {
        &self.current
    }

    /// Forgets the last frame, e.g. after the clock is stopped.
    pub fn reset(&mut self) {
        self.current = Frame::initial();
        self.received_at = None;
    }

    /// The frame to display at `now`.
    ///
    /// Once `lead_in` has elapsed after the last beat of a measure, this is
    /// the next line with no active word.
    pub fn displayed(&self, now: Instant) -> Frame {
        let mut frame = self.current.clone();
        if self.in_lead_in(now) {
            if let Some(line) = frame.line_index {
                frame.line_index = Some((line + 1) % self.line_count);
                frame.active_word = None;
                frame.silent = false;
            }
        }
        frame
    }

    fn in_lead_in(&self, now: Instant) -> bool {
        if self.lead_in.is_zero() || self.line_count == 0 || !self.current.ends_measure() {
            return false;
        }
        self.received_at
            .is_some_and(|at| now.saturating_duration_since(at) >= self.lead_in)
    }
}

/// How a displayed word relates to the beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordRole {
    /// Not tied to any beat.
    Plain,
    /// Sung on the given beat.
    Beat(usize),
    /// Sung on the given beat, which is the current one.
    Active(usize),
}

/// One whitespace-separated word of a line's display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSpan {
    pub text: String,
    pub role: WordRole,
}

fn normalize(word: &str) -> String {
    word.trim_end_matches(TRAILING_PUNCTUATION).to_lowercase()
}

/// Splits a line into words and tags the ones tied to a beat.
///
/// Beat tokens are matched in order, case-insensitively and on the whole
/// token, so `[Dande lion]` tags both words. Silence markers tag nothing.
/// The word(s) for `active_beat` are tagged [`WordRole::Active`].
pub fn highlight(line: &LyricLine, active_beat: Option<usize>) -> Vec<WordSpan> {
    let words: Vec<&str> = line.display_text.split_whitespace().collect();
    let keys: Vec<String> = words.iter().map(|w| normalize(w)).collect();
    let mut roles = vec![WordRole::Plain; words.len()];

    let mut cursor = 0;
    for mapping in &line.mappings {
        let Some(token) = mapping.active_word() else {
            continue;
        };
        let needle: Vec<String> = token.split_whitespace().map(normalize).collect();
        if needle.is_empty() || needle.len() > keys.len() {
            continue;
        }

        let found = (cursor..=keys.len() - needle.len())
            .find(|&start| keys[start..start + needle.len()] == needle[..]);
        if let Some(start) = found {
            let role = if active_beat == Some(mapping.beat_index) {
                WordRole::Active(mapping.beat_index)
            } else {
                WordRole::Beat(mapping.beat_index)
            };
            roles[start..start + needle.len()].fill(role);
            cursor = start + needle.len();
        }
    }

    words
        .into_iter()
        .zip(roles)
        .map(|(text, role)| WordSpan {
            text: text.to_string(),
            role,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ManualBackend;
    use crate::lyrics::parse;
    use std::sync::Arc;

    fn frame(seq: u64, line: usize, word: Option<&str>) -> Frame {
        Frame {
            sequence_number: seq,
            line_index: Some(line),
            beat_in_measure: (seq % 4) as usize,
            active_word: word.map(str::to_string),
            silent: false,
        }
    }

    #[test]
    fn test_lead_in_shows_next_line() {
        let start = Instant::now();
        let mut presenter = Presenter::new(3, Duration::from_millis(100));
        presenter.push(frame(11, 2, Some("x")), start);

        let before = presenter.displayed(start + Duration::from_millis(50));
        assert_eq!(before.line_index, Some(2));
        assert_eq!(before.active_word.as_deref(), Some("x"));

        let after = presenter.displayed(start + Duration::from_millis(150));
        assert_eq!(after.line_index, Some(0));
        assert_eq!(after.active_word, None);
        assert_eq!(presenter.current().line_index, Some(2));
    }

    #[test]
    fn test_lead_in_only_after_last_beat() {
        let start = Instant::now();
        let mut presenter = Presenter::new(3, Duration::from_millis(100));
        presenter.push(frame(6, 1, None), start);
        let shown = presenter.displayed(start + Duration::from_secs(1));
        assert_eq!(shown.line_index, Some(1));
    }

    #[test]
    fn test_zero_lead_in_disables() {
        let start = Instant::now();
        let mut presenter = Presenter::new(3, Duration::ZERO);
        presenter.push(frame(3, 0, None), start);
        assert_eq!(
            presenter.displayed(start + Duration::from_secs(1)).line_index,
            Some(0)
        );
    }

    #[test]
    fn test_reset() {
        let mut presenter = Presenter::new(2, DEFAULT_LEAD_IN);
        presenter.push(frame(3, 1, None), Instant::now());
        presenter.reset();
        assert_eq!(presenter.current(), &Frame::initial());
        assert_eq!(presenter.displayed(Instant::now()).line_index, None);
    }

    #[test]
    fn test_highlight_multi_word_token() {
        let doc = parse("[Dande lion] is [Yellow!] [-]");
        let spans = highlight(&doc.lines[0], Some(0));
        let roles: Vec<WordRole> = spans.iter().map(|s| s.role).collect();
        assert_eq!(
            roles,
            vec![
                WordRole::Active(0),
                WordRole::Active(0),
                WordRole::Plain,
                WordRole::Beat(1),
            ]
        );
        assert_eq!(spans[3].text, "Yellow!");
    }

    #[test]
    fn test_highlight_skips_silence() {
        let doc = parse("[A] [-] [B] [-]");
        let spans = highlight(&doc.lines[0], Some(1));
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|s| !matches!(s.role, WordRole::Active(_))));
        assert_eq!(spans[1].role, WordRole::Beat(2));
    }

    #[test]
    fn test_highlight_ignores_case_and_punctuation() {
        let line = LyricLine {
            display_text: "Hello, WORLD.".to_string(),
            mappings: vec![
                crate::lyrics::BeatMapping::word(0, "hello"),
                crate::lyrics::BeatMapping::word(1, "world"),
            ],
        };
        let roles: Vec<WordRole> = highlight(&line, Some(1)).iter().map(|s| s.role).collect();
        assert_eq!(roles, vec![WordRole::Beat(0), WordRole::Active(1)]);
    }

    #[test]
    fn test_attach_forwards_frames() {
        let backend = Arc::new(ManualBackend::new());
        let clock = BeatClock::new(backend.clone(), 120.0);
        let doc = Arc::new(parse("[A] [B]\n[C]"));
        let (subscription, rx) = attach(&clock, Coordinator::new(Some(doc)));

        clock.start().unwrap();
        backend.advance(0.0);
        backend.advance(0.5);
        let timeout = Duration::from_secs(2);
        assert_eq!(rx.recv_timeout(timeout).unwrap().active_word.as_deref(), Some("A"));
        assert_eq!(rx.recv_timeout(timeout).unwrap().active_word.as_deref(), Some("B"));

        assert!(subscription.unsubscribe());
        assert_eq!(clock.subscriber_count(), 0);
    }
}
