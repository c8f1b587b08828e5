//! Beat-to-lyric coordination.
//!
//! Every beat maps to a line and a beat within that line's measure. The
//! mapping is recomputed from the sequence number alone, so any beat can be
//! resolved without replaying the ones before it:
//!
//! ```text
//! beat_in_measure = sequence mod 4
//! line_index      = floor(sequence / 4) mod line_count
//! ```

use crate::clock::BeatEvent;
use crate::lyrics::{BeatMapping, LyricDocument};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Beats per measure. One measure is one lyric line.
pub const BEATS_PER_LINE: u64 = 4;

/// Cursor position derived from a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    pub line_index: usize,
    /// In [0, 3].
    pub beat_in_measure: usize,
}

impl CursorState {
    /// Derives the cursor for a beat.
    ///
    /// # Returns
    ///
    /// `None` when there are no lines to point at.
    pub fn from_sequence(sequence_number: u64, line_count: usize) -> Option<Self> {
        if line_count == 0 {
            return None;
        }
        let measure = sequence_number / BEATS_PER_LINE;
        Some(Self {
            line_index: (measure % line_count as u64) as usize,
            beat_in_measure: beat_in_measure(sequence_number),
        })
    }
}

fn beat_in_measure(sequence_number: u64) -> usize {
    (sequence_number % BEATS_PER_LINE) as usize
}

/// What a beat resolves to in a document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution<'a> {
    /// `None` when no document is loaded or it has no lines.
    pub line_index: Option<usize>,
    pub beat_in_measure: usize,
    /// The mapping whose beat index equals `beat_in_measure`, silent or not.
    pub active_mapping: Option<&'a BeatMapping>,
}

impl<'a> Resolution<'a> {
    /// The word to emphasize on this beat. Never set for a silent beat.
    pub fn active_word(&self) -> Option<&'a str> {
        self.active_mapping.and_then(BeatMapping::active_word)
    }

    pub fn is_silent(&self) -> bool {
        self.active_mapping.is_some_and(|m| m.is_silent)
    }
}

/// Resolves a beat against a document.
///
/// Pure: the result depends only on `sequence_number` and `document`.
pub fn resolve(sequence_number: u64, document: Option<&LyricDocument>) -> Resolution<'_> {
    let cursor = document.and_then(|doc| {
        CursorState::from_sequence(sequence_number, doc.line_count()).map(|c| (doc, c))
    });
    match cursor {
        Some((doc, cursor)) => Resolution {
            line_index: Some(cursor.line_index),
            beat_in_measure: cursor.beat_in_measure,
            active_mapping: doc
                .line(cursor.line_index)
                .and_then(|line| line.mapping_at(cursor.beat_in_measure)),
        },
        None => Resolution {
            line_index: None,
            beat_in_measure: beat_in_measure(sequence_number),
            active_mapping: None,
        },
    }
}

/// An owned resolution, ready to send across threads or serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub sequence_number: u64,
    pub line_index: Option<usize>,
    pub beat_in_measure: usize,
    pub active_word: Option<String>,
    pub silent: bool,
}

impl Frame {
    /// The frame shown before the first beat.
    pub fn initial() -> Self {
        Self {
            sequence_number: 0,
            line_index: None,
            beat_in_measure: 0,
            active_word: None,
            silent: false,
        }
    }

    /// True on the last beat of a measure.
    pub fn ends_measure(&self) -> bool {
        self.beat_in_measure as u64 == BEATS_PER_LINE - 1
    }
}

/// Turns beat events into frames for one loaded document.
#[derive(Debug, Clone, Default)]
pub struct Coordinator {
    document: Option<Arc<LyricDocument>>,
}

impl Coordinator {
    pub fn new(document: Option<Arc<LyricDocument>>) -> Self {
        Self { document }
    }

    pub fn document(&self) -> Option<&LyricDocument> {
        self.document.as_deref()
    }

    /// Resolves a sequence number into an owned frame.
    pub fn frame(&self, sequence_number: u64) -> Frame {
        let resolution = resolve(sequence_number, self.document());
        Frame {
            sequence_number,
            line_index: resolution.line_index,
            beat_in_measure: resolution.beat_in_measure,
            active_word: resolution.active_word().map(str::to_string),
            silent: resolution.is_silent(),
        }
    }

    pub fn on_event(&self, event: &BeatEvent) -> Frame {
        self.frame(event.sequence_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::parse;

    fn document() -> LyricDocument {
        parse("[A] [-] [B] [-]\n[C] [D]\nno beats here")
    }

    #[test]
    fn test_cursor_formula() {
        for seq in 0..50u64 {
            let cursor = CursorState::from_sequence(seq, 3).unwrap();
            assert_eq!(cursor.beat_in_measure as u64, seq % 4);
            assert_eq!(cursor.line_index as u64, (seq / 4) % 3);
        }
        assert!(CursorState::from_sequence(5, 0).is_none());
    }

    #[test]
    fn test_line_wraps_after_last_measure() {
        let doc = document();
        assert_eq!(resolve(11, Some(&doc)).line_index, Some(2));
        let wrapped = resolve(12, Some(&doc));
        assert_eq!(wrapped.line_index, Some(0));
        assert_eq!(wrapped.beat_in_measure, 0);
        assert_eq!(wrapped.active_word(), Some("A"));
    }

    #[test]
    fn test_recompute_matches_incremental() {
        let doc = document();
        let coordinator = Coordinator::new(Some(Arc::new(doc.clone())));
        let mut line = 0usize;
        let mut beat = 0usize;
        for seq in 0..40u64 {
            let frame = coordinator.frame(seq);
            assert_eq!(frame.line_index, Some(line));
            assert_eq!(frame.beat_in_measure, beat);
            beat += 1;
            if beat == 4 {
                beat = 0;
                line = (line + 1) % doc.line_count();
            }
        }
    }

    #[test]
    fn test_silence_never_activates() {
        let doc = document();
        let silent = resolve(1, Some(&doc));
        assert!(silent.is_silent());
        assert!(silent.active_mapping.is_some());
        assert_eq!(silent.active_word(), None);
        assert_eq!(resolve(2, Some(&doc)).active_word(), Some("B"));
    }

    #[test]
    fn test_beat_without_mapping() {
        let doc = document();
        // Line 1 has two mappings; beats 2 and 3 have none.
        let r = resolve(6, Some(&doc));
        assert_eq!(r.line_index, Some(1));
        assert!(r.active_mapping.is_none());
        assert!(!r.is_silent());
        // Line 2 has no mappings at all.
        assert!(resolve(8, Some(&doc)).active_mapping.is_none());
    }

    #[test]
    fn test_neutral_without_lines() {
        let none = resolve(7, None);
        assert_eq!(none.line_index, None);
        assert_eq!(none.beat_in_measure, 3);
        assert!(none.active_mapping.is_none());

        let empty = LyricDocument::default();
        assert_eq!(resolve(7, Some(&empty)).line_index, None);

        let frame = Coordinator::default().frame(7);
        assert_eq!(frame.line_index, None);
        assert!(frame.ends_measure());
    }

    #[test]
    fn test_frame_from_event() {
        let coordinator = Coordinator::new(Some(Arc::new(document())));
        let event = BeatEvent {
            sequence_number: 5,
            scheduled_audio_time: 2.5,
            delivery_timestamp: 0.0,
        };
        let frame = coordinator.on_event(&event);
        assert_eq!(
            frame,
            Frame {
                sequence_number: 5,
                line_index: Some(1),
                beat_in_measure: 1,
                active_word: Some("D".to_string()),
                silent: false,
            }
        );
    }
}
