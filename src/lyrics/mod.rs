//! Lyric data structures for beat-aligned karaoke lines.
//!
//! A lyric document is parsed once from an annotated text format and then
//! shared read-only with the playback session. Each line carries one
//! mapping per bracketed token, numbered from beat 0 within that line.

mod parser;

pub use parser::{load_document, parse};

use serde::{Deserialize, Serialize};

/// A single beat slot within a lyric line.
///
/// Either a word mapping (`word` set, `is_silent == false`) or a silence
/// marker (`word` absent, `is_silent == true`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatMapping {
    /// Beat position within the line, starting at 0.
    pub beat_index: usize,
    /// The bracketed token content, verbatim.
    pub word: Option<String>,
    /// True for a `[-]` silent beat.
    pub is_silent: bool,
}

impl BeatMapping {
    /// Creates a word mapping for the given beat.
    pub fn word(beat_index: usize, word: impl Into<String>) -> Self {
        Self {
            beat_index,
            word: Some(word.into()),
            is_silent: false,
        }
    }

    /// Creates a silence marker for the given beat.
    pub fn silence(beat_index: usize) -> Self {
        Self {
            beat_index,
            word: None,
            is_silent: true,
        }
    }

    /// Returns the word if this mapping can be highlighted.
    ///
    /// Silence markers never yield a word.
    pub fn active_word(&self) -> Option<&str> {
        if self.is_silent {
            None
        } else {
            self.word.as_deref()
        }
    }
}

/// One lyric line: the text to display and its per-beat mappings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LyricLine {
    /// Line text with bracket syntax stripped and silence markers removed.
    pub display_text: String,
    /// Mappings sorted by `beat_index`, contiguous from 0.
    pub mappings: Vec<BeatMapping>,
}

impl LyricLine {
    /// Returns the mapping for the given beat, if the line has one.
    pub fn mapping_at(&self, beat_index: usize) -> Option<&BeatMapping> {
        // Mappings are contiguous from 0, so the index is the beat.
        self.mappings
            .get(beat_index)
            .filter(|m| m.beat_index == beat_index)
    }

    /// Number of word (non-silent) mappings in this line.
    pub fn word_count(&self) -> usize {
        self.mappings.iter().filter(|m| !m.is_silent).count()
    }
}

/// A parsed lyric sheet with optional metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LyricDocument {
    /// Song title from the `TITLE:` header, empty if absent.
    pub title: String,
    /// Artist from the `ARTIST:` header, empty if absent.
    pub artist: String,
    /// Lyric lines in source order.
    pub lines: Vec<LyricLine>,
}

impl LyricDocument {
    /// Returns true if the document has no lyric lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the number of lyric lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns the line at the given index.
    pub fn line(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    /// A display heading such as "Dandelion - Ada", or whichever part exists.
    pub fn heading(&self) -> String {
        match (self.title.is_empty(), self.artist.is_empty()) {
            (false, false) => format!("{} - {}", self.title, self.artist),
            (false, true) => self.title.clone(),
            (true, false) => self.artist.clone(),
            (true, true) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_at_uses_beat_index() {
        let line = LyricLine {
            display_text: "A B".to_string(),
            mappings: vec![
                BeatMapping::word(0, "A"),
                BeatMapping::silence(1),
                BeatMapping::word(2, "B"),
            ],
        };
        assert_eq!(line.mapping_at(2).and_then(|m| m.word.as_deref()), Some("B"));
        assert!(line.mapping_at(1).unwrap().is_silent);
        assert!(line.mapping_at(3).is_none());
        assert_eq!(line.word_count(), 2);
    }

    #[test]
    fn test_silence_has_no_active_word() {
        assert_eq!(BeatMapping::silence(0).active_word(), None);
        assert_eq!(BeatMapping::word(0, "Hi").active_word(), Some("Hi"));
    }

    #[test]
    fn test_heading() {
        let mut doc = LyricDocument::default();
        assert_eq!(doc.heading(), "");
        doc.title = "Dandelion".to_string();
        assert_eq!(doc.heading(), "Dandelion");
        doc.artist = "Ada".to_string();
        assert_eq!(doc.heading(), "Dandelion - Ada");
    }
}
