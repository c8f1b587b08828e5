//! Annotated lyric text parsing.
//!
//! The format is line-oriented:
//!
//! ```text
//! TITLE: Dandelion
//! ARTIST: Ada
//! [Blow] the [dande] [-] [lion]
//! ```
//!
//! `[word]` marks a beat-aligned word and `[-]` a silent beat. Beats are
//! numbered per line from 0 in left-to-right bracket order. Parsing never
//! fails: malformed input degrades to empty metadata or mapping-less lines.

use super::{BeatMapping, LyricDocument, LyricLine};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

const TITLE_PREFIX: &str = "TITLE:";
const ARTIST_PREFIX: &str = "ARTIST:";

/// Content of a silent beat token.
const SILENCE_TOKEN: &str = "-";

/// A bracketed token with non-empty content. An unterminated `[` never matches.
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").expect("valid token pattern"));

static SILENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[-\]").expect("valid silence pattern"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Parses annotated lyric text into a document.
///
/// # Arguments
///
/// * `raw` - The full lyric file contents
///
/// # Returns
///
/// The parsed document. Metadata lines (`TITLE:` / `ARTIST:`, case-sensitive
/// prefix) are excluded from the lyric lines; the first of each wins.
///
/// # Examples
///
/// ```
/// use pulsehead::lyrics::parse;
///
/// let doc = parse("TITLE: X\nARTIST: Y\n[Hi] [there]");
/// assert_eq!(doc.title, "X");
/// assert_eq!(doc.lines[0].display_text, "Hi there");
/// ```
pub fn parse(raw: &str) -> LyricDocument {
    let mut title: Option<String> = None;
    let mut artist: Option<String> = None;
    let mut lines = Vec::new();

    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        if let Some(rest) = line.strip_prefix(TITLE_PREFIX) {
            title.get_or_insert_with(|| rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix(ARTIST_PREFIX) {
            artist.get_or_insert_with(|| rest.trim().to_string());
        } else {
            lines.push(parse_line(line));
        }
    }

    LyricDocument {
        title: title.unwrap_or_default(),
        artist: artist.unwrap_or_default(),
        lines,
    }
}

/// Parses a single lyric line into its display text and beat mappings.
fn parse_line(line: &str) -> LyricLine {
    let mappings = TOKEN
        .captures_iter(line)
        .enumerate()
        .map(|(beat, caps)| {
            let content = &caps[1];
            if content == SILENCE_TOKEN {
                BeatMapping::silence(beat)
            } else {
                BeatMapping::word(beat, content)
            }
        })
        .collect();

    // Silence markers vanish entirely; words get padded so adjacent
    // tokens never fuse, then whitespace is normalized.
    let without_silence = SILENCE.replace_all(line, "");
    let spaced = TOKEN.replace_all(&without_silence, " ${1} ");
    let display_text = WHITESPACE.replace_all(&spaced, " ").trim().to_string();

    LyricLine {
        display_text,
        mappings,
    }
}

/// Loads and parses a lyric file.
///
/// Load failures are not fatal: the error is logged and an empty document
/// is returned so playback can continue without lyrics.
pub fn load_document<P: AsRef<Path>>(path: P) -> LyricDocument {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(text) => {
            let doc = parse(&text);
            tracing::info!(
                "Loaded lyrics {:?}: {} lines, title {:?}",
                path,
                doc.line_count(),
                doc.title
            );
            doc
        }
        Err(e) => {
            tracing::warn!("Failed to load lyrics {:?}: {}", path, e);
            LyricDocument::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_and_silences() {
        let doc = parse("[A] [-] [B] [-]");
        let line = &doc.lines[0];
        assert_eq!(
            line.mappings,
            vec![
                BeatMapping::word(0, "A"),
                BeatMapping::silence(1),
                BeatMapping::word(2, "B"),
                BeatMapping::silence(3),
            ]
        );
        assert_eq!(line.display_text, "A B");
    }

    #[test]
    fn test_metadata_headers() {
        let doc = parse("TITLE: X\nARTIST: Y\n[Hi] [there]");
        assert_eq!(doc.title, "X");
        assert_eq!(doc.artist, "Y");
        assert_eq!(doc.lines.len(), 1);
        assert_eq!(
            doc.lines[0].mappings,
            vec![BeatMapping::word(0, "Hi"), BeatMapping::word(1, "there")]
        );
        assert_eq!(doc.lines[0].display_text, "Hi there");
    }

    #[test]
    fn test_first_header_wins_and_all_are_excluded() {
        let doc = parse("TITLE:  First \n[a]\nTITLE: Second\nARTIST: Z\n[b]");
        assert_eq!(doc.title, "First");
        assert_eq!(doc.artist, "Z");
        assert_eq!(doc.lines.len(), 2);
    }

    #[test]
    fn test_headers_are_case_sensitive() {
        let doc = parse("title: lower\n[x]");
        assert_eq!(doc.title, "");
        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.lines[0].display_text, "title: lower");
    }

    #[test]
    fn test_blank_lines_skipped() {
        let doc = parse("\n   \n[a] b\r\n\n[c]\n");
        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.lines[0].display_text, "a b");
    }

    #[test]
    fn test_line_without_tokens() {
        let doc = parse("   just words here  ");
        assert!(doc.lines[0].mappings.is_empty());
        assert_eq!(doc.lines[0].display_text, "just words here");
    }

    #[test]
    fn test_unterminated_bracket_is_literal() {
        let doc = parse("[open and [closed] done");
        let line = &doc.lines[0];
        // The first `[` is swallowed into the only complete token's content.
        assert_eq!(line.mappings.len(), 1);
        assert_eq!(line.mappings[0].word.as_deref(), Some("open and [closed"));

        let doc = parse("tail [never closed");
        assert!(doc.lines[0].mappings.is_empty());
        assert_eq!(doc.lines[0].display_text, "tail [never closed");
    }

    #[test]
    fn test_empty_brackets_are_literal() {
        let doc = parse("a [] b");
        assert!(doc.lines[0].mappings.is_empty());
        assert_eq!(doc.lines[0].display_text, "a [] b");
    }

    #[test]
    fn test_multi_word_token_and_punctuation() {
        let doc = parse("[Dande lion], [Blow!]");
        let line = &doc.lines[0];
        assert_eq!(line.mappings[0].word.as_deref(), Some("Dande lion"));
        assert_eq!(line.mappings[1].word.as_deref(), Some("Blow!"));
        assert_eq!(line.display_text, "Dande lion , Blow!");
    }

    #[test]
    fn test_adjacent_tokens_do_not_fuse() {
        let doc = parse("[dan][de][-][lion]");
        assert_eq!(doc.lines[0].display_text, "dan de lion");
        assert_eq!(doc.lines[0].mappings.len(), 4);
        assert!(doc.lines[0].mappings[2].is_silent);
    }

    #[test]
    fn test_beats_restart_per_line() {
        let doc = parse("[a] [b]\n[c]");
        assert_eq!(doc.lines[1].mappings[0].beat_index, 0);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let doc = load_document("/nonexistent/lyrics/file.md");
        assert!(doc.is_empty());
        assert_eq!(doc.title, "");
    }
}
