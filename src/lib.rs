//! pulsehead - A terminal karaoke practice tool.
//!
//! This library provides the beat-synchronization engine: a beat clock
//! aligned to an audio transport, a lyric parser, and the coordinator that
//! maps each beat to a lyric line and word.

pub mod app;
pub mod audio;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod lyrics;
pub mod presenter;
pub mod ui;

// Re-export commonly used types
pub use app::App;
pub use audio::{AudioBackend, BackendError, ManualBackend, RodioBackend};
pub use clock::{BeatClock, BeatEvent, ClockError, PlaybackState, Subscription};
pub use config::SessionConfig;
pub use coordinator::{resolve, Coordinator, CursorState, Frame};
pub use lyrics::{parse, BeatMapping, LyricDocument, LyricLine};
